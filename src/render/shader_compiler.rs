//! WGSL 前端
//!
//! 基于 naga 的单阶段编译、接口反射与链接检查，由两个后端共用。
//! 这样即使在无 GPU 的环境下，编译错误也带有真实的诊断文本。

use wgpu::naga;

use crate::render::backend::{ShaderStage, UniformLocation, VertexLayout};

/// uniform 块绑定点
pub const UNIFORM_GROUP: u32 = 0;
pub const UNIFORM_BINDING: u32 = 0;

/// uniform 块中的一个成员
#[derive(Debug, Clone, PartialEq)]
pub struct UniformMember {
    pub name: String,
    /// 块内字节偏移
    pub offset: u32,
    /// 是否为 f32 标量（只有标量成员可以通过 `set_uniform_f32` 写入）
    pub is_f32: bool,
}

/// 反射得到的 uniform 块
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    /// 块大小（字节）
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformBlock {
    fn member(&self, name: &str) -> Option<&UniformMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// 编译成功的单个阶段
#[derive(Debug, Clone)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub entry_point: String,
    /// 入口函数的 `@location` 输入
    pub inputs: Vec<u32>,
    /// 入口函数的 `@location` 输出
    pub outputs: Vec<u32>,
    pub uniform_blocks: Vec<UniformBlock>,
}

/// 链接后的程序接口
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedInterface {
    pub uniform_block: Option<UniformBlock>,
}

impl LinkedInterface {
    /// 按名称查找 f32 uniform 成员
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_block
            .as_ref()?
            .member(name)
            .filter(|m| m.is_f32)
            .map(|m| UniformLocation(m.offset))
    }

    /// uniform 块大小，没有 uniform 块时为 0
    pub fn uniform_block_size(&self) -> u64 {
        self.uniform_block.as_ref().map_or(0, |b| b.size as u64)
    }
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// 编译单个阶段
///
/// 解析、验证并反射入口接口；失败时返回渲染好的诊断文本（不为空）。
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga_stage(stage))
        .ok_or_else(|| format!("no @{} entry point found", stage))?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(&module, arg.binding.as_ref(), arg.ty, &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, result.binding.as_ref(), result.ty, &mut outputs);
    }

    Ok(CompiledStage {
        stage,
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        uniform_blocks: reflect_uniform_blocks(&module),
    })
}

fn collect_locations(
    module: &naga::Module,
    binding: Option<&naga::Binding>,
    ty: naga::Handle<naga::Type>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(*location),
        Some(naga::Binding::BuiltIn(_)) => {}
        // 无绑定的参数只能是带绑定成员的结构体
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        out.push(*location);
                    }
                }
            }
        }
    }
}

fn reflect_uniform_blocks(module: &naga::Module) -> Vec<UniformBlock> {
    let mut blocks = Vec::new();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        let (members, size) = match &module.types[var.ty].inner {
            naga::TypeInner::Struct { members, span } => {
                let members = members
                    .iter()
                    .filter_map(|m| {
                        let name = m.name.clone()?;
                        let is_f32 = matches!(
                            module.types[m.ty].inner,
                            naga::TypeInner::Scalar(naga::Scalar {
                                kind: naga::ScalarKind::Float,
                                width: 4,
                            })
                        );
                        Some(UniformMember {
                            name,
                            offset: m.offset,
                            is_f32,
                        })
                    })
                    .collect();
                (members, *span)
            }
            // 非结构体 uniform 没有可寻址的成员
            _ => (Vec::new(), 0),
        };
        blocks.push(UniformBlock {
            group: binding.group,
            binding: binding.binding,
            size,
            members,
        });
    }
    blocks
}

/// 链接两个阶段
///
/// 检查阶段间接口：顶点输入必须由 `layouts` 提供，片元输入必须由顶点阶段输出，
/// 两个阶段声明的 uniform 块必须位于 `@group(0) @binding(0)` 且布局一致。
pub fn link_stages(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
    layouts: &[VertexLayout],
) -> Result<LinkedInterface, String> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(format!(
            "stages attached in the wrong slots: got {} + {}",
            vertex.stage, fragment.stage
        ));
    }

    let mut errors = Vec::new();

    for location in &vertex.inputs {
        let provided = layouts
            .iter()
            .flat_map(|l| l.attributes.iter())
            .any(|a| a.location == *location);
        if !provided {
            errors.push(format!(
                "vertex input @location({}) has no matching vertex attribute",
                location
            ));
        }
    }

    for location in &fragment.inputs {
        if !vertex.outputs.contains(location) {
            errors.push(format!(
                "fragment input @location({}) is not written by the vertex stage",
                location
            ));
        }
    }

    let mut merged: Option<UniformBlock> = None;
    for block in vertex.uniform_blocks.iter().chain(&fragment.uniform_blocks) {
        if block.group != UNIFORM_GROUP || block.binding != UNIFORM_BINDING {
            errors.push(format!(
                "uniform block at @group({}) @binding({}); only @group({}) @binding({}) is supported",
                block.group, block.binding, UNIFORM_GROUP, UNIFORM_BINDING
            ));
            continue;
        }
        match &mut merged {
            None => merged = Some(block.clone()),
            Some(existing) => {
                if existing.size != block.size {
                    errors.push(format!(
                        "uniform block size differs between stages ({} vs {} bytes)",
                        existing.size, block.size
                    ));
                    continue;
                }
                for member in &block.members {
                    match existing.member(&member.name) {
                        Some(known) if known.offset != member.offset => errors.push(format!(
                            "uniform member `{}` has offset {} in one stage and {} in the other",
                            member.name, known.offset, member.offset
                        )),
                        Some(_) => {}
                        None => existing.members.push(member.clone()),
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(LinkedInterface {
            uniform_block: merged,
        })
    } else {
        Err(errors.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shaders::{HEX_FRAGMENT_SHADER, HEX_VERTEX_SHADER};
    use crate::render::types::HEX_LAYOUTS;

    #[test]
    fn test_builtin_sources_compile_and_link() {
        let vs = compile_stage(ShaderStage::Vertex, HEX_VERTEX_SHADER).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, HEX_FRAGMENT_SHADER).unwrap();
        assert_eq!(vs.entry_point, "vs_main");
        assert_eq!(vs.inputs, vec![0, 1, 2]);
        assert_eq!(fs.inputs, vec![0]);

        let linked = link_stages(&vs, &fs, &HEX_LAYOUTS).unwrap();
        assert_eq!(linked.uniform_location("aspect_ratio"), Some(UniformLocation(0)));
        assert_eq!(linked.uniform_location("size_x"), Some(UniformLocation(4)));
        assert_eq!(linked.uniform_location("size_y"), Some(UniformLocation(8)));
        assert_eq!(linked.uniform_location("zoom"), Some(UniformLocation(12)));
        assert_eq!(linked.uniform_location("missing"), None);
        assert_eq!(linked.uniform_block_size(), 16);
    }

    #[test]
    fn test_syntax_error_has_log() {
        let err = compile_stage(ShaderStage::Vertex, "fn broken( {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_missing_entry_point() {
        let err = compile_stage(ShaderStage::Fragment, HEX_VERTEX_SHADER).unwrap_err();
        assert!(err.contains("@fragment"));
    }

    #[test]
    fn test_fragment_input_not_written() {
        let vs = compile_stage(ShaderStage::Vertex, HEX_VERTEX_SHADER).unwrap();
        let fs_src = r#"
@fragment
fn fs_main(@location(3) tint: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(tint, 1.0);
}
"#;
        let fs = compile_stage(ShaderStage::Fragment, fs_src).unwrap();
        let err = link_stages(&vs, &fs, &HEX_LAYOUTS).unwrap_err();
        assert!(err.contains("@location(3)"));
    }

    #[test]
    fn test_vertex_input_without_attribute() {
        let vs = compile_stage(ShaderStage::Vertex, HEX_VERTEX_SHADER).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, HEX_FRAGMENT_SHADER).unwrap();
        // 只提供逐顶点布局，实例属性缺失
        let err = link_stages(&vs, &fs, &HEX_LAYOUTS[..1]).unwrap_err();
        assert!(err.contains("@location(1)"));
        assert!(err.contains("@location(2)"));
    }
}
