//! 渲染后端抽象
//!
//! 定义图形上下文的最小接口：缓冲区、着色器/程序对象、uniform 写入与命令提交。
//! 上层的 `BufferManager`、`ShaderManager`、`RenderDriver` 只通过这个 trait 访问 GPU。
//!
//! ## 实现
//!
//! - `WgpuBackend`: 基于 wgpu 的真实后端
//! - `HeadlessBackend`: 内存后端，记录命令并支持缓冲区回读，用于测试

use std::fmt;

use crate::core::error::RenderResult;

/// 着色器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// 小写名称（用于日志与错误信息）
    pub fn as_str(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓冲区用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(pub u32);

impl BufferUsage {
    pub const VERTEX: Self = Self(1);
    pub const INDEX: Self = Self(2);
    pub const COPY_DST: Self = Self(4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 缓冲区描述符
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    /// 标签
    pub label: Option<String>,
    /// 大小（字节）
    pub size: u64,
    /// 用途
    pub usage: BufferUsage,
}

/// 顶点属性格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
}

impl VertexFormat {
    /// 字节大小
    pub const fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
        }
    }
}

/// 属性步进方式（attribute divisor）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStepMode {
    /// 每个顶点前进一次（divisor = 0）
    Vertex,
    /// 每个实例前进一次（divisor = 1）
    Instance,
}

/// 单个顶点属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// 着色器中的 `@location`
    pub location: u32,
    pub format: VertexFormat,
    /// 在一条记录内的字节偏移
    pub offset: u64,
}

/// 一个顶点缓冲区槽位的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: &'static [VertexAttribute],
}

/// 索引格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub const fn size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// 抽象缓冲区句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// 抽象着色器句柄（单个阶段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u64);

/// 抽象程序句柄（已链接的顶点 + 片元阶段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// uniform 位置
///
/// 数值是成员在 uniform 块内的字节偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// 单阶段编译结果
///
/// 与 GL 一样，编译失败时句柄依然有效，`log` 携带编译器诊断。
#[derive(Debug, Clone)]
pub struct ShaderCompilation {
    pub handle: ShaderHandle,
    pub log: Option<String>,
}

impl ShaderCompilation {
    pub fn succeeded(&self) -> bool {
        self.log.is_none()
    }
}

/// 渲染命令
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// 清除颜色与深度目标
    Clear { color: [f32; 4], depth: f32 },
    /// 设置当前程序
    SetProgram { program: ProgramHandle },
    /// 设置顶点缓冲区
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    /// 设置索引缓冲区
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    /// 实例化索引绘制
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
}

/// 渲染后端 Trait
///
/// 定义渲染后端需要实现的接口。所有方法都在拥有图形上下文的线程上同步调用。
pub trait RenderBackend {
    /// 获取后端名称
    fn name(&self) -> &str;

    /// 图形上下文是否可用
    fn is_ready(&self) -> bool;

    /// 创建缓冲区
    ///
    /// 超出设备限制时返回 `BufferAllocation`，不产生任何句柄。
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle>;

    /// 写入缓冲区数据
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// 销毁缓冲区
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// 编译单个着色器阶段
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderCompilation;

    /// 销毁着色器阶段对象
    fn destroy_shader(&mut self, shader: ShaderHandle);

    /// 链接程序
    ///
    /// `layouts` 按槽位顺序描述顶点缓冲区。失败时返回链接日志。
    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        layouts: &[VertexLayout],
    ) -> Result<ProgramHandle, String>;

    /// 查询 uniform 位置，未找到返回 `None`
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// 设为当前程序
    fn use_program(&mut self, program: ProgramHandle);

    /// 向当前程序写入 f32 uniform
    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32);

    /// 销毁程序
    fn destroy_program(&mut self, program: ProgramHandle);

    /// 渲染目标尺寸变化
    fn resize_target(&mut self, width: u32, height: u32);

    /// 提交一帧的渲染命令
    fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_bitor() {
        let usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::VERTEX));
        assert!(usage.contains(BufferUsage::COPY_DST));
        assert!(!usage.contains(BufferUsage::INDEX));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_format_sizes() {
        assert_eq!(VertexFormat::Float32x2.size(), 8);
        assert_eq!(VertexFormat::Float32x3.size(), 12);
        assert_eq!(IndexFormat::Uint32.size(), 4);
    }
}
