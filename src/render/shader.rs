//! 着色器程序管理
//!
//! 保存顶点/片元源码，编译并链接为程序，缓存固定 uniform 集合的位置。
//!
//! ## 状态
//!
//! `Unconfigured → SourceSet → Linked → Destroyed`
//!
//! 编译失败不会中断流程：诊断被记录并返回，链接照常尝试。
//! 重新链接失败时保留上一个可用程序。

use std::collections::HashMap;
use std::fmt;

use crate::core::error::{RenderError, RenderResult};
use crate::render::backend::{
    ProgramHandle, RenderBackend, ShaderCompilation, ShaderStage, UniformLocation,
};
use crate::render::types::HEX_LAYOUTS;

/// 固定的 uniform 集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    AspectRatio,
    SizeX,
    SizeY,
    Zoom,
}

impl Uniform {
    pub const ALL: [Uniform; 4] = [
        Uniform::AspectRatio,
        Uniform::SizeX,
        Uniform::SizeY,
        Uniform::Zoom,
    ];

    /// 着色器中的成员名
    pub fn name(&self) -> &'static str {
        match self {
            Uniform::AspectRatio => "aspect_ratio",
            Uniform::SizeX => "size_x",
            Uniform::SizeY => "size_y",
            Uniform::Zoom => "zoom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.name() == name)
    }
}

impl fmt::Display for Uniform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 着色器管理器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderState {
    Unconfigured,
    SourceSet,
    Linked,
    Destroyed,
}

/// 着色器管理器
#[derive(Debug)]
pub struct ShaderManager {
    vertex_source: Option<String>,
    fragment_source: Option<String>,
    program: Option<ProgramHandle>,
    locations: HashMap<Uniform, UniformLocation>,
    diagnostics: Vec<RenderError>,
    state: ShaderState,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self {
            vertex_source: None,
            fragment_source: None,
            program: None,
            locations: HashMap::new(),
            diagnostics: Vec::new(),
            state: ShaderState::Unconfigured,
        }
    }
}

impl ShaderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建并设置源码，处于 `SourceSet`
    pub fn with_source(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex_source: Some(vertex.into()),
            fragment_source: Some(fragment.into()),
            state: ShaderState::SourceSet,
            ..Self::default()
        }
    }

    /// 设置源码，替换之前的文本
    ///
    /// 已链接的程序在下一次成功链接前保持可用。
    pub fn set_source(
        &mut self,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> RenderResult<()> {
        if self.state == ShaderState::Destroyed {
            return Err(RenderError::InvalidState(
                "shader manager has been destroyed".into(),
            ));
        }
        self.vertex_source = Some(vertex.into());
        self.fragment_source = Some(fragment.into());
        self.state = ShaderState::SourceSet;
        Ok(())
    }

    fn record_compile(&mut self, stage: ShaderStage, compilation: &ShaderCompilation) {
        if let Some(log) = &compilation.log {
            let log = if log.trim().is_empty() {
                "compiler returned no diagnostics".to_string()
            } else {
                log.clone()
            };
            tracing::error!(target: "render", %stage, "shader compile failed:\n{}", log);
            self.diagnostics.push(RenderError::ShaderCompile { stage, log });
        }
    }

    /// 编译两个阶段并链接
    ///
    /// 返回第一条诊断；全部诊断可通过 `diagnostics()` 读取。
    /// 阶段对象在链接后立即释放。
    pub fn compile_and_link<B: RenderBackend>(
        &mut self,
        backend: &mut B,
    ) -> RenderResult<ProgramHandle> {
        let (Some(vertex_source), Some(fragment_source)) =
            (self.vertex_source.as_deref(), self.fragment_source.as_deref())
        else {
            return Err(RenderError::InvalidState(match self.state {
                ShaderState::Destroyed => "shader manager has been destroyed".into(),
                _ => "no shader source has been set".into(),
            }));
        };
        if !backend.is_ready() {
            return Err(RenderError::ContextNotReady);
        }

        let vertex = backend.compile_shader(ShaderStage::Vertex, vertex_source);
        let fragment = backend.compile_shader(ShaderStage::Fragment, fragment_source);

        self.diagnostics.clear();
        self.record_compile(ShaderStage::Vertex, &vertex);
        self.record_compile(ShaderStage::Fragment, &fragment);

        let linked = backend.link_program(vertex.handle, fragment.handle, &HEX_LAYOUTS);
        backend.destroy_shader(vertex.handle);
        backend.destroy_shader(fragment.handle);

        match linked {
            Ok(program) => {
                if let Some(previous) = self.program.replace(program) {
                    backend.destroy_program(previous);
                }
                self.resolve_locations(backend, program);
                tracing::debug!(
                    target: "render",
                    program = program.0,
                    uniforms = self.locations.len(),
                    "shader program linked"
                );
            }
            Err(log) => {
                tracing::error!(target: "render", "shader link failed:\n{}", log);
                self.diagnostics.push(RenderError::ShaderLink { log });
            }
        }
        // 尝试过即视为已链接；可用与否由 `program()` 判断
        self.state = ShaderState::Linked;

        match (self.diagnostics.first(), self.program) {
            (Some(first), _) => Err(first.clone()),
            (None, Some(program)) => Ok(program),
            (None, None) => Err(RenderError::InvalidState("program was not created".into())),
        }
    }

    fn resolve_locations<B: RenderBackend>(&mut self, backend: &B, program: ProgramHandle) {
        self.locations.clear();
        for uniform in Uniform::ALL {
            match backend.uniform_location(program, uniform.name()) {
                Some(location) => {
                    self.locations.insert(uniform, location);
                }
                None => {
                    tracing::warn!(target: "render", %uniform, "uniform not found in program");
                }
            }
        }
    }

    /// 设为当前程序
    pub fn use_program<B: RenderBackend>(&self, backend: &mut B) -> RenderResult<()> {
        let program = self
            .program
            .ok_or_else(|| RenderError::InvalidState("no linked shader program".into()))?;
        backend.use_program(program);
        Ok(())
    }

    /// 写入 uniform，返回是否真正写入
    ///
    /// 位置未解析时为空操作。
    pub fn set_uniform<B: RenderBackend>(
        &self,
        backend: &mut B,
        uniform: Uniform,
        value: f32,
    ) -> bool {
        let (Some(program), Some(location)) = (self.program, self.locations.get(&uniform)) else {
            return false;
        };
        backend.use_program(program);
        backend.set_uniform_f32(*location, value);
        true
    }

    /// 按名称写入 uniform，未知名称为空操作
    pub fn set_uniform_float<B: RenderBackend>(
        &self,
        backend: &mut B,
        name: &str,
        value: f32,
    ) -> bool {
        match Uniform::from_name(name) {
            Some(uniform) => self.set_uniform(backend, uniform, value),
            None => {
                tracing::warn!(target: "render", name, "write to unknown uniform ignored");
                false
            }
        }
    }

    /// 当前可用程序
    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn state(&self) -> ShaderState {
        self.state
    }

    /// 最近一次编译链接的诊断
    pub fn diagnostics(&self) -> &[RenderError] {
        &self.diagnostics
    }

    pub fn location(&self, uniform: Uniform) -> Option<UniformLocation> {
        self.locations.get(&uniform).copied()
    }

    /// 释放程序，之后不可再使用
    pub fn destroy<B: RenderBackend>(&mut self, backend: &mut B) {
        if self.state == ShaderState::Destroyed {
            return;
        }
        if let Some(program) = self.program.take() {
            backend.destroy_program(program);
        }
        self.locations.clear();
        self.vertex_source = None;
        self.fragment_source = None;
        self.state = ShaderState::Destroyed;
        tracing::debug!(target: "render", "shader program destroyed");
    }
}
