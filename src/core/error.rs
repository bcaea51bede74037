//! 统一错误处理模块
//!
//! 提供渲染桥接层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **渲染层错误** (`RenderError`): 着色器编译/链接、缓冲区尺寸、视口、上下文状态
//! - **配置错误** (`config::ConfigError`): 配置文件读取、解析与验证
//! - **宿主错误** (`ViewerError`): 演示程序（窗口、事件循环）使用的顶层错误
//!
//! 所有错误都是终止性的：本层不做自动重试，错误向上报告由调用方决定如何处理。

use thiserror::Error;

use crate::config::ConfigError;
use crate::render::backend::ShaderStage;

/// 渲染系统错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("Shader program failed to link: {log}")]
    ShaderLink { log: String },

    #[error("Instance buffer size mismatch: expected {expected} records, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Viewport height is zero; aspect ratio left unchanged")]
    DivideByZeroViewport,

    #[error("Graphics context is not ready")]
    ContextNotReady,

    #[error("Requested {requested} instances but only {capacity} are allocated")]
    InstanceCountExceedsCapacity { requested: usize, capacity: usize },

    #[error("Invalid render state: {0}")]
    InvalidState(String),

    #[error("Failed to request adapter: no compatible GPU found")]
    NoAdapter,

    #[error("Failed to request device: {0}")]
    DeviceRequest(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Frame submission error: {0}")]
    Submission(String),

    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// 本帧未能获取表面纹理，可在下一帧重试
    #[error("Frame skipped: {0}")]
    FrameSkipped(String),
}

impl RenderError {
    /// 是否为着色器诊断错误（编译或链接失败）
    ///
    /// 这类错误不会中断渲染上下文，只是程序可能无法正确绘制。
    pub fn is_shader_error(&self) -> bool {
        matches!(
            self,
            RenderError::ShaderCompile { .. } | RenderError::ShaderLink { .. }
        )
    }

    /// 只影响当前帧的错误
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::FrameSkipped(_))
    }
}

/// 演示程序顶层错误
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Window creation failed: {0}")]
    Window(String),

    #[error("Event loop error: {0}")]
    EventLoop(String),
}

/// 结果类型别名
pub type RenderResult<T> = Result<T, RenderError>;
pub type ViewerResult<T> = Result<T, ViewerError>;
