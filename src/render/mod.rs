//! 渲染模块
//!
//! 实例化六边形绘制的 GPU 资源生命周期：
//! - `buffer` - 顶点/索引/实例缓冲区
//! - `shader` - 着色器编译、链接与 uniform
//! - `driver` - 每帧清屏与实例化绘制
//! - `context` - 面向宿主的协议入口
//! - `backend` - 图形上下文抽象，`headless` 与 `wgpu_modules` 为两种实现

pub mod backend;
pub mod buffer;
pub mod context;
pub mod driver;
pub mod headless;
pub mod shader;
pub mod shader_compiler;
pub mod shaders;
pub mod types;
pub mod view;
pub mod wgpu_modules;

pub use backend::{RenderBackend, RenderCommand, ShaderStage};
pub use buffer::{AttributeBindings, BufferManager};
pub use context::{ContextState, RenderContext};
pub use driver::{FrameStats, RenderDriver};
pub use headless::HeadlessBackend;
pub use shader::{ShaderManager, ShaderState, Uniform};
pub use types::{HexVertex, InstanceRecord};
pub use view::{ViewportState, ZoomLevel};
pub use wgpu_modules::WgpuBackend;

mod tests;
