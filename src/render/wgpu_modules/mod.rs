//! WGPU 渲染模块
//!
//! ## 模块结构
//!
//! - `pipeline`: 顶点布局与 uniform 块到 wgpu 对象的翻译、管线创建
//! - `backend`: `WgpuBackend`，`RenderBackend` 的 GPU 实现
//!
//! ## 使用方式
//!
//! ```ignore
//! let window = Arc::new(window);
//! let size = window.inner_size();
//! let backend = pollster::block_on(WgpuBackend::new(window.clone(), size.width, size.height, true))?;
//! let mut context = RenderContext::new(backend);
//! ```

pub mod backend;
pub mod pipeline;

// 重导出主要类型
pub use backend::WgpuBackend;
pub use pipeline::PipelineBuilder;
