//! 核心模块
//!
//! 包含渲染桥接层的公共基础设施：
//! - `error` - 错误类型定义
//! - `macros` - 通用宏
//! - `viewer` - 窗口查看器

pub mod error;
#[macro_use]
pub mod macros;
pub mod viewer;

// 重新导出错误类型
pub use error::{RenderError, RenderResult, ViewerError, ViewerResult};
pub use viewer::{MapSession, Viewer, ViewerAction};
