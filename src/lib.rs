//! # Hexmap Render
//!
//! Instanced hexagon map renderer built on wgpu.
//!
//! ## Features
//!
//! - **Instanced Drawing**: one base hexagon, one draw call per frame for the whole map
//! - **Buffer Lifecycle**: vertex/index/instance buffers with exact-capacity reallocation
//! - **Shader Lifecycle**: WGSL compilation and linking with reflected uniform locations
//! - **Headless Backend**: the full protocol runs without a GPU for tests and benchmarks
//!
//! ### Example
//!
//! ```ignore
//! use hexmap_render::grid::HexGrid;
//! use hexmap_render::render::{HeadlessBackend, RenderContext};
//!
//! let grid = HexGrid::generate(100, 75, 42);
//! let mut context = RenderContext::new(HeadlessBackend::new());
//! context.init(grid.area())?;
//! context.refresh_instances(&grid, grid.size_x(), grid.size_y())?;
//! context.resize_viewport(1280, 720)?;
//! context.draw_frame()?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Errors and shared macros
//! - [`config`]: Viewer configuration (TOML/JSON + environment)
//! - [`render`]: Buffers, shaders, frame driver and backends
//! - [`grid`]: Hex map model and instance data providers

/// Errors and shared macros
pub mod core;
/// Configuration system
pub mod config;
/// Instanced hexagon rendering
pub mod render;
/// Hex map model feeding instance data
pub mod grid;
