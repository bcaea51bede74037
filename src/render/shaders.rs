//! 内置 WGSL 着色器

/// 内置顶点着色器：`vs_main`
pub const HEX_VERTEX_SHADER: &str = include_str!("shaders/hex_vertex.wgsl");

/// 内置片元着色器：`fs_main`
pub const HEX_FRAGMENT_SHADER: &str = include_str!("shaders/hex_fragment.wgsl");
