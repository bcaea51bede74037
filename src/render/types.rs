//! 公共 GPU 数据类型定义
//!
//! 六边形基础几何、每实例属性记录以及它们的顶点布局。

use crate::impl_default;
use crate::render::backend::{VertexAttribute, VertexFormat, VertexLayout, VertexStepMode};

/// 六边形三角带索引顺序
pub const HEX_INDEX_ORDER: [u32; 6] = [5, 4, 0, 3, 1, 2];

/// 每次绘制的索引数
pub const HEX_INDEX_COUNT: u32 = HEX_INDEX_ORDER.len() as u32;

/// 基础几何所在的顶点缓冲区槽位
pub const VERTEX_SLOT: u32 = 0;
/// 实例数据所在的顶点缓冲区槽位
pub const INSTANCE_SLOT: u32 = 1;

/// 六边形局部坐标 `@location(0)`
pub const POSITION_LOCATION: u32 = 0;
/// 实例偏移 `@location(1)`
pub const OFFSET_LOCATION: u32 = 1;
/// 实例颜色 `@location(2)`
pub const COLOR_LOCATION: u32 = 2;

/// 六边形顶点
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct HexVertex {
    /// 局部坐标 (x, y)
    pub pos: [f32; 2],
}

impl HexVertex {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { pos: [x, y] }
    }

    /// 顶点缓冲区布局（逐顶点步进）
    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<HexVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &[VertexAttribute {
            location: POSITION_LOCATION,
            format: VertexFormat::Float32x2,
            offset: 0,
        }],
    };
}

/// 每实例属性：偏移 + 颜色，共 5 个 f32
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    /// 偏移 (x, y)，地图坐标
    pub offset: [f32; 2],
    /// 颜色 (r, g, b)
    pub color: [f32; 3],
}

impl InstanceRecord {
    /// 单条记录的字节数
    pub const STRIDE: u64 = std::mem::size_of::<InstanceRecord>() as u64;

    pub const fn new(offset: [f32; 2], color: [f32; 3]) -> Self {
        Self { offset, color }
    }

    /// 实例缓冲区布局（逐实例步进，divisor = 1）
    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: Self::STRIDE,
        step_mode: VertexStepMode::Instance,
        attributes: &[
            VertexAttribute {
                location: OFFSET_LOCATION,
                format: VertexFormat::Float32x2,
                offset: 0,
            },
            VertexAttribute {
                location: COLOR_LOCATION,
                format: VertexFormat::Float32x3,
                offset: 8,
            },
        ],
    };
}

impl_default!(InstanceRecord {
    offset: [0.0, 0.0],
    color: [1.0, 1.0, 1.0],
});

/// 程序链接时使用的完整布局，按槽位排列
pub const HEX_LAYOUTS: [VertexLayout; 2] = [HexVertex::LAYOUT, InstanceRecord::LAYOUT];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_five_floats() {
        assert_eq!(InstanceRecord::STRIDE, 20);
        assert_eq!(std::mem::size_of::<HexVertex>(), 8);
    }

    #[test]
    fn test_layout_slots() {
        assert_eq!(HEX_LAYOUTS[VERTEX_SLOT as usize].step_mode, VertexStepMode::Vertex);
        assert_eq!(HEX_LAYOUTS[INSTANCE_SLOT as usize].step_mode, VertexStepMode::Instance);
        let color = InstanceRecord::LAYOUT.attributes[1];
        assert_eq!(color.location, COLOR_LOCATION);
        assert_eq!(color.offset + color.format.size(), InstanceRecord::STRIDE);
    }

    #[test]
    fn test_record_bytes_are_packed() {
        let record = InstanceRecord::new([1.0, 2.0], [0.25, 0.5, 0.75]);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&record));
        assert_eq!(floats, &[1.0, 2.0, 0.25, 0.5, 0.75]);
    }
}
