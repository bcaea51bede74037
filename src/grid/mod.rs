//! 网格数据模块
//!
//! 渲染层只通过两个 trait 访问地图：
//! - `GeometryProvider`: 初始化时提供一次六边形轮廓与三角带索引
//! - `InstanceDataProvider`: 每次刷新时提供扁平的实例记录
//!
//! `HexGrid` 是一个参考实现：奇数行偏移的尖顶六边形网格，带随机地形。

mod hex_grid;

pub use hex_grid::{ColorMap, HexCell, HexGrid, Terrain};

use crate::render::types::{HexVertex, InstanceRecord, HEX_INDEX_ORDER};

/// 六边形外接圆半径（宽度为 1 的尖顶六边形）
pub const HEX_RADIUS: f32 = 0.577_350_26;

/// 基础几何提供者
pub trait GeometryProvider {
    /// 六个轮廓顶点
    fn hex_vertices(&self) -> [HexVertex; 6];

    /// 三角带索引
    fn index_order(&self) -> [u32; 6] {
        HEX_INDEX_ORDER
    }
}

/// 实例数据提供者
pub trait InstanceDataProvider {
    /// 生成恰好 `width * height` 条记录，顺序由提供者决定但须保持一致
    fn instance_data(&self, width: u32, height: u32) -> Vec<InstanceRecord>;

    /// 地图在偏移坐标系中的外包尺寸，用于推送 `size_x` / `size_y`
    fn map_extent(&self, _width: u32, _height: u32) -> Option<(f32, f32)> {
        None
    }
}

/// 宽度为 1 的尖顶六边形，中心在原点
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitHexGeometry;

impl GeometryProvider for UnitHexGeometry {
    fn hex_vertices(&self) -> [HexVertex; 6] {
        let r = HEX_RADIUS;
        [
            HexVertex::new(0.0, r),
            HexVertex::new(0.5, r * 0.5),
            HexVertex::new(0.5, -r * 0.5),
            HexVertex::new(0.0, -r),
            HexVertex::new(-0.5, -r * 0.5),
            HexVertex::new(-0.5, r * 0.5),
        ]
    }
}
