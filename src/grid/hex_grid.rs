use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{InstanceDataProvider, HEX_RADIUS};
use crate::render::types::InstanceRecord;

/// 地形类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terrain {
    Ocean,
    Grassland,
    Desert,
    Forest,
    Hills,
    Mountain,
    Ice,
}

/// 地形 → 颜色映射
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    pub ocean: [f32; 3],
    pub grassland: [f32; 3],
    pub desert: [f32; 3],
    pub forest: [f32; 3],
    pub hills: [f32; 3],
    pub mountain: [f32; 3],
    pub ice: [f32; 3],
}

impl Default for ColorMap {
    fn default() -> Self {
        Self {
            ocean: rgb(0x1f, 0x4e, 0x8c),
            grassland: rgb(0x6a, 0xa8, 0x4f),
            desert: rgb(0xd9, 0xc0, 0x7a),
            forest: rgb(0x2e, 0x6b, 0x34),
            hills: rgb(0x8c, 0x7b, 0x4f),
            mountain: rgb(0x7a, 0x74, 0x70),
            ice: rgb(0xe8, 0xf0, 0xf5),
        }
    }
}

fn rgb(r: u8, g: u8, b: u8) -> [f32; 3] {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

impl ColorMap {
    pub fn color(&self, terrain: Terrain) -> [f32; 3] {
        match terrain {
            Terrain::Ocean => self.ocean,
            Terrain::Grassland => self.grassland,
            Terrain::Desert => self.desert,
            Terrain::Forest => self.forest,
            Terrain::Hills => self.hills,
            Terrain::Mountain => self.mountain,
            Terrain::Ice => self.ice,
        }
    }
}

/// 单个格子
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexCell {
    pub terrain: Terrain,
    /// 格子中心，地图坐标
    pub center: [f32; 2],
}

/// 奇数行偏移的尖顶六边形网格
///
/// 格子按行优先存放：索引 `row * size_x + col`。
#[derive(Debug, Clone)]
pub struct HexGrid {
    size_x: u32,
    size_y: u32,
    cells: Vec<HexCell>,
    colors: ColorMap,
}

impl HexGrid {
    /// 全部为海洋的网格
    pub fn new(size_x: u32, size_y: u32) -> Self {
        let cells = (0..size_y)
            .flat_map(|row| (0..size_x).map(move |col| (col, row)))
            .map(|(col, row)| HexCell {
                terrain: Terrain::Ocean,
                center: Self::center(col, row),
            })
            .collect();
        Self {
            size_x,
            size_y,
            cells,
            colors: ColorMap::default(),
        }
    }

    /// 以种子生成随机地形
    pub fn generate(size_x: u32, size_y: u32, seed: u64) -> Self {
        let mut grid = Self::new(size_x, size_y);
        grid.regenerate(seed);
        grid
    }

    /// 格子中心坐标
    pub fn center(col: u32, row: u32) -> [f32; 2] {
        let shift = if row % 2 == 1 { 0.5 } else { 0.0 };
        [
            col as f32 + 0.5 + shift,
            row as f32 * 1.5 * HEX_RADIUS + HEX_RADIUS,
        ]
    }

    /// 给定行列数时地图的外包尺寸
    pub fn extent(size_x: u32, size_y: u32) -> (f32, f32) {
        if size_x == 0 || size_y == 0 {
            return (0.0, 0.0);
        }
        (
            size_x as f32 + 0.5,
            (size_y - 1) as f32 * 1.5 * HEX_RADIUS + 2.0 * HEX_RADIUS,
        )
    }

    pub fn size_x(&self) -> u32 {
        self.size_x
    }

    pub fn size_y(&self) -> u32 {
        self.size_y
    }

    pub fn area(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[HexCell] {
        &self.cells
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&HexCell> {
        if col >= self.size_x || row >= self.size_y {
            return None;
        }
        self.cells.get((row * self.size_x + col) as usize)
    }

    pub fn set_terrain(&mut self, col: u32, row: u32, terrain: Terrain) -> bool {
        if col >= self.size_x || row >= self.size_y {
            return false;
        }
        match self.cells.get_mut((row * self.size_x + col) as usize) {
            Some(cell) => {
                cell.terrain = terrain;
                true
            }
            None => false,
        }
    }

    pub fn color_map(&self) -> &ColorMap {
        &self.colors
    }

    pub fn set_color_map(&mut self, colors: ColorMap) {
        self.colors = colors;
    }

    /// 改变尺寸并重新生成
    pub fn resize(&mut self, size_x: u32, size_y: u32, seed: u64) {
        let colors = std::mem::take(&mut self.colors);
        *self = Self::new(size_x, size_y);
        self.colors = colors;
        self.regenerate(seed);
    }

    /// 以新种子重新生成地形，尺寸不变
    ///
    /// 中心附近是陆地，向外过渡为海洋；靠近上下边缘的陆地结冰。
    pub fn regenerate(&mut self, seed: u64) {
        if self.cells.is_empty() {
            return;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let (w, h) = (self.size_x as usize, self.size_y as usize);

        let mut height = vec![0.0f32; w * h];
        for row in 0..h {
            for col in 0..w {
                let dx = (col as f32 + 0.5) / w as f32 - 0.5;
                let dy = (row as f32 + 0.5) / h as f32 - 0.5;
                let falloff = 1.0 - (dx * dx + dy * dy).sqrt() * 2.0;
                height[row * w + col] = falloff + rng.gen_range(-0.35..0.35);
            }
        }

        // 一次邻域平滑
        let mut smoothed = height.clone();
        for row in 0..h {
            for col in 0..w {
                let mut sum = 0.0;
                let mut n = 0.0;
                for (dc, dr) in [(0i64, 0i64), (-1, 0), (1, 0), (0, -1), (0, 1)] {
                    let (c, r) = (col as i64 + dc, row as i64 + dr);
                    if c >= 0 && r >= 0 && (c as usize) < w && (r as usize) < h {
                        sum += height[r as usize * w + c as usize];
                        n += 1.0;
                    }
                }
                smoothed[row * w + col] = sum / n;
            }
        }

        for row in 0..h {
            let latitude = ((row as f32 + 0.5) / h as f32 - 0.5).abs();
            for col in 0..w {
                let value = smoothed[row * w + col];
                let terrain = if value < 0.3 {
                    Terrain::Ocean
                } else if latitude > 0.44 {
                    Terrain::Ice
                } else if value < 0.5 {
                    if rng.gen_bool(0.2) {
                        Terrain::Desert
                    } else {
                        Terrain::Grassland
                    }
                } else if value < 0.65 {
                    Terrain::Forest
                } else if value < 0.78 {
                    Terrain::Hills
                } else {
                    Terrain::Mountain
                };
                self.cells[row * w + col].terrain = terrain;
            }
        }
    }
}

impl InstanceDataProvider for HexGrid {
    /// 行优先输出；超出网格范围的格子按海洋填充
    fn instance_data(&self, width: u32, height: u32) -> Vec<InstanceRecord> {
        let mut records = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                let terrain = self
                    .cell(col, row)
                    .map_or(Terrain::Ocean, |cell| cell.terrain);
                records.push(InstanceRecord::new(
                    Self::center(col, row),
                    self.colors.color(terrain),
                ));
            }
        }
        records
    }

    fn map_extent(&self, width: u32, height: u32) -> Option<(f32, f32)> {
        Some(Self::extent(width, height))
    }
}
