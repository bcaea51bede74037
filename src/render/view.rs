//! 视口状态与缩放级别

use crate::impl_default;

/// 推送给着色器的标量 uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// 宽 / 高
    pub aspect_ratio: f32,
    /// 地图逻辑尺寸 x
    pub size_x: f32,
    /// 地图逻辑尺寸 y
    pub size_y: f32,
    /// 缩放因子
    pub zoom: f32,
}

impl_default!(ViewportState {
    aspect_ratio: 1.0,
    size_x: 1.0,
    size_y: 1.0,
    zoom: 1.0,
});

/// 每档缩放的步长
const ZOOM_STEP: f32 = 0.2;

/// 整数缩放档位
///
/// 档位 >= 0 时因子线性增长（`1 + 0.2·level`），小于 0 时指数衰减（`exp(0.2·level)`），
/// 两段在 0 档处连续且都等于 1.0。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoomLevel(i32);

impl ZoomLevel {
    pub fn new(level: i32) -> Self {
        Self(level)
    }

    pub fn level(&self) -> i32 {
        self.0
    }

    /// 放大一档
    pub fn step_in(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// 缩小一档
    pub fn step_out(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    /// 按滚轮行数调整
    pub fn scroll(&mut self, lines: i32) {
        self.0 = self.0.saturating_add(lines);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// 当前缩放因子
    pub fn factor(&self) -> f32 {
        let level = self.0 as f32;
        if self.0 >= 0 {
            1.0 + ZOOM_STEP * level
        } else {
            (ZOOM_STEP * level).exp()
        }
    }
}
