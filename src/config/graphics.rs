use super::{ConfigError, ConfigResult};
use crate::impl_default;
use crate::render::driver::DEFAULT_CLEAR_COLOR;
use serde::{Deserialize, Serialize};

/// 单个实例缓冲区允许的最大记录数
pub const MAX_INSTANCE_CAPACITY: usize = 1 << 22;

/// 图形配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// 窗口分辨率
    pub resolution: Resolution,

    /// 垂直同步
    pub vsync: bool,

    /// 背景色 (r, g, b, a)
    pub clear_color: [f32; 4],

    /// 初始化时预分配的实例数，首次刷新时按地图大小重新分配
    pub initial_capacity: usize,
}

impl_default!(GraphicsConfig {
    resolution: Resolution::default(),
    vsync: true,
    clear_color: DEFAULT_CLEAR_COLOR,
    initial_capacity: 0,
});

impl GraphicsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid resolution".to_string(),
            ));
        }
        if self
            .clear_color
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(ConfigError::ValidationError(format!(
                "Clear color components must be within [0, 1], got {:?}",
                self.clear_color
            )));
        }
        if self.initial_capacity > MAX_INSTANCE_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "Initial capacity {} exceeds the limit of {}",
                self.initial_capacity, MAX_INSTANCE_CAPACITY
            )));
        }
        Ok(())
    }
}

/// 分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// 宽度（像素）
    pub width: u32,
    /// 高度（像素）
    pub height: u32,
}

impl_default!(Resolution {
    width: 1280,
    height: 720,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_graphics_is_valid() {
        let config = GraphicsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clear_color, [0.1, 0.1, 0.1, 1.0]);
    }

    #[test]
    fn test_invalid_graphics() {
        let mut config = GraphicsConfig::default();
        config.resolution.height = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = GraphicsConfig::default();
        config.clear_color = [1.5, 0.0, 0.0, 1.0];
        assert!(config.validate().is_err());

        let mut config = GraphicsConfig::default();
        config.initial_capacity = MAX_INSTANCE_CAPACITY + 1;
        assert!(config.validate().is_err());
    }
}
