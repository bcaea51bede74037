use super::{ConfigError, ConfigResult};
use crate::config::graphics::MAX_INSTANCE_CAPACITY;
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 地图配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// 列数
    pub size_x: u32,
    /// 行数
    pub size_y: u32,
    /// 地形种子，缺省时每次启动随机
    pub seed: Option<u64>,
}

impl_default!(MapConfig {
    size_x: 100,
    size_y: 75,
    seed: None,
});

impl MapConfig {
    /// 格子总数
    pub fn area(&self) -> usize {
        self.size_x as usize * self.size_y as usize
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.size_x == 0 || self.size_y == 0 {
            return Err(ConfigError::ValidationError(
                "Map size must be non-zero".to_string(),
            ));
        }
        if self.area() > MAX_INSTANCE_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "Map of {}x{} cells exceeds the limit of {} instances",
                self.size_x, self.size_y, MAX_INSTANCE_CAPACITY
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map() {
        let map = MapConfig::default();
        assert_eq!(map.area(), 7500);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_invalid_map() {
        let map = MapConfig {
            size_x: 0,
            ..MapConfig::default()
        };
        assert!(map.validate().is_err());

        let map = MapConfig {
            size_x: 4096,
            size_y: 4096,
            seed: None,
        };
        assert!(map.validate().is_err());
    }
}
