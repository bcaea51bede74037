/// 查看器配置系统
///
/// 提供TOML/JSON配置文件与环境变量覆盖
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod graphics;
pub mod map;
pub mod shaders;

pub use graphics::{GraphicsConfig, Resolution};
pub use map::MapConfig;
pub use shaders::ShaderConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 查看器主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// 图形配置
    pub graphics: GraphicsConfig,

    /// 地图配置
    pub map: MapConfig,

    /// 着色器配置
    pub shaders: ShaderConfig,

    /// 日志配置
    pub logging: LoggingConfig,
}

impl ViewerConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 默认配置文件位置：`<config_dir>/hexmap/viewer.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hexmap").join("viewer.toml"))
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名加载（`.json` 为 JSON，其余按 TOML）
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// 按 `HEXMAP_*` 键覆盖配置，无法解析的值被忽略
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let value = lookup(key)?;
            match value.parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    tracing::warn!(target: "config", key, %value, "ignoring unparsable override");
                    None
                }
            }
        }

        // 图形配置
        if let Some(width) = parsed(&lookup, "HEXMAP_WIDTH") {
            self.graphics.resolution.width = width;
        }
        if let Some(height) = parsed(&lookup, "HEXMAP_HEIGHT") {
            self.graphics.resolution.height = height;
        }
        if let Some(vsync) = parsed(&lookup, "HEXMAP_VSYNC") {
            self.graphics.vsync = vsync;
        }

        // 地图配置
        if let Some(size_x) = parsed(&lookup, "HEXMAP_MAP_SIZE_X") {
            self.map.size_x = size_x;
        }
        if let Some(size_y) = parsed(&lookup, "HEXMAP_MAP_SIZE_Y") {
            self.map.size_y = size_y;
        }
        if let Some(seed) = parsed(&lookup, "HEXMAP_MAP_SEED") {
            self.map.seed = Some(seed);
        }

        // 着色器
        if let Some(path) = lookup("HEXMAP_VERTEX_SHADER") {
            self.shaders.vertex = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("HEXMAP_FRAGMENT_SHADER") {
            self.shaders.fragment = Some(PathBuf::from(path));
        }

        // 日志
        if let Some(level) = parsed(&lookup, "HEXMAP_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.graphics.validate()?;
        self.map.validate()?;
        self.shaders.validate()?;
        Ok(())
    }

    /// 查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./hexmap.toml
    /// 2. ./hexmap.json
    /// 3. `default_path()`
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        let candidates = [PathBuf::from("hexmap.toml"), PathBuf::from("hexmap.json")]
            .into_iter()
            .chain(Self::default_path());

        for path in candidates {
            if !path.is_file() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => {
                    tracing::info!(target: "config", path = %path.display(), "loaded config");
                    return config;
                }
                Err(err) => {
                    tracing::warn!(target: "config", path = %path.display(), %err, "skipping config");
                }
            }
        }

        tracing::info!(target: "config", "using default configuration");
        Self::default()
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，`RUST_LOG` 存在时以其为准
    pub level: LogLevel,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Info,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!("unknown log level `{other}`"))),
        }
    }
}
