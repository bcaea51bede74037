use std::fs;
use std::path::PathBuf;

use super::{ConfigError, ConfigResult};
use crate::render::shaders::{HEX_FRAGMENT_SHADER, HEX_VERTEX_SHADER};
use serde::{Deserialize, Serialize};

/// 着色器源码配置
///
/// 未指定路径的阶段使用内置 WGSL。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// 顶点着色器文件
    pub vertex: Option<PathBuf>,
    /// 片元着色器文件
    pub fragment: Option<PathBuf>,
}

impl ShaderConfig {
    /// 读取 (顶点, 片元) 源码
    pub fn load_sources(&self) -> ConfigResult<(String, String)> {
        let vertex = match &self.vertex {
            Some(path) => fs::read_to_string(path)?,
            None => HEX_VERTEX_SHADER.to_string(),
        };
        let fragment = match &self.fragment {
            Some(path) => fs::read_to_string(path)?,
            None => HEX_FRAGMENT_SHADER.to_string(),
        };
        Ok((vertex, fragment))
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        for path in self.vertex.iter().chain(self.fragment.iter()) {
            if !path.is_file() {
                return Err(ConfigError::ValidationError(format!(
                    "Shader file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_sources() {
        let (vertex, fragment) = ShaderConfig::default().load_sources().unwrap();
        assert!(vertex.contains("@vertex"));
        assert!(fragment.contains("@fragment"));
    }

    #[test]
    fn test_file_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "// custom fragment").unwrap();

        let config = ShaderConfig {
            vertex: None,
            fragment: Some(file.path().to_path_buf()),
        };
        assert!(config.validate().is_ok());
        let (vertex, fragment) = config.load_sources().unwrap();
        assert_eq!(vertex, HEX_VERTEX_SHADER);
        assert_eq!(fragment, "// custom fragment");
    }

    #[test]
    fn test_missing_file() {
        let config = ShaderConfig {
            vertex: Some(PathBuf::from("/nonexistent/hex.wgsl")),
            fragment: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(config.load_sources(), Err(ConfigError::FileError(_))));
    }
}
