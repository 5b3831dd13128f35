use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "CADBRIDGE_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.matching.validate(path)?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `CADBRIDGE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 空间匹配参数。
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MatchingConfig {
    /// 线段缓冲区半宽。
    #[serde(default = "MatchingConfig::default_tolerance")]
    pub tolerance: f64,
    /// 判定标注方向时的坐标比较容差。
    #[serde(default = "MatchingConfig::default_axis_epsilon")]
    pub axis_epsilon: f64,
}

impl MatchingConfig {
    fn default_tolerance() -> f64 {
        20.0
    }

    fn default_axis_epsilon() -> f64 {
        0.1
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid("matching.tolerance 必须为正数"));
        }
        if !(self.axis_epsilon.is_finite() && self.axis_epsilon > 0.0) {
            return Err(invalid("matching.axis_epsilon 必须为正数"));
        }
        Ok(())
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
            axis_epsilon: Self::default_axis_epsilon(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// JSON 输出是否缩进。
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置文件 {path:?} 无效: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.matching.tolerance, 20.0);
        assert_eq!(cfg.matching.axis_epsilon, 0.1);
        assert!(!cfg.output.pretty);
    }

    #[test]
    fn load_from_temp_file() {
        let file = write_config(
            r#"
            [logging]
            level = "debug"

            [matching]
            tolerance = 5.0
            axis_epsilon = 0.01

            [output]
            pretty = true
            "#,
        );

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.matching.tolerance, 5.0);
        assert_eq!(cfg.matching.axis_epsilon, 0.01);
        assert!(cfg.output.pretty);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let file = write_config("[matching]\ntolerance = 12.5\n");
        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.matching.tolerance, 12.5);
        assert_eq!(cfg.matching.axis_epsilon, 0.1);
        assert_eq!(cfg.logging, LoggingConfig::default());
        assert_eq!(cfg.output, OutputConfig::default());
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let file = write_config("[matching]\ntolerance = 0.0\n");
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("matching.tolerance"));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let file = write_config("[matching\ntolerance = ");
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
