//! 配置管理模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Result, SeriesError};

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub slice: SliceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SeriesError::ConfigError(format!("Failed to read engine config file: {}", e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 加载默认配置文件
    pub fn load_default() -> Result<Self> {
        Self::load_from_file("config/engine.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content).map_err(|e| {
            SeriesError::ConfigError(format!("Failed to parse engine config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.cancellation_check_interval == 0 {
            return Err(SeriesError::ConfigError(
                "execution.cancellation_check_interval must be greater than zero".into(),
            ));
        }
        if self.execution.max_buffered_samples == Some(0) {
            return Err(SeriesError::ConfigError(
                "execution.max_buffered_samples must be greater than zero when set".into(),
            ));
        }
        if let Some(max) = self.slice.max_tolerance_seconds {
            if !max.is_finite() || max < 0.0 {
                return Err(SeriesError::ConfigError(
                    "slice.max_tolerance_seconds must be a non-negative number".into(),
                ));
            }
        }
        Ok(())
    }
}

/// 执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Immediate 内核输入缓冲上限，None 表示不限
    #[serde(default)]
    pub max_buffered_samples: Option<usize>,
    /// 缓冲期间每隔多少个样本检查一次取消
    #[serde(default = "default_check_interval")]
    pub cancellation_check_interval: usize,
    /// 字面量解析缓存容量，0 表示关闭缓存
    #[serde(default = "default_cache_capacity")]
    pub literal_cache_capacity: usize,
    /// 批量调用是否使用 rayon 并行
    #[serde(default = "default_true")]
    pub parallel_batch: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_buffered_samples: None,
            cancellation_check_interval: default_check_interval(),
            literal_cache_capacity: default_cache_capacity(),
            parallel_batch: true,
        }
    }
}

/// 切片配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SliceConfig {
    /// 允许的最大切片容差 (秒)
    #[serde(default)]
    pub max_tolerance_seconds: Option<f64>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_check_interval() -> usize {
    1024
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
