//! 日志订阅者初始化
//!
//! @yutiansut @quantaxis
//!
//! 引擎内部用 `log` 宏记录绑定、缓冲截断与取消事件，用 `tracing` span
//! 包裹每次调用。本模块把二者接到同一个 tracing-subscriber 上：
//! RUST_LOG 优先，其次取 `[logging]` 配置段。

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::utils::config::{EngineConfig, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("Invalid log filter \"{filter}\": {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Global subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// 订阅者选项
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    /// RUST_LOG 未设置时使用的过滤表达式
    pub filter: String,
    pub json: bool,
    /// 控制台输出附带源码位置
    pub with_location: bool,
}

impl From<&LoggingConfig> for SubscriberOptions {
    fn from(logging: &LoggingConfig) -> Self {
        Self {
            filter: logging.level.clone(),
            json: logging.json,
            with_location: false,
        }
    }
}

impl SubscriberOptions {
    /// 调试函数内核时使用：本 crate 打到 trace
    pub fn verbose() -> Self {
        Self {
            filter: "info,qaseries=trace".to_string(),
            json: false,
            with_location: true,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingInitError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.filter).map_err(|e| LoggingInitError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }

    /// 安装全局订阅者，进程内只能成功一次
    pub fn install(&self) -> Result<(), LoggingInitError> {
        let filter = self.env_filter()?;
        let registry = Registry::default().with(filter);

        let installed = if self.json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_target(true))
                .try_init()
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_file(self.with_location)
                        .with_line_number(self.with_location),
                )
                .try_init()
        };
        installed.map_err(|e| LoggingInitError::AlreadyInstalled(e.to_string()))?;

        log::info!(
            "qaseries logging ready (filter: {}, json: {})",
            self.filter,
            self.json
        );
        Ok(())
    }
}

/// 按引擎配置的 `[logging]` 段安装订阅者
pub fn init_logging(config: &EngineConfig) -> Result<(), LoggingInitError> {
    SubscriberOptions::from(&config.logging).install()
}
