//! 可观测性模块
//!
//! @yutiansut @quantaxis
//!
//! 提供 Prometheus 指标导出与 tracing 日志初始化

pub mod metrics;
pub mod tracing;

pub use metrics::*;
