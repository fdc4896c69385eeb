//! # QASERIES-RS
//!
//! 查询时序分析函数执行引擎
//!
//! ## 核心能力
//!
//! - **参数绑定**: 字面量/目标序列引用/自定义解析器 (function::binder)
//! - **分组运算**: Standard / Set / Slice 三种分组语义及覆盖策略 (function::group_operation)
//! - **时间切片**: 多序列按容差对齐 (execution::slice)
//! - **执行驱动**: Deferred 流式 / Immediate 物化, 同步迭代器与异步 Stream, 协作式取消
//! - **形态分派**: 标量样本与相量样本 (幅值/相角) 共享同一编排层 (model::sample)
//! - **元数据标签**: 按目标共享的注解表, 标签模板替换 (execution::label)
//!
//! ## 架构设计
//!
//! ```text
//! 调用方 (InvocationRequest + SourceSeries)
//!     ↓
//! Parameter Binder (function/)
//!     ↓
//! Group-Operation Resolver (function/group_operation)
//!     ↓
//! Slice Windower (execution/slice)   ← 仅 Slice 模式
//!     ↓
//! Variant Dispatcher (function/registry) → kernels/
//!     ↓
//! Execution Driver (execution/driver) → ResultSeries
//! ```

#![allow(clippy::type_complexity)]

// ============================================================================
// 外部依赖
// ============================================================================

// 异步运行时
pub use futures;
pub use tokio;

// 并发工具
pub use dashmap;
pub use parking_lot;
pub use rayon;

// 序列化
pub use serde;
pub use serde_json;

// 日志
pub use log;

// 错误处理
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 样本模型 (标量/相量), 元数据表, 时间/角度单位
pub mod model;

/// 函数描述符, 参数定义与绑定, 分组运算, 函数目录
pub mod function;

/// 执行驱动, 取消, 时间切片, 标签解析, 引擎入口
pub mod execution;

/// 内置函数内核
pub mod kernels;

/// 增量统计算子 (Welford, 环形缓冲, 滚动窗口)
pub mod operators;

/// Evaluate 表达式 DSL
pub mod dsl;

/// 配置
pub mod utils;

// 可观测性模块 (Prometheus + tracing)
pub mod observability;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use execution::cancel::CancellationToken;
pub use execution::engine::{FunctionEngine, InvocationRequest};
pub use function::group_operation::{GroupOperation, GroupOperationPolicy, GroupOperations};
pub use function::parameter::{ParameterDefinition, ParameterType, ParameterValue, Parameters};
pub use function::registry::FunctionCatalog;
pub use function::{ExecutionMode, FunctionDescriptor, ReturnType};
pub use model::metadata::{MetadataCollection, MetadataMap};
pub use model::sample::{MeasurementFlags, MeasurementValue, PhasorValue, SeriesValue, ValueShape};
pub use model::series::{AsyncResultSeries, AsyncSourceSeries, ResultSeries, SourceSeries};
pub use utils::config::EngineConfig;

// ============================================================================
// 全局错误类型
// ============================================================================

/// 函数执行错误类型
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("Binding error: {0}")]
    BindingError(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Unsupported group operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Expression error: {0}")]
    ExpressionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SeriesError {
    /// 绑定类错误 (含调用语法格式错误)
    pub fn is_binding_error(&self) -> bool {
        matches!(self, SeriesError::BindingError(_) | SeriesError::FormatError(_))
    }

    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            SeriesError::BindingError(_) => "binding",
            SeriesError::FormatError(_) => "format",
            SeriesError::UnsupportedOperation(_) => "unsupported_operation",
            SeriesError::UnknownFunction(_) => "unknown_function",
            SeriesError::RegistrationError(_) => "registration",
            SeriesError::ExpressionError(_) => "expression",
            SeriesError::ConfigError(_) => "config",
            SeriesError::SerializationError(_) => "serialization",
            SeriesError::InternalError(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for SeriesError {
    fn from(e: serde_json::Error) -> Self {
        SeriesError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SeriesError>;

// ============================================================================
// 测试模块
// ============================================================================
