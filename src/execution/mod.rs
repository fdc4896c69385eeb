//! 执行模块
//!
//! @yutiansut @quantaxis
//!
//! - cancel: 协作式取消令牌
//! - driver: Deferred / Immediate 执行驱动 (同步迭代器与异步 Stream)
//! - slice: 多序列时间切片
//! - label: 标签模板解析
//! - engine: 调用入口，串联绑定、分组解析、切片与执行

pub mod cancel;
pub mod driver;
pub mod engine;
pub mod label;
pub mod slice;

pub use cancel::CancellationToken;
pub use driver::ExecutionDriver;
pub use engine::{FunctionEngine, InvocationRequest};
pub use slice::{AsyncTimeSliceScanner, TimeSliceScanner};
