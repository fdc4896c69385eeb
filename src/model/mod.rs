//! 样本模型模块
//!
//! @yutiansut @quantaxis
//!
//! - sample: 标量/相量样本及统一能力 trait
//! - metadata: 按目标共享的元数据表
//! - series: 输入/输出序列句柄
//! - units: 时间与角度单位

pub mod metadata;
pub mod sample;
pub mod series;
pub mod units;

pub use metadata::{MetadataCollection, MetadataMap};
pub use sample::{MeasurementFlags, MeasurementValue, PhasorValue, SeriesValue, ValueShape};
pub use series::{
    AsyncResultSeries, AsyncSourceSeries, ResultSeries, SampleIter, SampleStream, SourceSeries,
};
pub use units::{AngleUnit, TimeUnit};
