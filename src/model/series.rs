//! 序列句柄
//!
//! @yutiansut @quantaxis
//!
//! 输入序列由调用方提供 (同步迭代器或异步 Stream)，输出序列保持惰性，
//! 由调用方拉取时才驱动内核计算。

use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use super::metadata::MetadataMap;
use super::sample::SeriesValue;

/// 同步样本序列
pub type SampleIter<T> = Box<dyn Iterator<Item = T> + Send>;

/// 异步样本序列
pub type SampleStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

// ═══════════════════════════════════════════════════════════════════════════
// 输入序列
// ═══════════════════════════════════════════════════════════════════════════

/// 同步输入序列
pub struct SourceSeries<T> {
    pub target: Arc<str>,
    pub metadata: MetadataMap,
    pub samples: SampleIter<T>,
}

impl<T: SeriesValue> SourceSeries<T> {
    pub fn new<I>(target: impl Into<Arc<str>>, samples: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            target: target.into(),
            metadata: MetadataMap::new(),
            samples: Box::new(samples.into_iter()),
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<T> fmt::Debug for SourceSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSeries")
            .field("target", &self.target)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// 异步输入序列
pub struct AsyncSourceSeries<T> {
    pub target: Arc<str>,
    pub metadata: MetadataMap,
    pub samples: SampleStream<T>,
}

impl<T: SeriesValue> AsyncSourceSeries<T> {
    pub fn new<S>(target: impl Into<Arc<str>>, samples: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            target: target.into(),
            metadata: MetadataMap::new(),
            samples: samples.boxed(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<T: SeriesValue> From<SourceSeries<T>> for AsyncSourceSeries<T> {
    fn from(source: SourceSeries<T>) -> Self {
        Self {
            target: source.target,
            metadata: source.metadata,
            samples: futures::stream::iter(source.samples).boxed(),
        }
    }
}

impl<T> fmt::Debug for AsyncSourceSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSourceSeries")
            .field("target", &self.target)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 输出序列
// ═══════════════════════════════════════════════════════════════════════════

/// 同步输出序列
pub struct ResultSeries<T> {
    /// 输出标签，例如 `Add(1.5, PPA:1)`
    pub target: String,
    /// 产生该输出的源目标 (Set/Slice 模式下为源表达式)
    pub root_target: Arc<str>,
    pub metadata: MetadataMap,
    pub samples: SampleIter<T>,
}

impl<T> ResultSeries<T> {
    /// 拉取全部样本
    pub fn collect_samples(self) -> Vec<T> {
        self.samples.collect()
    }
}

impl<T> fmt::Debug for ResultSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSeries")
            .field("target", &self.target)
            .field("root_target", &self.root_target)
            .finish_non_exhaustive()
    }
}

/// 异步输出序列
pub struct AsyncResultSeries<T> {
    pub target: String,
    pub root_target: Arc<str>,
    pub metadata: MetadataMap,
    pub samples: SampleStream<T>,
}

impl<T> AsyncResultSeries<T> {
    pub async fn collect_samples(self) -> Vec<T> {
        self.samples.collect().await
    }
}

impl<T> fmt::Debug for AsyncResultSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResultSeries")
            .field("target", &self.target)
            .field("root_target", &self.root_target)
            .finish_non_exhaustive()
    }
}
