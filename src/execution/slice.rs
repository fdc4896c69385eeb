//! 时间切片扫描
//!
//! @yutiansut @quantaxis
//!
//! 把 N 条按时间有序的序列按容差合并为切片：
//! 锚点为所有游标中最早的未消费样本，头部满足 `head.time - anchor <= tolerance`
//! 的序列各贡献一个样本，切片内样本按序列提供顺序排列。
//! 部分覆盖的切片同样有效，直到所有游标耗尽。

use futures::stream::{self, Peekable, StreamExt};
use std::iter::Peekable as IterPeekable;
use std::pin::Pin;

use crate::model::sample::SeriesValue;
use crate::model::series::{SampleIter, SampleStream};
use crate::observability::SLICES_EMITTED;

/// 最早的头部时间 (相同时间时保留先提供的序列)
fn earliest(heads: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    heads.flatten().fold(None, |anchor, time| match anchor {
        Some(current) if current <= time => Some(current),
        _ => Some(time),
    })
}

/// 同步切片扫描器
pub struct TimeSliceScanner<T> {
    cursors: Vec<IterPeekable<SampleIter<T>>>,
    /// 毫秒
    tolerance: f64,
}

impl<T: SeriesValue> TimeSliceScanner<T> {
    pub fn new(sources: Vec<SampleIter<T>>, tolerance_ms: f64) -> Self {
        Self {
            cursors: sources.into_iter().map(Iterator::peekable).collect(),
            tolerance: tolerance_ms.max(0.0),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl<T: SeriesValue> Iterator for TimeSliceScanner<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        let anchor = earliest(
            self.cursors
                .iter_mut()
                .map(|cursor| cursor.peek().map(SeriesValue::time)),
        )?;

        let tolerance = self.tolerance;
        let slice: Vec<T> = self
            .cursors
            .iter_mut()
            .filter_map(|cursor| cursor.next_if(|head| head.time() - anchor <= tolerance))
            .collect();

        SLICES_EMITTED.inc();
        Some(slice)
    }
}

/// 异步切片扫描器
pub struct AsyncTimeSliceScanner<T> {
    cursors: Vec<Peekable<SampleStream<T>>>,
    tolerance: f64,
}

impl<T: SeriesValue> AsyncTimeSliceScanner<T> {
    pub fn new(sources: Vec<SampleStream<T>>, tolerance_ms: f64) -> Self {
        Self {
            cursors: sources.into_iter().map(StreamExt::peekable).collect(),
            tolerance: tolerance_ms.max(0.0),
        }
    }

    /// 读取下一个切片，全部游标耗尽时返回 None
    pub async fn next_slice(&mut self) -> Option<Vec<T>> {
        let mut heads = Vec::with_capacity(self.cursors.len());
        for cursor in self.cursors.iter_mut() {
            heads.push(Pin::new(cursor).peek().await.map(SeriesValue::time));
        }
        let anchor = earliest(heads.iter().copied())?;

        let mut slice = Vec::new();
        for (cursor, head) in self.cursors.iter_mut().zip(heads) {
            match head {
                Some(time) if time - anchor <= self.tolerance => {
                    if let Some(sample) = cursor.next().await {
                        slice.push(sample);
                    }
                }
                _ => {}
            }
        }

        SLICES_EMITTED.inc();
        Some(slice)
    }

    pub fn into_stream(self) -> Pin<Box<dyn futures::Stream<Item = Vec<T>> + Send>> {
        stream::unfold(self, |mut scanner| async move {
            scanner.next_slice().await.map(|slice| (slice, scanner))
        })
        .boxed()
    }
}
