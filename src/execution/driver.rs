//! 执行驱动
//!
//! @yutiansut @quantaxis
//!
//! - Deferred: 惰性拉取管道，上游只枚举一次，每次拉取前检查取消
//! - Immediate: 上游一次性缓冲为 Vec (缓冲前及每隔 N 个样本检查取消)，
//!   之后把所有权交给内核；异步路径下内核在阻塞线程池上运行
//!
//! 取消后输出序列正常结束 (可能被截断或为空)，不会产生错误。

use futures::future;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;

use super::cancel::CancellationToken;
use crate::function::computation::{Computation, ImmediateKernel, StreamKernel};
use crate::model::sample::SeriesValue;
use crate::model::series::{SampleIter, SampleStream};
use crate::observability::{BUFFERED_SAMPLES, BUFFER_LIMIT_EXCEEDED, CANCELLED_PIPELINES};
use crate::utils::config::ExecutionConfig;

/// 执行驱动
#[derive(Debug, Clone)]
pub struct ExecutionDriver {
    policy: BufferPolicy,
}

impl ExecutionDriver {
    pub fn new(function: impl Into<Arc<str>>, cancel: CancellationToken, config: &ExecutionConfig) -> Self {
        Self {
            policy: BufferPolicy {
                function: function.into(),
                cancel,
                max_buffered_samples: config.max_buffered_samples,
                check_interval: config.cancellation_check_interval.max(1),
            },
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.policy.cancel
    }

    /// 同步执行
    pub fn run<T: SeriesValue>(&self, computation: Computation<T>, source: SampleIter<T>) -> SampleIter<T> {
        match computation {
            Computation::Deferred(kernel) => Box::new(DeferredIter {
                upstream: source,
                kernel,
                pending: VecDeque::new(),
                policy: self.policy.clone(),
                done: false,
            }),
            Computation::Immediate(kernel) => Box::new(ImmediateIter {
                state: ImmediateState::Pending { source, kernel },
                policy: self.policy.clone(),
            }),
        }
    }

    /// 异步执行
    pub fn run_async<T: SeriesValue>(
        &self,
        computation: Computation<T>,
        source: SampleStream<T>,
    ) -> SampleStream<T> {
        match computation {
            Computation::Deferred(kernel) => {
                let state = DeferredStreamState {
                    upstream: source,
                    kernel,
                    pending: VecDeque::new(),
                    policy: self.policy.clone(),
                    done: false,
                };
                stream::unfold(state, |mut state| async move {
                    loop {
                        if let Some(sample) = state.pending.pop_front() {
                            return Some((sample, state));
                        }
                        if state.done {
                            return None;
                        }
                        if state.policy.check_cancelled() {
                            state.done = true;
                            return None;
                        }
                        match state.policy.next_or_cancelled(&mut state.upstream).await {
                            Pulled::Sample(sample) => state.kernel.update(sample, &mut state.pending),
                            Pulled::Exhausted => {
                                state.kernel.finish(&mut state.pending);
                                state.done = true;
                            }
                            Pulled::Cancelled => {
                                state.done = true;
                                return None;
                            }
                        }
                    }
                })
                .boxed()
            }
            Computation::Immediate(kernel) => {
                let policy = self.policy.clone();
                let cancel = self.policy.cancel.clone();
                let computed = async move {
                    let buffer = policy.buffer_async(source).await?;
                    Some(run_blocking(kernel, buffer).await)
                };
                stream::once(computed)
                    .flat_map(|output| stream::iter(output.unwrap_or_default()))
                    .take_while(move |_| future::ready(!cancel.is_cancelled()))
                    .boxed()
            }
        }
    }

    /// 给任意拉取序列 (如切片序列) 加上取消检查
    pub fn cancellable<I, S>(&self, source: S) -> Box<dyn Iterator<Item = I> + Send>
    where
        I: Send + 'static,
        S: Iterator<Item = I> + Send + 'static,
    {
        let policy = self.policy.clone();
        Box::new(source.take_while(move |_| !policy.check_cancelled()))
    }

    /// 异步版本
    pub fn cancellable_stream<I, S>(&self, source: S) -> futures::stream::BoxStream<'static, I>
    where
        I: Send + 'static,
        S: futures::Stream<Item = I> + Send + 'static,
    {
        let policy = self.policy.clone();
        source
            .take_while(move |_| future::ready(!policy.check_cancelled()))
            .boxed()
    }

    /// 同步缓冲 (取消时返回 None)
    pub fn buffer<T, I>(&self, source: I) -> Option<Vec<T>>
    where
        I: Iterator<Item = T>,
    {
        self.policy.buffer(source)
    }

    /// 异步缓冲 (取消时返回 None)
    pub async fn buffer_async<T>(&self, source: SampleStream<T>) -> Option<Vec<T>> {
        self.policy.buffer_async(source).await
    }
}

async fn run_blocking<T: Send + 'static>(kernel: ImmediateKernel<T>, buffer: Vec<T>) -> Vec<T> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => match handle.spawn_blocking(move || kernel(buffer)).await {
            Ok(output) => output,
            Err(e) => {
                log::error!("immediate kernel task failed: {}", e);
                Vec::new()
            }
        },
        Err(_) => kernel(buffer),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 缓冲策略
// ═══════════════════════════════════════════════════════════════════════════

enum Admission {
    Accept,
    Cancelled,
    Full,
}

/// 一次异步拉取的结果
enum Pulled<T> {
    Sample(T),
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone)]
struct BufferPolicy {
    function: Arc<str>,
    cancel: CancellationToken,
    max_buffered_samples: Option<usize>,
    check_interval: usize,
}

impl BufferPolicy {
    fn check_cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            CANCELLED_PIPELINES.inc();
            log::debug!("\"{}\" pipeline cancelled", self.function);
            true
        } else {
            false
        }
    }

    /// 等待上游下一个样本，等待期间被取消则立即返回
    async fn next_or_cancelled<T>(&self, upstream: &mut SampleStream<T>) -> Pulled<T> {
        let pulled = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            next = upstream.next() => Some(next),
        };
        match pulled {
            Some(Some(sample)) => Pulled::Sample(sample),
            Some(None) => Pulled::Exhausted,
            None => {
                self.check_cancelled();
                Pulled::Cancelled
            }
        }
    }

    fn admit(&self, buffered: usize) -> Admission {
        if buffered % self.check_interval == 0 && buffered > 0 && self.check_cancelled() {
            return Admission::Cancelled;
        }
        if let Some(max) = self.max_buffered_samples {
            if buffered >= max {
                BUFFER_LIMIT_EXCEEDED.inc();
                log::warn!(
                    "\"{}\" input exceeded the buffering ceiling of {} samples, remaining samples ignored",
                    self.function,
                    max
                );
                return Admission::Full;
            }
        }
        Admission::Accept
    }

    fn finish<T>(&self, buffer: Vec<T>) -> Option<Vec<T>> {
        if self.check_cancelled() {
            return None;
        }
        BUFFERED_SAMPLES.inc_by(buffer.len() as u64);
        Some(buffer)
    }

    fn buffer<T, I: Iterator<Item = T>>(&self, source: I) -> Option<Vec<T>> {
        if self.check_cancelled() {
            return None;
        }
        let mut buffer = Vec::new();
        for sample in source {
            match self.admit(buffer.len()) {
                Admission::Accept => buffer.push(sample),
                Admission::Cancelled => return None,
                Admission::Full => break,
            }
        }
        self.finish(buffer)
    }

    async fn buffer_async<T>(&self, mut source: SampleStream<T>) -> Option<Vec<T>> {
        if self.check_cancelled() {
            return None;
        }
        let mut buffer = Vec::new();
        loop {
            let sample = match self.next_or_cancelled(&mut source).await {
                Pulled::Sample(sample) => sample,
                Pulled::Exhausted => break,
                Pulled::Cancelled => return None,
            };
            match self.admit(buffer.len()) {
                Admission::Accept => buffer.push(sample),
                Admission::Cancelled => return None,
                Admission::Full => break,
            }
        }
        self.finish(buffer)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 同步迭代器
// ═══════════════════════════════════════════════════════════════════════════

struct DeferredIter<T> {
    upstream: SampleIter<T>,
    kernel: Box<dyn StreamKernel<T>>,
    pending: VecDeque<T>,
    policy: BufferPolicy,
    done: bool,
}

impl<T> Iterator for DeferredIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Some(sample);
            }
            if self.done {
                return None;
            }
            if self.policy.check_cancelled() {
                self.done = true;
                return None;
            }
            match self.upstream.next() {
                Some(sample) => self.kernel.update(sample, &mut self.pending),
                None => {
                    self.kernel.finish(&mut self.pending);
                    self.done = true;
                }
            }
        }
    }
}

struct DeferredStreamState<T> {
    upstream: SampleStream<T>,
    kernel: Box<dyn StreamKernel<T>>,
    pending: VecDeque<T>,
    policy: BufferPolicy,
    done: bool,
}

enum ImmediateState<T> {
    Pending {
        source: SampleIter<T>,
        kernel: ImmediateKernel<T>,
    },
    Ready(std::vec::IntoIter<T>),
    Done,
}

/// 首次拉取时才缓冲上游并运行内核
struct ImmediateIter<T> {
    state: ImmediateState<T>,
    policy: BufferPolicy,
}

impl<T> Iterator for ImmediateIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if let ImmediateState::Pending { .. } = self.state {
            if let ImmediateState::Pending { source, kernel } =
                std::mem::replace(&mut self.state, ImmediateState::Done)
            {
                if let Some(buffer) = self.policy.buffer(source) {
                    self.state = ImmediateState::Ready(kernel(buffer).into_iter());
                }
            }
        }

        match &mut self.state {
            ImmediateState::Ready(output) => {
                if self.policy.cancel.is_cancelled() {
                    self.state = ImmediateState::Done;
                    return None;
                }
                output.next()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::computation::map_value;
    use crate::model::sample::MeasurementValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn samples(n: usize) -> Vec<MeasurementValue> {
        (0..n)
            .map(|i| MeasurementValue::new("A", i as f64, i as f64 * 1_000.0))
            .collect()
    }

    fn driver(config: &ExecutionConfig) -> ExecutionDriver {
        ExecutionDriver::new("Test", CancellationToken::new(), config)
    }

    fn sorted_desc() -> Computation<MeasurementValue> {
        Computation::immediate(|mut values: Vec<MeasurementValue>| {
            values.sort_by(|a, b| b.value.total_cmp(&a.value));
            values
        })
    }

    #[test]
    fn test_deferred_is_lazy() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source: SampleIter<MeasurementValue> = Box::new(samples(100).into_iter().inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut output = driver(&ExecutionConfig::default()).run(map_value(|v| v * 2.0), source);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
        assert_eq!(output.next().unwrap().value, 0.0);
        assert_eq!(output.next().unwrap().value, 2.0);
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_immediate_buffers_once() {
        let output: Vec<_> = driver(&ExecutionConfig::default())
            .run(sorted_desc(), Box::new(samples(5).into_iter()))
            .collect();
        let values: Vec<f64> = output.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_buffer_ceiling_truncates() {
        let config = ExecutionConfig {
            max_buffered_samples: Some(3),
            ..Default::default()
        };
        let output: Vec<_> = driver(&config)
            .run(sorted_desc(), Box::new(samples(10).into_iter()))
            .collect();
        assert_eq!(output.len(), 3);
        assert_eq!(output[0].value, 2.0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let driver = ExecutionDriver::new("Test", cancel, &ExecutionConfig::default());
        assert_eq!(
            driver
                .run(sorted_desc(), Box::new(samples(10).into_iter()))
                .count(),
            0
        );
        assert_eq!(
            driver
                .run(map_value(|v| v), Box::new(samples(10).into_iter()))
                .count(),
            0
        );
    }

    #[test]
    fn test_cancel_during_buffering() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let config = ExecutionConfig {
            cancellation_check_interval: 4,
            ..Default::default()
        };
        let driver = ExecutionDriver::new("Test", cancel, &config);

        // 无界上游，拉到第 10 个样本时触发取消
        let source: SampleIter<MeasurementValue> = Box::new((0..).map(move |i| {
            if i == 10 {
                trigger.cancel();
            }
            MeasurementValue::new("A", i as f64, i as f64)
        }));
        assert!(driver.buffer(source).is_none());
    }

    #[tokio::test]
    async fn test_async_deferred_and_immediate() {
        let driver = driver(&ExecutionConfig::default());
        let source = stream::iter(samples(4)).boxed();
        let doubled: Vec<f64> = driver
            .run_async(map_value(|v| v * 2.0), source)
            .map(|s| s.value)
            .collect()
            .await;
        assert_eq!(doubled, vec![0.0, 2.0, 4.0, 6.0]);

        let source = stream::iter(samples(4)).boxed();
        let sorted: Vec<f64> = driver
            .run_async(sorted_desc(), source)
            .map(|s| s.value)
            .collect()
            .await;
        assert_eq!(sorted, vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_async_wait_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        let driver = ExecutionDriver::new("Test", cancel.clone(), &ExecutionConfig::default());

        // 先给出一个样本，之后永不产出
        let stalled = || stream::iter(samples(1)).chain(stream::pending()).boxed();
        let deferred = driver.run_async(map_value(|v| v + 1.0), stalled());
        let buffering = driver.buffer_async(stalled());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let bound = std::time::Duration::from_secs(2);
        let values: Vec<f64> = tokio::time::timeout(bound, deferred.map(|s| s.value).collect())
            .await
            .unwrap();
        assert_eq!(values, vec![1.0]);
        assert!(tokio::time::timeout(bound, buffering).await.unwrap().is_none());
    }
}
