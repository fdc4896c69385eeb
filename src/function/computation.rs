//! 内核计算契约
//!
//! @yutiansut @quantaxis
//!
//! - Deferred: `StreamKernel` 状态机，逐样本 `update`，结束时 `finish`
//! - Immediate: 获得一次性物化的输入缓冲区，可任意排序/多次扫描

use std::collections::VecDeque;

use super::ExecutionMode;
use crate::model::sample::SeriesValue;

/// 流式内核 (Deferred)
pub trait StreamKernel<T>: Send {
    /// 处理一个样本，产生的输出写入 `out`
    fn update(&mut self, sample: T, out: &mut VecDeque<T>);

    /// 上游耗尽时调用
    fn finish(&mut self, _out: &mut VecDeque<T>) {}
}

/// 物化内核 (Immediate)
pub type ImmediateKernel<T> = Box<dyn FnOnce(Vec<T>) -> Vec<T> + Send>;

/// 一次调用 (或一个切片) 的计算
pub enum Computation<T> {
    Deferred(Box<dyn StreamKernel<T>>),
    Immediate(ImmediateKernel<T>),
}

impl<T: SeriesValue> Computation<T> {
    pub fn deferred(kernel: impl StreamKernel<T> + 'static) -> Self {
        Computation::Deferred(Box::new(kernel))
    }

    pub fn immediate(kernel: impl FnOnce(Vec<T>) -> Vec<T> + Send + 'static) -> Self {
        Computation::Immediate(Box::new(kernel))
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            Computation::Deferred(_) => ExecutionMode::Deferred,
            Computation::Immediate(_) => ExecutionMode::Immediate,
        }
    }

    /// 对已物化的小批量样本 (切片) 直接求值
    pub fn apply(self, samples: Vec<T>) -> Vec<T> {
        match self {
            Computation::Deferred(mut kernel) => {
                let mut out = VecDeque::with_capacity(samples.len());
                for sample in samples {
                    kernel.update(sample, &mut out);
                }
                kernel.finish(&mut out);
                out.into()
            }
            Computation::Immediate(kernel) => kernel(samples),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 通用组合子
// ═══════════════════════════════════════════════════════════════════════════

/// 主值逐点变换
pub struct MapValue<F> {
    f: F,
}

impl<T, F> StreamKernel<T> for MapValue<F>
where
    T: SeriesValue,
    F: FnMut(f64) -> f64 + Send,
{
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        sample.set_value((self.f)(sample.value()));
        out.push_back(sample);
    }
}

/// 全部分量逐点变换
pub struct MapComponents<F> {
    f: F,
}

impl<T, F> StreamKernel<T> for MapComponents<F>
where
    T: SeriesValue,
    F: Fn(f64) -> f64 + Send,
{
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        sample.map_components(&self.f);
        out.push_back(sample);
    }
}

/// 谓词过滤
pub struct Filter<P> {
    predicate: P,
}

impl<T, P> StreamKernel<T> for Filter<P>
where
    T: SeriesValue,
    P: FnMut(&T) -> bool + Send,
{
    fn update(&mut self, sample: T, out: &mut VecDeque<T>) {
        if (self.predicate)(&sample) {
            out.push_back(sample);
        }
    }
}

/// 原样透传
pub struct Passthrough;

impl<T: SeriesValue> StreamKernel<T> for Passthrough {
    fn update(&mut self, sample: T, out: &mut VecDeque<T>) {
        out.push_back(sample);
    }
}

/// 主值逐点变换 (标度/平移/取整/单位换算等)
pub fn map_value<T, F>(f: F) -> Computation<T>
where
    T: SeriesValue,
    F: FnMut(f64) -> f64 + Send + 'static,
{
    Computation::deferred(MapValue { f })
}

/// 全部分量逐点变换 (相量同时作用于幅值与相角)
pub fn map_components<T, F>(f: F) -> Computation<T>
where
    T: SeriesValue,
    F: Fn(f64) -> f64 + Send + 'static,
{
    Computation::deferred(MapComponents { f })
}

pub fn filter<T, P>(predicate: P) -> Computation<T>
where
    T: SeriesValue,
    P: FnMut(&T) -> bool + Send + 'static,
{
    Computation::deferred(Filter { predicate })
}

pub fn passthrough<T: SeriesValue>() -> Computation<T> {
    Computation::deferred(Passthrough)
}
