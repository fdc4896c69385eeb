//! 时间相关内核 - 差分、导数、间隔抽样、平滑
//!
//! @yutiansut @quantaxis

use std::collections::VecDeque;

use crate::function::computation::{Computation, StreamKernel};
use crate::function::parameter::{ParameterDefinition, ParameterType, ParameterValue};
use crate::function::registry::FunctionCatalog;
use crate::function::FunctionDescriptor;
use crate::model::sample::SeriesValue;
use crate::model::units::TimeUnit;
use crate::operators::{RollingMean, ScalarKalman};
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// 相邻样本差分
// ═══════════════════════════════════════════════════════════════════════════

/// 相邻样本 (前, 后) 计算新值，首个样本不产生输出
struct Pairwise<T, F> {
    previous: Option<(f64, f64)>,
    compute: F,
    _sample: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> StreamKernel<T> for Pairwise<T, F>
where
    T: SeriesValue,
    F: FnMut(f64, f64, f64, f64) -> f64 + Send,
{
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        let current = (sample.time(), sample.value());
        if let Some((previous_time, previous_value)) = self.previous.replace(current) {
            let value = (self.compute)(previous_time, previous_value, current.0, current.1);
            sample.set_value(value);
            out.push_back(sample);
        }
    }
}

/// `compute(prev_time, prev_value, time, value)`
fn pairwise<T, F>(compute: F) -> Computation<T>
where
    T: SeriesValue,
    F: FnMut(f64, f64, f64, f64) -> f64 + Send + 'static,
{
    Computation::deferred(Pairwise {
        previous: None,
        compute,
        _sample: std::marker::PhantomData,
    })
}

/// 导数，时间差为零时按一个单位步长处理
pub fn derivative(previous_value: f64, value: f64, elapsed: f64) -> f64 {
    let step = if elapsed == 0.0 { 1.0 } else { elapsed };
    (value - previous_value) / step
}

// ═══════════════════════════════════════════════════════════════════════════
// 间隔抽样
// ═══════════════════════════════════════════════════════════════════════════

/// 与上一个输出样本至少间隔 `interval_ms` 才输出
struct Interval {
    interval_ms: f64,
    last_emitted: Option<f64>,
}

impl<T: SeriesValue> StreamKernel<T> for Interval {
    fn update(&mut self, sample: T, out: &mut VecDeque<T>) {
        let due = match self.last_emitted {
            Some(last) => sample.time() - last >= self.interval_ms,
            None => true,
        };
        if due {
            self.last_emitted = Some(sample.time());
            out.push_back(sample);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 平滑
// ═══════════════════════════════════════════════════════════════════════════

struct MovingAverage {
    mean: RollingMean,
}

impl<T: SeriesValue> StreamKernel<T> for MovingAverage {
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        sample.set_value(self.mean.update(sample.value()));
        out.push_back(sample);
    }
}

struct KalmanFilter {
    filter: ScalarKalman,
}

impl<T: SeriesValue> StreamKernel<T> for KalmanFilter {
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        let value = sample.value();
        if value.is_finite() {
            sample.set_value(self.filter.update(value));
        }
        out.push_back(sample);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 注册
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    catalog.register(
        FunctionDescriptor::new(
            "Difference",
            "Returns a series of values that represent the difference between consecutive values in the source series.",
        )
        .aliases(&["Diff"]),
        |_| Ok(pairwise(|_, previous, _, value| value - previous)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "TimeDifference",
            "Returns a series of values that represent the time difference, in time units, between consecutive values in the source series.",
        )
        .aliases(&["TimeDiff", "Elapsed"])
        .parameter(super::time_units(TimeUnit::Seconds, "Time unit of the result.")),
        |p| {
            let units = p.time_unit(0)?;
            Ok(pairwise(move |previous_time, _, time, _| {
                units.from_milliseconds(time - previous_time)
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Derivative",
            "Returns a series of values that represent the rate of change, per time unit, for the difference between consecutive values in the source series.",
        )
        .aliases(&["Der"])
        .parameter(super::time_units(TimeUnit::Seconds, "Time unit of the rate.")),
        |p| {
            let units = p.time_unit(0)?;
            Ok(pairwise(move |previous_time, previous, time, value| {
                derivative(previous, value, units.from_milliseconds(time - previous_time))
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Interval",
            "Returns a series of values that represent a decimated set of the values in the source series based on the specified interval N, in time units.",
        )
        .parameter(ParameterDefinition::required(
            "N",
            ParameterType::Float,
            "Minimum spacing between returned values, or the name of a series whose first value is used.",
        ))
        .parameter(super::time_units(TimeUnit::Seconds, "Time unit of N.")),
        |p| {
            let units = p.time_unit(1)?;
            let interval_ms = units.to_milliseconds(p.float(0)?.max(0.0));
            Ok(Computation::deferred(Interval {
                interval_ms,
                last_emitted: None,
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "MovingAverage",
            "Returns a series of values that represent the simple moving average over a trailing window of the values in the source series.",
        )
        .aliases(&["MovAvg", "SMA"])
        .parameter(ParameterDefinition::optional(
            "window",
            ParameterType::Integer,
            Some(ParameterValue::Integer(5)),
            "Number of trailing values in the window.",
        )),
        |p| {
            let window = p.integer(0)?.max(1) as usize;
            Ok(Computation::deferred(MovingAverage {
                mean: RollingMean::new(window),
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "KalmanFilter",
            "Returns a series of values smoothed by a one-dimensional Kalman filter.",
        )
        .aliases(&["Kalman"])
        .parameter(ParameterDefinition::optional(
            "processNoise",
            ParameterType::Float,
            Some(ParameterValue::Float(1e-5)),
            "Process noise covariance.",
        ))
        .parameter(ParameterDefinition::optional(
            "measurementNoise",
            ParameterType::Float,
            Some(ParameterValue::Float(1e-3)),
            "Measurement noise covariance.",
        )),
        |p| {
            Ok(Computation::deferred(KalmanFilter {
                filter: ScalarKalman::new(p.float(0)?, p.float(1)?),
            }))
        },
    )?;

    Ok(())
}
