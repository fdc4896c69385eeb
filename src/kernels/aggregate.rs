//! 聚合内核 - 每组输入产生单个值
//!
//! @yutiansut @quantaxis
//!
//! 聚合结果以最后一个输入样本为模板输出 (保留目标与时间)，
//! 最值类函数输出取得极值的那个样本。

use std::collections::VecDeque;
use std::marker::PhantomData;

use crate::function::computation::{Computation, StreamKernel};
use crate::function::parameter::{ParameterDefinition, ParameterType, ParameterValue};
use crate::function::registry::FunctionCatalog;
use crate::function::{FunctionDescriptor, ReturnType};
use crate::model::sample::SeriesValue;
use crate::model::units::TimeUnit;
use crate::operators::{
    Count, IncrementalOperator, Mean, PopulationStdDev, Range, SampleStdDev, Sum,
};
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// 增量归约
// ═══════════════════════════════════════════════════════════════════════════

/// 以增量算子归约主值
pub struct Reduce<T, O: IncrementalOperator> {
    state: O::State,
    last: Option<T>,
    _operator: PhantomData<O>,
}

impl<T, O: IncrementalOperator> Reduce<T, O> {
    pub fn new() -> Self {
        Self {
            state: O::State::default(),
            last: None,
            _operator: PhantomData,
        }
    }
}

impl<T, O: IncrementalOperator> Default for Reduce<T, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SeriesValue, O: IncrementalOperator> StreamKernel<T> for Reduce<T, O> {
    fn update(&mut self, sample: T, _out: &mut VecDeque<T>) {
        O::update(&mut self.state, sample.value());
        self.last = Some(sample);
    }

    fn finish(&mut self, out: &mut VecDeque<T>) {
        if let (Some(last), Some(value)) = (self.last.take(), O::value(&self.state)) {
            out.push_back(last.with_value(value));
        }
    }
}

pub fn reduce<T: SeriesValue, O: IncrementalOperator>() -> Computation<T> {
    Computation::deferred(Reduce::<T, O>::new())
}

// ═══════════════════════════════════════════════════════════════════════════
// 极值
// ═══════════════════════════════════════════════════════════════════════════

/// 保留主值最优的样本，NaN 不参与比较
struct Extreme<T> {
    best: Option<T>,
    prefer: fn(f64, f64) -> bool,
}

impl<T: SeriesValue> StreamKernel<T> for Extreme<T> {
    fn update(&mut self, sample: T, _out: &mut VecDeque<T>) {
        let value = sample.value();
        if value.is_nan() {
            return;
        }
        let replace = match &self.best {
            Some(best) => (self.prefer)(value, best.value()),
            None => true,
        };
        if replace {
            self.best = Some(sample);
        }
    }

    fn finish(&mut self, out: &mut VecDeque<T>) {
        out.extend(self.best.take());
    }
}

fn extreme<T: SeriesValue>(prefer: fn(f64, f64) -> bool) -> Computation<T> {
    Computation::deferred(Extreme { best: None, prefer })
}

// ═══════════════════════════════════════════════════════════════════════════
// 时间积分
// ═══════════════════════════════════════════════════════════════════════════

/// 左矩形积分：每个值乘以到下一个样本的时间间隔
struct TimeIntegration<T> {
    units: TimeUnit,
    previous: Option<T>,
    area: f64,
}

impl<T: SeriesValue> StreamKernel<T> for TimeIntegration<T> {
    fn update(&mut self, sample: T, _out: &mut VecDeque<T>) {
        if let Some(previous) = &self.previous {
            let elapsed = self.units.from_milliseconds(sample.time() - previous.time());
            self.area += previous.value() * elapsed;
        }
        self.previous = Some(sample);
    }

    fn finish(&mut self, out: &mut VecDeque<T>) {
        if let Some(last) = self.previous.take() {
            out.push_back(last.with_value(self.area));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 注册
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    catalog.register(
        FunctionDescriptor::new(
            "Average",
            "Returns a single value that represents the mean of the values in the source series.",
        )
        .aliases(&["Avg", "Mean"])
        .returns(ReturnType::Scalar),
        |_| Ok(reduce::<T, Mean>()),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Minimum",
            "Returns a single value that is the minimum of the values in the source series.",
        )
        .aliases(&["Min"])
        .returns(ReturnType::Scalar),
        |_| Ok(extreme(|candidate, best| candidate < best)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Maximum",
            "Returns a single value that is the maximum of the values in the source series.",
        )
        .aliases(&["Max"])
        .returns(ReturnType::Scalar),
        |_| Ok(extreme(|candidate, best| candidate > best)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Total",
            "Returns a single value that represents the sum of the values in the source series.",
        )
        .aliases(&["Sum"])
        .returns(ReturnType::Scalar),
        |_| Ok(reduce::<T, Sum>()),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Range",
            "Returns a single value that represents the range, i.e., maximum - minimum, of the values in the source series.",
        )
        .returns(ReturnType::Scalar),
        |_| Ok(reduce::<T, Range>()),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Count",
            "Returns a single value that is the count of the values in the source series.",
        )
        .returns(ReturnType::Scalar),
        |_| Ok(reduce::<T, Count>()),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "StandardDeviation",
            "Returns a single value that represents the standard deviation of the values in the source series.",
        )
        .aliases(&["StdDev"])
        .returns(ReturnType::Scalar)
        .parameter(ParameterDefinition::optional(
            "useSampleCalc",
            ParameterType::Boolean,
            Some(ParameterValue::Boolean(false)),
            "Use the sample (n - 1) rather than the population calculation.",
        )),
        |p| {
            if p.boolean(0)? {
                Ok(reduce::<T, SampleStdDev>())
            } else {
                Ok(reduce::<T, PopulationStdDev>())
            }
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "TimeIntegration",
            "Returns a single value that represents the time-based integration, i.e., the area under the curve, of the values in the source series.",
        )
        .aliases(&["TimeInt"])
        .returns(ReturnType::Scalar)
        .parameter(super::time_units(
            TimeUnit::Hours,
            "Time unit of the integration interval.",
        )),
        |p| {
            let units = p.time_unit(0)?;
            Ok(Computation::deferred(TimeIntegration {
                units,
                previous: None,
                area: 0.0,
            }))
        },
    )?;

    Ok(())
}
