//! 过滤内核 - 范围、非数值、异常值
//!
//! @yutiansut @quantaxis

use crate::function::computation::{filter, Computation};
use crate::function::parameter::{ParameterDefinition, ParameterType, ParameterValue, Parameters};
use crate::function::registry::FunctionCatalog;
use crate::function::FunctionDescriptor;
use crate::model::sample::SeriesValue;
use crate::operators::WelfordState;
use crate::Result;

/// 取值范围
#[derive(Debug, Clone, Copy)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
    pub low_inclusive: bool,
    pub high_inclusive: bool,
}

impl ValueRange {
    pub fn contains(&self, value: f64) -> bool {
        let above = if self.low_inclusive {
            value >= self.low
        } else {
            value > self.low
        };
        let below = if self.high_inclusive {
            value <= self.high
        } else {
            value < self.high
        };
        above && below
    }
}

fn range_parameters(descriptor: FunctionDescriptor) -> FunctionDescriptor {
    descriptor
        .parameter(ParameterDefinition::required(
            "low",
            ParameterType::Float,
            "Low end of the range, or the name of a series whose first value is used.",
        ))
        .parameter(ParameterDefinition::required(
            "high",
            ParameterType::Float,
            "High end of the range, or the name of a series whose first value is used.",
        ))
        .parameter(ParameterDefinition::optional(
            "lowInclusive",
            ParameterType::Boolean,
            Some(ParameterValue::Boolean(false)),
            "Whether the low end of the range is inclusive.",
        ))
        .parameter(ParameterDefinition::optional(
            "highInclusive",
            ParameterType::Boolean,
            None,
            "Whether the high end of the range is inclusive; defaults to lowInclusive.",
        ))
}

/// 异常值过滤参数
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    pub threshold: f64,
    pub min_samples: usize,
    pub invert: bool,
}

impl OutlierFilter {
    /// 样本不足时原样返回 (反转时返回空)；方差为零时不存在异常值
    pub fn apply<T: SeriesValue>(&self, samples: Vec<T>) -> Vec<T> {
        if samples.len() < self.min_samples {
            return if self.invert { Vec::new() } else { samples };
        }

        let stats = WelfordState::from_values(samples.iter().map(SeriesValue::value));
        let threshold = self.threshold.abs();
        samples
            .into_iter()
            .filter(|sample| {
                let outlier = stats.z_score(sample.value()).abs() > threshold;
                outlier == self.invert
            })
            .collect()
    }
}

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    let range = |p: &Parameters<T>| -> Result<ValueRange> {
        let low_inclusive = p.boolean(2)?;
        Ok(ValueRange {
            low: p.float(0)?,
            high: p.float(1)?,
            low_inclusive,
            high_inclusive: p.opt_boolean(3).unwrap_or(low_inclusive),
        })
    };

    catalog.register(
        range_parameters(
            FunctionDescriptor::new(
                "IncludeRange",
                "Returns a series of values that represent a filtered set of the values in the source series where each value falls between the specified low and high.",
            )
            .aliases(&["Include"]),
        ),
        move |p| {
            let range = range(p)?;
            Ok(filter(move |sample: &T| range.contains(sample.value())))
        },
    )?;

    catalog.register(
        range_parameters(
            FunctionDescriptor::new(
                "ExcludeRange",
                "Returns a series of values that represent a filtered set of the values in the source series where each value falls outside the specified low and high.",
            )
            .aliases(&["Exclude"]),
        ),
        move |p| {
            let range = range(p)?;
            Ok(filter(move |sample: &T| !range.contains(sample.value())))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "FilterNaN",
            "Returns a series of values that represent a filtered set of the values in the source series where each value is a real number, i.e., not NaN.",
        )
        .parameter(ParameterDefinition::optional(
            "alsoFilterInfinity",
            ParameterType::Boolean,
            Some(ParameterValue::Boolean(true)),
            "Also remove positive and negative infinity.",
        ))
        .slice_series_equivalent(),
        |p| {
            let infinity = p.boolean(0)?;
            let rejected = move |v: f64| v.is_nan() || (infinity && v.is_infinite());
            Ok(filter(move |sample: &T| {
                !rejected(sample.value()) && !rejected(sample.angle())
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "FilterOutliers",
            "Returns a series of values that represent a filtered set of the values in the source series where each value's z-score is within the specified threshold.",
        )
        .aliases(&["ZScoreFilter"])
        .immediate()
        .parameter(ParameterDefinition::optional(
            "zScoreThreshold",
            ParameterType::Float,
            Some(ParameterValue::Float(2.0)),
            "Absolute z-score above which a value is an outlier.",
        ))
        .parameter(ParameterDefinition::optional(
            "minSamples",
            ParameterType::Integer,
            Some(ParameterValue::Integer(10)),
            "Minimum number of values required before filtering is applied.",
        ))
        .parameter(ParameterDefinition::optional(
            "invertFilter",
            ParameterType::Boolean,
            Some(ParameterValue::Boolean(false)),
            "Return only the outliers.",
        )),
        |p| {
            let outliers = OutlierFilter {
                threshold: p.float(0)?,
                min_samples: p.integer(1)?.max(0) as usize,
                invert: p.boolean(2)?,
            };
            Ok(Computation::immediate(move |samples: Vec<T>| outliers.apply(samples)))
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::testing::{series, values};
    use crate::model::sample::MeasurementValue;

    #[test]
    fn test_include_exclude_inclusivity() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(values("IncludeRange(1, 3, A)", series("A", &data)), vec![2.0]);
        assert_eq!(
            values("Include(1, 3, true, A)", series("A", &data)),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(
            values("Include(1, 3, true, false, A)", series("A", &data)),
            vec![1.0, 2.0]
        );
        assert_eq!(
            values("ExcludeRange(1, 3, A)", series("A", &data)),
            vec![0.0, 1.0, 3.0, 4.0]
        );
        assert_eq!(values("Exclude(1, 3, true, A)", series("A", &data)), vec![0.0, 4.0]);
    }

    #[test]
    fn test_filter_nan() {
        let data = [1.0, f64::NAN, f64::INFINITY, -2.0];
        assert_eq!(values("FilterNaN(A)", series("A", &data)), vec![1.0, -2.0]);
        let kept = values("FilterNaN(false, A)", series("A", &data));
        assert_eq!(kept, vec![1.0, f64::INFINITY, -2.0]);
    }

    fn samples(values: &[f64]) -> Vec<MeasurementValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| MeasurementValue::new("A", v, i as f64))
            .collect()
    }

    #[test]
    fn test_outliers_removed() {
        let mut data = vec![10.0; 19];
        data.push(1_000.0);
        data[0] = 11.0;
        let filter = OutlierFilter { threshold: 2.0, min_samples: 10, invert: false };
        let kept = filter.apply(samples(&data));
        assert_eq!(kept.len(), 19);
        assert!(kept.iter().all(|s| s.value < 100.0));

        let inverted = OutlierFilter { invert: true, ..filter }.apply(samples(&data));
        assert_eq!(inverted.len(), 1);
        assert_eq!(inverted[0].value, 1_000.0);
    }

    #[test]
    fn test_outliers_insufficient_samples() {
        let data = [1.0, 100.0, 1.0];
        let filter = OutlierFilter { threshold: 2.0, min_samples: 10, invert: false };
        assert_eq!(filter.apply(samples(&data)).len(), 3);
        let inverted = OutlierFilter { invert: true, ..filter };
        assert!(inverted.apply(samples(&data)).is_empty());

        assert_eq!(values("ZScoreFilter(A)", series("A", &data)).len(), 3);
        assert!(values("FilterOutliers(2, 10, true, A)", series("A", &data)).is_empty());
    }

    #[test]
    fn test_zero_variance_has_no_outliers() {
        let filter = OutlierFilter { threshold: 0.5, min_samples: 2, invert: false };
        assert_eq!(filter.apply(samples(&[5.0; 12])).len(), 12);
        let inverted = OutlierFilter { invert: true, ..filter };
        assert!(inverted.apply(samples(&[5.0; 12])).is_empty());
    }
}
