//! 选取与排序统计内核
//!
//! @yutiansut @quantaxis
//!
//! 除 Distinct 外均为 Immediate：需要完整物化输入后排序或随机抽样。

use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};

use crate::function::computation::{filter, Computation};
use crate::function::group_operation::GroupOperations;
use crate::function::parameter::{CountSpec, ParameterDefinition, ParameterType, ParameterValue};
use crate::function::registry::FunctionCatalog;
use crate::function::{FunctionDescriptor, ReturnType};
use crate::model::sample::SeriesValue;
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// 统计
// ═══════════════════════════════════════════════════════════════════════════

/// 升序排列的主值 (NaN 排除)
fn sorted_values<T: SeriesValue>(samples: &[T]) -> Vec<f64> {
    let mut values: Vec<f64> = samples
        .iter()
        .map(SeriesValue::value)
        .filter(|v| !v.is_nan())
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

/// 奇数取中间值，偶数取两中间值的中点
pub fn median(sorted: &[f64]) -> Option<f64> {
    let len = sorted.len();
    match len {
        0 => None,
        _ if len % 2 == 1 => Some(sorted[len / 2]),
        _ => Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0),
    }
}

/// 线性插值分位数，`percent` 取 0..=100
pub fn percentile(sorted: &[f64], percent: f64) -> Option<f64> {
    let (first, last) = (*sorted.first()?, *sorted.last()?);
    if percent <= 0.0 {
        return Some(first);
    }
    if percent >= 100.0 {
        return Some(last);
    }

    let n = (sorted.len() - 1) as f64 * percent / 100.0 + 1.0;
    let k = n.floor() as usize;
    let lower = sorted[k - 1];
    let upper = sorted.get(k).copied().unwrap_or(lower);
    Some(lower + (n - k as f64) * (upper - lower))
}

/// 出现次数最多的值，次数相同取先出现者
pub fn mode(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new();
    for (order, value) in values.into_iter().filter(|v| !v.is_nan()).enumerate() {
        let entry = counts.entry(normalized_bits(value)).or_insert((0, order));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, order_a)), (_, (count_b, order_b))| {
            count_a.cmp(count_b).then(order_b.cmp(order_a))
        })
        .map(|(bits, _)| f64::from_bits(bits))
}

/// 0.0 与 -0.0 视为同一值
fn normalized_bits(value: f64) -> u64 {
    if value == 0.0 {
        0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// 以最后一个样本为模板输出单个值
fn scalar<T: SeriesValue>(samples: &[T], value: Option<f64>) -> Vec<T> {
    match (samples.last(), value) {
        (Some(last), Some(value)) => vec![last.with_value(value)],
        _ => Vec::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 选取
// ═══════════════════════════════════════════════════════════════════════════

/// 选出的样本按源时间跨度均匀重排时间戳
///
/// `t_i = t_first + i * step`，`step = (t_last - t_first) / max(n - 1, 1)`
fn normalize_times<T: SeriesValue>(selected: &mut [T], span: (f64, f64)) {
    let (start, end) = span;
    let step = (end - start) / selected.len().saturating_sub(1).max(1) as f64;
    for (i, sample) in selected.iter_mut().enumerate() {
        sample.set_time(start + i as f64 * step);
    }
}

fn time_span<T: SeriesValue>(samples: &[T]) -> Option<(f64, f64)> {
    Some((samples.first()?.time(), samples.last()?.time()))
}

/// Top / Bottom：按主值排序后取前 N 个 (稳定排序)
fn ranked<T: SeriesValue>(count: CountSpec, normalize: bool, descending: bool) -> Computation<T> {
    Computation::immediate(move |mut samples: Vec<T>| {
        let Some(span) = time_span(&samples) else {
            return samples;
        };
        let n = count.resolve(samples.len()).min(samples.len());
        samples.sort_by(|a, b| {
            let ordering = a.value().total_cmp(&b.value());
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        samples.truncate(n);
        if normalize {
            normalize_times(&mut samples, span);
        }
        samples
    })
}

fn random<T: SeriesValue>(count: CountSpec, normalize: bool) -> Computation<T> {
    Computation::immediate(move |samples: Vec<T>| {
        let Some(span) = time_span(&samples) else {
            return samples;
        };
        let n = count.resolve(samples.len()).min(samples.len());
        let mut indexes: Vec<usize> = (0..samples.len()).collect();
        indexes.shuffle(&mut rand::thread_rng());
        indexes.truncate(n);
        if !normalize {
            indexes.sort_unstable();
        }

        let mut selected: Vec<T> = indexes.into_iter().map(|i| samples[i].clone()).collect();
        if normalize {
            normalize_times(&mut selected, span);
        }
        selected
    })
}

fn edge<T: SeriesValue>(count: CountSpec, from_end: bool) -> Computation<T> {
    Computation::immediate(move |mut samples: Vec<T>| {
        let n = count.resolve(samples.len()).min(samples.len());
        if from_end {
            samples.split_off(samples.len() - n)
        } else {
            samples.truncate(n);
            samples
        }
    })
}

fn count_parameter(description: &str) -> ParameterDefinition {
    ParameterDefinition::required("N", ParameterType::Count, description)
}

fn optional_count(description: &str) -> ParameterDefinition {
    ParameterDefinition::optional(
        "N",
        ParameterType::Count,
        Some(ParameterValue::Count(CountSpec::Absolute(1))),
        description,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// 注册
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    catalog.register(
        FunctionDescriptor::new(
            "Median",
            "Returns a single value that represents the median of the values in the source series.",
        )
        .aliases(&["Med", "Mid"])
        .returns(ReturnType::Scalar)
        .immediate(),
        |_| {
            Ok(Computation::immediate(|samples: Vec<T>| {
                let value = median(&sorted_values(&samples));
                scalar(&samples, value)
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Mode",
            "Returns a single value that represents the mode of the values in the source series.",
        )
        .returns(ReturnType::Scalar)
        .immediate(),
        |_| {
            Ok(Computation::immediate(|samples: Vec<T>| {
                let value = mode(samples.iter().map(SeriesValue::value));
                scalar(&samples, value)
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Percentile",
            "Returns a single value that represents the Nth order percentile for the sorted values in the source series.",
        )
        .aliases(&["Pctl"])
        .returns(ReturnType::Scalar)
        .immediate()
        .parameter(ParameterDefinition::required(
            "N",
            ParameterType::Percentage,
            "A percentage between 0 and 100, suffix % is optional.",
        )),
        |p| {
            let percent = p.float(0)?;
            Ok(Computation::immediate(move |samples: Vec<T>| {
                let value = percentile(&sorted_values(&samples), percent);
                scalar(&samples, value)
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Top",
            "Returns a series of N, or N% of total, values that are the largest in the source series.",
        )
        .aliases(&["Largest"])
        .immediate()
        .parameter(count_parameter("Number of values, or N%, to return."))
        .parameter(super::normalize_time()),
        |p| Ok(ranked(p.count(0)?, p.boolean(1)?, true)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Bottom",
            "Returns a series of N, or N% of total, values that are the smallest in the source series.",
        )
        .aliases(&["Bot", "Smallest"])
        .immediate()
        .parameter(count_parameter("Number of values, or N%, to return."))
        .parameter(super::normalize_time()),
        |p| Ok(ranked(p.count(0)?, p.boolean(1)?, false)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Random",
            "Returns a series of N, or N% of total, values that are a random sample of the values in the source series.",
        )
        .aliases(&["Rand", "Sample"])
        .immediate()
        .parameter(count_parameter("Number of values, or N%, to return."))
        .parameter(super::normalize_time()),
        |p| Ok(random(p.count(0)?, p.boolean(1)?)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "First",
            "Returns a series of N, or N% of total, values from the start of the source series.",
        )
        .immediate()
        .parameter(optional_count("Number of values, or N%, to return.")),
        |p| Ok(edge(p.count(0)?, false)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Last",
            "Returns a series of N, or N% of total, values from the end of the source series.",
        )
        .immediate()
        .parameter(optional_count("Number of values, or N%, to return.")),
        |p| Ok(edge(p.count(0)?, true)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Distinct",
            "Returns a series of values that represent the unique set of values in the source series.",
        )
        .aliases(&["Unique"])
        .group_operations(GroupOperations::STANDARD.union(GroupOperations::SET)),
        |_| {
            let mut seen = HashSet::new();
            Ok(filter(move |sample: &T| seen.insert(normalized_bits(sample.value()))))
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::testing::{invoke, series, values};

    #[test]
    fn test_median_parity() {
        assert_eq!(median(&[1.0, 3.0, 9.0]), Some(3.0));
        assert_eq!(median(&[1.0, 3.0, 5.0, 9.0]), Some(4.0));
        assert_eq!(median(&[]), None);
        assert_eq!(values("Median(A)", series("A", &[9.0, 1.0, 3.0])), vec![3.0]);
    }

    #[test]
    fn test_percentile_bounds_and_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 100.0), Some(5.0));
        assert_eq!(percentile(&sorted, 50.0), Some(3.0));
        assert_eq!(percentile(&sorted, 25.0), Some(2.0));
        assert!((percentile(&sorted, 90.0).unwrap() - 4.6).abs() < 1e-12);
        assert_eq!(values("Percentile(100%, A)", series("A", &[4.0, 8.0, 2.0])), vec![8.0]);
    }

    #[test]
    fn test_mode_prefers_first_seen_on_tie() {
        assert_eq!(mode([3.0, 1.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(mode([5.0, 2.0, 2.0]), Some(2.0));
        assert_eq!(mode(std::iter::empty()), None);
    }

    #[test]
    fn test_top_bottom_cardinality_and_order() {
        let data = [5.0, 1.0, 9.0, 3.0, 7.0];
        assert_eq!(values("Top(3, false, A)", series("A", &data)), vec![9.0, 7.0, 5.0]);
        assert_eq!(values("Bottom(2, A)", series("A", &data)), vec![1.0, 3.0]);
        assert_eq!(values("Top(10, A)", series("A", &data)).len(), 5);
        assert_eq!(values("Top(40%, A)", series("A", &data)), vec![9.0, 7.0]);
        // 2.5 个向下取整
        assert_eq!(values("Top(50%, A)", series("A", &data)), vec![9.0, 7.0]);
        assert_eq!(values("Bottom(90%, A)", series("A", &[4.0, 2.0, 6.0])), vec![2.0, 4.0]);
    }

    #[test]
    fn test_normalized_times_span_source() {
        let outputs = invoke("Top(3, A)", vec![series("A", &[5.0, 1.0, 9.0, 3.0, 7.0])]);
        let times: Vec<f64> = outputs[0].1.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 2_000.0, 4_000.0]);
    }

    #[test]
    fn test_random_sample() {
        let data: Vec<f64> = (0..20).map(f64::from).collect();
        let picked = values("Random(5, false, A)", series("A", &data));
        assert_eq!(picked.len(), 5);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_first_last() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(values("First(A)", series("A", &data)), vec![1.0]);
        assert_eq!(values("Last(2, A)", series("A", &data)), vec![3.0, 4.0]);
        assert_eq!(values("First(50%, A)", series("A", &data)), vec![1.0, 2.0]);
    }

    #[test]
    fn test_distinct() {
        assert_eq!(
            values("Distinct(A)", series("A", &[1.0, 2.0, 1.0, 0.0, -0.0, 2.0])),
            vec![1.0, 2.0, 0.0]
        );
        let outputs = invoke("SetUnique(A;B)", vec![series("A", &[1.0, 2.0]), series("B", &[2.0, 3.0])]);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].1.len(), 3);
    }
}
