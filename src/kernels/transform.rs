//! 逐点变换内核
//!
//! @yutiansut @quantaxis
//!
//! 全部为 Deferred 且与 Slice 模式等价：逐样本变换，时间/目标/标志位不变。

use crate::function::computation::{map_components, map_value};
use crate::function::parameter::{ParameterDefinition, ParameterType, ParameterValue};
use crate::function::registry::FunctionCatalog;
use crate::function::FunctionDescriptor;
use crate::model::sample::SeriesValue;
use crate::Result;

fn operand(description: &str) -> ParameterDefinition {
    ParameterDefinition::required("N", ParameterType::Float, description)
}

/// 保留 `digits` 位小数
fn round_to(value: f64, digits: i32) -> f64 {
    if digits <= 0 {
        return value.round();
    }
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    catalog.register(
        FunctionDescriptor::new(
            "AbsoluteValue",
            "Returns a series of values that represent the absolute value each of the values in the source series.",
        )
        .aliases(&["Abs"])
        .slice_series_equivalent(),
        |_| Ok(map_components(f64::abs)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Add",
            "Returns a series of values that represent each of the values in the source series added with N.",
        )
        .parameter(operand(
            "A floating point value or the name of a series whose first value is added to each value.",
        ))
        .slice_series_equivalent(),
        |p| {
            let n = p.float(0)?;
            Ok(map_value(move |v| v + n))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Subtract",
            "Returns a series of values that represent each of the values in the source series subtracted by N.",
        )
        .parameter(operand("A floating point value or series name to subtract from each value."))
        .slice_series_equivalent(),
        |p| {
            let n = p.float(0)?;
            Ok(map_value(move |v| v - n))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Multiply",
            "Returns a series of values that represent each of the values in the source series multiplied by N.",
        )
        .parameter(operand("A floating point value or series name to multiply each value by."))
        .slice_series_equivalent(),
        |p| {
            let n = p.float(0)?;
            Ok(map_value(move |v| v * n))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Divide",
            "Returns a series of values that represent each of the values in the source series divided by N.",
        )
        .parameter(operand("A floating point value or series name to divide each value by."))
        .slice_series_equivalent(),
        |p| {
            let n = p.float(0)?;
            Ok(map_value(move |v| v / n))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Round",
            "Returns a series of values that represent the rounded value, with N fractional digits, of each of the values in the source series.",
        )
        .parameter(ParameterDefinition::optional(
            "N",
            ParameterType::Integer,
            Some(ParameterValue::Integer(0)),
            "Number of fractional digits to keep.",
        ))
        .slice_series_equivalent(),
        |p| {
            let digits = p.integer(0)?.clamp(0, 15) as i32;
            Ok(map_components(move |v| round_to(v, digits)))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Floor",
            "Returns a series of values that represent the smallest integral value that is less than or equal to each of the values in the source series.",
        )
        .slice_series_equivalent(),
        |_| Ok(map_components(f64::floor)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Ceiling",
            "Returns a series of values that represent the smallest integral value that is greater than or equal to each of the values in the source series.",
        )
        .aliases(&["Ceil"])
        .slice_series_equivalent(),
        |_| Ok(map_components(f64::ceil)),
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Truncate",
            "Returns a series of values that represent the integral part of each of the values in the source series.",
        )
        .aliases(&["Trunc"])
        .slice_series_equivalent(),
        |_| Ok(map_components(f64::trunc)),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::testing::{invoke, series, values};

    #[test]
    fn test_arithmetic() {
        let data = [1.0, -2.0, 4.5];
        assert_eq!(values("Add(1.5, A)", series("A", &data)), vec![2.5, -0.5, 6.0]);
        assert_eq!(values("Subtract(1, A)", series("A", &data)), vec![0.0, -3.0, 3.5]);
        assert_eq!(values("Multiply(2, A)", series("A", &data)), vec![2.0, -4.0, 9.0]);
        assert_eq!(values("Divide(2, A)", series("A", &data)), vec![0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_add_by_target_reference() {
        let outputs = invoke(
            "Add(B, A)",
            vec![series("A", &[1.0, 2.0]), series("B", &[10.0, 20.0])],
        );
        // B 的首个值作为操作数，作用于每条输入
        assert_eq!(outputs.len(), 2);
        let a: Vec<f64> = outputs[0].1.iter().map(|s| s.value).collect();
        assert_eq!(a, vec![11.0, 12.0]);
    }

    #[test]
    fn test_rounding_family() {
        let data = [1.2345, -1.5, 2.5];
        assert_eq!(values("Round(A)", series("A", &data)), vec![1.0, -2.0, 3.0]);
        assert_eq!(values("Round(2, A)", series("A", &data)), vec![1.23, -1.5, 2.5]);
        assert_eq!(values("Floor(A)", series("A", &data)), vec![1.0, -2.0, 2.0]);
        assert_eq!(values("Ceil(A)", series("A", &data)), vec![2.0, -1.0, 3.0]);
        assert_eq!(values("Trunc(A)", series("A", &data)), vec![1.0, -1.0, 2.0]);
        assert_eq!(values("Abs(A)", series("A", &data)), vec![1.2345, 1.5, 2.5]);
    }

    #[test]
    fn test_pointwise_preserves_identity() {
        let outputs = invoke("Add(2, A)", vec![series("A", &[1.0, 2.0, 3.0])]);
        let (name, samples) = &outputs[0];
        assert_eq!(name, "Add(2, A)");
        for (i, sample) in samples.iter().enumerate() {
            assert_eq!(&*sample.target, "A");
            assert_eq!(sample.time, i as f64 * 1_000.0);
        }
    }
}
