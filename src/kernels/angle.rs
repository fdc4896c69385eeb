//! 相角内核 - 展开/折叠、参考相角、标签
//!
//! @yutiansut @quantaxis
//!
//! 相角分量通过 `SeriesValue::angle` 访问：相量为相角，标量即主值。

use std::collections::VecDeque;

use crate::function::computation::{passthrough, Computation, StreamKernel};
use crate::function::group_operation::{GroupOperation, GroupOperationPolicy, GroupOperations};
use crate::function::parameter::{ParameterDefinition, ParameterType, ParameterValue};
use crate::function::registry::FunctionCatalog;
use crate::function::FunctionDescriptor;
use crate::model::metadata::{normalize, MetadataCollection, MetadataMap};
use crate::model::sample::SeriesValue;
use crate::model::units::{wrap_angle, AngleUnit, AngleUnwrapper};
use crate::Result;

/// 坐标中点写入后的哨兵注解
pub const MIDPOINT_SENTINEL: &str = "MidPointApplied";

struct Unwrap {
    unwrapper: AngleUnwrapper,
}

impl<T: SeriesValue> StreamKernel<T> for Unwrap {
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        sample.set_angle(self.unwrapper.unwrap(sample.angle()));
        out.push_back(sample);
    }
}

struct Wrap {
    unit: AngleUnit,
}

impl<T: SeriesValue> StreamKernel<T> for Wrap {
    fn update(&mut self, mut sample: T, out: &mut VecDeque<T>) {
        sample.set_angle(wrap_angle(sample.angle(), self.unit));
        out.push_back(sample);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Reference
// ═══════════════════════════════════════════════════════════════════════════

/// 切片内首个样本为参考，其余样本输出相对参考的相角
struct Reference<T> {
    reference: Option<T>,
    adjust_midpoint: bool,
    metadata: MetadataCollection,
}

impl<T: SeriesValue> Reference<T> {
    /// 把序列与参考坐标的中点写回序列注解，每个目标只写一次
    fn adjust_coordinates(&self, sample: &T, reference: &T) {
        let Some(map) = self.metadata.get(sample.target()) else {
            return;
        };
        let reference_map = self.metadata.get_or_empty(reference.target());
        if map.ptr_eq(&reference_map) {
            return;
        }
        let Some((longitude, latitude)) = coordinates(&reference_map) else {
            return;
        };

        let applied = map.latch(MIDPOINT_SENTINEL, |annotations| {
            let coordinate = |key: &str| {
                annotations
                    .get(&normalize(key))
                    .and_then(|v| v.trim().parse::<f64>().ok())
            };
            if let (Some(own_longitude), Some(own_latitude)) =
                (coordinate("Longitude"), coordinate("Latitude"))
            {
                annotations.insert(
                    normalize("Longitude"),
                    ((own_longitude + longitude) / 2.0).to_string(),
                );
                annotations.insert(
                    normalize("Latitude"),
                    ((own_latitude + latitude) / 2.0).to_string(),
                );
            }
        });
        if applied {
            log::debug!(
                "coordinate midpoint of \"{}\" relative to \"{}\" applied",
                sample.target(),
                reference.target()
            );
        }
    }
}

impl<T: SeriesValue> StreamKernel<T> for Reference<T> {
    fn update(&mut self, sample: T, out: &mut VecDeque<T>) {
        if let Some(reference) = &self.reference {
            if self.adjust_midpoint {
                self.adjust_coordinates(&sample, reference);
            }
            out.push_back(sample.relative_to(reference));
            return;
        }

        let mut zeroed = sample.clone();
        zeroed.set_angle(0.0);
        self.reference = Some(sample);
        out.push_back(zeroed);
    }
}

fn angle_units() -> ParameterDefinition {
    ParameterDefinition::optional(
        "units",
        ParameterType::AngleUnit,
        Some(ParameterValue::AngleUnit(AngleUnit::Degrees)),
        "Unit of the angle values.",
    )
}

/// 注解表中的 (经度, 纬度)
pub fn coordinates(map: &MetadataMap) -> Option<(f64, f64)> {
    Some((map.get_f64("Longitude")?, map.get_f64("Latitude")?))
}

// ═══════════════════════════════════════════════════════════════════════════
// 注册
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) fn register<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    catalog.register(
        FunctionDescriptor::new(
            "UnwrapAngle",
            "Returns a series of angle values that are unwrapped, i.e., without discontinuities at the half-circle boundary.",
        )
        .aliases(&["Unwrap"])
        .parameter(angle_units()),
        |p| {
            Ok(Computation::deferred(Unwrap {
                unwrapper: AngleUnwrapper::new(p.angle_unit(0)?),
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "WrapAngle",
            "Returns a series of angle values that are wrapped to the half-circle range.",
        )
        .aliases(&["Wrap"])
        .parameter(angle_units())
        .slice_series_equivalent(),
        |p| {
            Ok(Computation::deferred(Wrap {
                unit: p.angle_unit(0)?,
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Reference",
            "Returns a slice of angle values relative to the first series of each slice, the reference.",
        )
        .aliases(&["Ref"])
        .group_operations(GroupOperations::SLICE)
        .policy(GroupOperationPolicy::Force(GroupOperation::Slice))
        .parameter(ParameterDefinition::optional(
            "adjustCoordinateMidPoint",
            ParameterType::Boolean,
            Some(ParameterValue::Boolean(false)),
            "Move each series' Longitude/Latitude annotation to the midpoint between it and the reference.",
        )),
        |p| {
            Ok(Computation::deferred(Reference {
                reference: None,
                adjust_midpoint: p.boolean(0)?,
                metadata: p.metadata().clone(),
            }))
        },
    )?;

    catalog.register(
        FunctionDescriptor::new(
            "Label",
            "Renames a series with the specified label value; placeholders such as {PointTag} are resolved from series metadata.",
        )
        .aliases(&["Name"])
        .policy(GroupOperationPolicy::IgnoreRequested)
        .parameter(ParameterDefinition::required(
            "label",
            ParameterType::Text,
            "Label template for the output series.",
        ))
        .label_parameter(0),
        |_| Ok(passthrough()),
    )?;

    Ok(())
}
