//! 内置函数内核
//!
//! @yutiansut @quantaxis
//!
//! 内核只依赖 `SeriesValue` 能力 trait 编写，一份实现同时注册到
//! 标量目录与相量目录：
//! - aggregate: 单值聚合 (均值/最值/求和/标准差/时间积分)
//! - transform: 逐点变换 (四则运算/取整/绝对值)
//! - select: 选取与排序统计 (中位数/众数/分位数/Top/Bottom/First/Last)
//! - temporal: 时间相关 (差分/导数/间隔抽样/移动平均/卡尔曼)
//! - filter: 范围与异常值过滤
//! - angle: 相角展开/折叠、参考相角、标签
//! - evaluate: 切片表达式求值

pub mod aggregate;
pub mod angle;
pub mod evaluate;
pub mod filter;
pub mod select;
pub mod temporal;
pub mod transform;

use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::function::parameter::{ParameterDefinition, ParameterType, ParameterValue};
use crate::function::registry::FunctionCatalog;
use crate::model::sample::{MeasurementValue, PhasorValue, SeriesValue};
use crate::model::units::TimeUnit;
use crate::Result;

/// 注册全部内置函数
pub fn register_builtins<T: SeriesValue>(catalog: &mut FunctionCatalog<T>) -> Result<()> {
    aggregate::register(catalog)?;
    transform::register(catalog)?;
    select::register(catalog)?;
    temporal::register(catalog)?;
    filter::register(catalog)?;
    angle::register(catalog)?;
    evaluate::register(catalog)?;
    Ok(())
}

/// 构建内置函数目录，任何一个函数注册失败 (如别名冲突) 都整体失败
pub fn build_catalog<T: SeriesValue>() -> Result<FunctionCatalog<T>> {
    let mut catalog = FunctionCatalog::new();
    register_builtins(&mut catalog)?;
    log::info!(
        "{:?} function catalog built with {} functions",
        T::SHAPE,
        catalog.len()
    );
    Ok(catalog)
}

/// 标量样本全局目录
pub static SCALAR_CATALOG: Lazy<Arc<FunctionCatalog<MeasurementValue>>> = Lazy::new(|| {
    Arc::new(build_catalog().expect("Failed to build scalar function catalog"))
});

/// 相量样本全局目录
pub static PHASOR_CATALOG: Lazy<Arc<FunctionCatalog<PhasorValue>>> = Lazy::new(|| {
    Arc::new(build_catalog().expect("Failed to build phasor function catalog"))
});

// ═══════════════════════════════════════════════════════════════════════════
// 共用参数定义
// ═══════════════════════════════════════════════════════════════════════════

fn time_units(default: TimeUnit, description: &str) -> ParameterDefinition {
    ParameterDefinition::optional(
        "units",
        ParameterType::TimeUnit,
        Some(ParameterValue::TimeUnit(default)),
        description,
    )
}

fn normalize_time() -> ParameterDefinition {
    ParameterDefinition::optional(
        "normalizeTime",
        ParameterType::Boolean,
        Some(ParameterValue::Boolean(true)),
        "Evenly redistribute timestamps of the selected values across the source time span.",
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogs_share_builtins() {
        assert!(SCALAR_CATALOG.len() > 30);
        assert_eq!(SCALAR_CATALOG.len(), PHASOR_CATALOG.len());
        assert!(SCALAR_CATALOG.get("avg").is_some());
        assert!(PHASOR_CATALOG.get("Unwrap").is_some());
    }

    #[test]
    fn test_registration_conflict_fails_build() {
        let mut catalog: FunctionCatalog<MeasurementValue> = build_catalog().unwrap();
        let err = aggregate::register(&mut catalog).unwrap_err();
        assert!(matches!(err, crate::SeriesError::RegistrationError(_)), "{}", err);
        // 冲突前已注册的函数保持不变
        assert_eq!(catalog.len(), SCALAR_CATALOG.len());
    }

    #[test]
    fn test_catalog_introspection() {
        let json = SCALAR_CATALOG.to_json().unwrap();
        assert!(json.contains("\"SliceAverage\""));
        assert!(json.contains("\"Reference\""));
        assert!(!json.contains("\"SliceReference\""));
        assert!(json.contains("\"SetDistinct\""));
        assert!(!json.contains("\"SliceDistinct\""));
    }
}
