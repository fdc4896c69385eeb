//! 样本模型
//!
//! @yutiansut @quantaxis
//!
//! 两种样本形态通过 `SeriesValue` 能力 trait 统一：
//! - 标量 `MeasurementValue`: 主值为 `value`
//! - 相量 `PhasorValue`: 主值为 `magnitude`，次分量为 `angle`
//!
//! 共享编排代码只依赖 trait 方法，形态相关逻辑收敛在 trait 实现内。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use super::units::{wrap_angle, AngleUnit};
use crate::function::registry::FunctionCatalog;

/// 样本形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueShape {
    Scalar,
    Phasor,
}

/// 质量标志位 (对引擎不透明，原样传递)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementFlags(pub u32);

impl MeasurementFlags {
    pub const NORMAL: MeasurementFlags = MeasurementFlags(0);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: MeasurementFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 能力 Trait
// ═══════════════════════════════════════════════════════════════════════════

/// 样本能力抽象
///
/// 内核只通过该 trait 访问样本。`value`/`set_value` 是主值，
/// `angle`/`set_angle` 是角度分量（标量形态下角度即主值）。
pub trait SeriesValue: Clone + Debug + Send + Sync + 'static {
    /// 形态标识
    const SHAPE: ValueShape;

    fn time(&self) -> f64;
    fn set_time(&mut self, time: f64);

    fn target(&self) -> &str;
    fn set_target(&mut self, target: Arc<str>);

    fn flags(&self) -> MeasurementFlags;
    fn set_flags(&mut self, flags: MeasurementFlags);

    /// 主值
    fn value(&self) -> f64;
    fn set_value(&mut self, value: f64);

    /// 角度分量
    fn angle(&self) -> f64;
    fn set_angle(&mut self, angle: f64);

    /// 对全部数值分量逐一变换
    fn map_components<F: Fn(f64) -> f64>(&mut self, f: F);

    /// 本形态的全局函数目录
    fn catalog() -> Arc<FunctionCatalog<Self>>;

    /// 复制并替换主值
    fn with_value(&self, value: f64) -> Self {
        let mut sample = self.clone();
        sample.set_value(value);
        sample
    }

    /// 相对参考样本的角度差，折叠到 [-180°, 180°)
    fn relative_to(&self, reference: &Self) -> Self {
        let mut sample = self.clone();
        sample.set_angle(wrap_angle(
            self.angle() - reference.angle(),
            AngleUnit::Degrees,
        ));
        sample
    }

    /// 时间戳转换为 UTC 时间
    fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time() as i64)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 标量样本
// ═══════════════════════════════════════════════════════════════════════════

/// 标量样本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementValue {
    pub target: Arc<str>,
    pub value: f64,
    /// epoch 毫秒
    pub time: f64,
    #[serde(default)]
    pub flags: MeasurementFlags,
}

impl MeasurementValue {
    pub fn new(target: impl Into<Arc<str>>, value: f64, time: f64) -> Self {
        Self {
            target: target.into(),
            value,
            time,
            flags: MeasurementFlags::NORMAL,
        }
    }

    pub fn with_flags(mut self, flags: MeasurementFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl SeriesValue for MeasurementValue {
    const SHAPE: ValueShape = ValueShape::Scalar;

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn set_target(&mut self, target: Arc<str>) {
        self.target = target;
    }

    fn flags(&self) -> MeasurementFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: MeasurementFlags) {
        self.flags = flags;
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    fn angle(&self) -> f64 {
        self.value
    }

    fn set_angle(&mut self, angle: f64) {
        self.value = angle;
    }

    fn map_components<F: Fn(f64) -> f64>(&mut self, f: F) {
        self.value = f(self.value);
    }

    fn catalog() -> Arc<FunctionCatalog<Self>> {
        crate::kernels::SCALAR_CATALOG.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 相量样本
// ═══════════════════════════════════════════════════════════════════════════

/// 相量样本 (幅值 + 相角，角度单位为度)
///
/// 幅值与相角可能来自不同的底层序列，分别记录其来源目标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorValue {
    pub target: Arc<str>,
    pub magnitude_target: Arc<str>,
    pub angle_target: Arc<str>,
    pub magnitude: f64,
    pub angle: f64,
    pub time: f64,
    #[serde(default)]
    pub flags: MeasurementFlags,
}

impl PhasorValue {
    pub fn new(target: impl Into<Arc<str>>, magnitude: f64, angle: f64, time: f64) -> Self {
        let target: Arc<str> = target.into();
        Self {
            magnitude_target: target.clone(),
            angle_target: target.clone(),
            target,
            magnitude,
            angle,
            time,
            flags: MeasurementFlags::NORMAL,
        }
    }

    /// 指定幅值/相角各自的来源目标
    pub fn with_component_targets(
        mut self,
        magnitude_target: impl Into<Arc<str>>,
        angle_target: impl Into<Arc<str>>,
    ) -> Self {
        self.magnitude_target = magnitude_target.into();
        self.angle_target = angle_target.into();
        self
    }
}

impl SeriesValue for PhasorValue {
    const SHAPE: ValueShape = ValueShape::Phasor;

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn set_target(&mut self, target: Arc<str>) {
        self.target = target;
    }

    fn flags(&self) -> MeasurementFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: MeasurementFlags) {
        self.flags = flags;
    }

    fn value(&self) -> f64 {
        self.magnitude
    }

    fn set_value(&mut self, value: f64) {
        self.magnitude = value;
    }

    fn angle(&self) -> f64 {
        self.angle
    }

    fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
    }

    fn map_components<F: Fn(f64) -> f64>(&mut self, f: F) {
        self.magnitude = f(self.magnitude);
        self.angle = f(self.angle);
    }

    fn catalog() -> Arc<FunctionCatalog<Self>> {
        crate::kernels::PHASOR_CATALOG.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_primary_value() {
        let mut sample = MeasurementValue::new("PPA:1", -2.5, 1_000.0);
        assert_eq!(sample.value(), -2.5);
        assert_eq!(sample.angle(), -2.5);

        sample.map_components(f64::abs);
        assert_eq!(sample.value, 2.5);
        assert_eq!(sample.target(), "PPA:1");
    }

    #[test]
    fn test_phasor_components() {
        let mut phasor = PhasorValue::new("BUS1", -120.0, -30.0, 0.0)
            .with_component_targets("PPA:1", "PPA:2");
        assert_eq!(phasor.value(), -120.0);
        assert_eq!(phasor.angle(), -30.0);

        phasor.map_components(f64::abs);
        assert_eq!(phasor.magnitude, 120.0);
        assert_eq!(phasor.angle, 30.0);
        assert_eq!(&*phasor.angle_target, "PPA:2");
    }

    #[test]
    fn test_relative_to_wraps() {
        let reference = PhasorValue::new("REF", 1.0, 170.0, 0.0);
        let sample = PhasorValue::new("A", 5.0, -170.0, 0.0);
        let relative = sample.relative_to(&reference);
        assert!((relative.angle - 20.0).abs() < 1e-12);
        assert_eq!(relative.magnitude, 5.0);

        let scalar = MeasurementValue::new("A", 10.0, 0.0);
        let scalar_ref = MeasurementValue::new("B", 30.0, 0.0);
        assert!((scalar.relative_to(&scalar_ref).value + 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_datetime() {
        let sample = MeasurementValue::new("A", 1.0, 1_700_000_000_000.0);
        let dt = sample.datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
