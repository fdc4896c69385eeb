//! 时间与角度单位
//!
//! @yutiansut @quantaxis
//!
//! 样本时间戳统一为 epoch 毫秒 (f64)，时间差在内核中换算为目标单位。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════════
// 时间单位
// ═══════════════════════════════════════════════════════════════════════════

/// 时间单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    /// 1 ke = 1/100 天
    Ke,
    /// 1 tick = 100 纳秒
    Ticks,
    PlanckTime,
    AtomicUnitsOfTime,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 12] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Microseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
        TimeUnit::Weeks,
        TimeUnit::Ke,
        TimeUnit::Ticks,
        TimeUnit::PlanckTime,
        TimeUnit::AtomicUnitsOfTime,
    ];

    /// 每单位对应的秒数
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1e-9,
            TimeUnit::Microseconds => 1e-6,
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Days => 86_400.0,
            TimeUnit::Weeks => 604_800.0,
            TimeUnit::Ke => 864.0,
            TimeUnit::Ticks => 1e-7,
            TimeUnit::PlanckTime => 5.391_16e-44,
            TimeUnit::AtomicUnitsOfTime => 2.418_884_326_505e-17,
        }
    }

    /// 毫秒时间差换算为本单位
    pub fn from_milliseconds(self, elapsed_ms: f64) -> f64 {
        elapsed_ms / 1_000.0 / self.seconds_per_unit()
    }

    /// 本单位数值换算为毫秒
    pub fn to_milliseconds(self, value: f64) -> f64 {
        value * self.seconds_per_unit() * 1_000.0
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "Nanoseconds",
            TimeUnit::Microseconds => "Microseconds",
            TimeUnit::Milliseconds => "Milliseconds",
            TimeUnit::Seconds => "Seconds",
            TimeUnit::Minutes => "Minutes",
            TimeUnit::Hours => "Hours",
            TimeUnit::Days => "Days",
            TimeUnit::Weeks => "Weeks",
            TimeUnit::Ke => "Ke",
            TimeUnit::Ticks => "Ticks",
            TimeUnit::PlanckTime => "PlanckTime",
            TimeUnit::AtomicUnitsOfTime => "AtomicUnitsOfTime",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "nanoseconds" | "nanosecond" | "ns" => TimeUnit::Nanoseconds,
            "microseconds" | "microsecond" | "us" => TimeUnit::Microseconds,
            "milliseconds" | "millisecond" | "ms" => TimeUnit::Milliseconds,
            "seconds" | "second" | "s" => TimeUnit::Seconds,
            "minutes" | "minute" | "m" => TimeUnit::Minutes,
            "hours" | "hour" | "h" => TimeUnit::Hours,
            "days" | "day" | "d" => TimeUnit::Days,
            "weeks" | "week" | "w" => TimeUnit::Weeks,
            "ke" => TimeUnit::Ke,
            "ticks" | "tick" => TimeUnit::Ticks,
            "plancktime" => TimeUnit::PlanckTime,
            "atomicunitsoftime" => TimeUnit::AtomicUnitsOfTime,
            other => return Err(format!("\"{}\" is not a valid time unit", other)),
        };
        Ok(unit)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 角度单位
// ═══════════════════════════════════════════════════════════════════════════

/// 角度单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AngleUnit {
    Radians,
    Degrees,
    Grads,
    ArcMinutes,
    ArcSeconds,
    AngularMil,
}

impl AngleUnit {
    /// 每单位对应的度数
    pub fn degrees_per_unit(self) -> f64 {
        match self {
            AngleUnit::Radians => 180.0 / std::f64::consts::PI,
            AngleUnit::Degrees => 1.0,
            AngleUnit::Grads => 0.9,
            AngleUnit::ArcMinutes => 1.0 / 60.0,
            AngleUnit::ArcSeconds => 1.0 / 3_600.0,
            AngleUnit::AngularMil => 360.0 / 6_400.0,
        }
    }

    /// 一整圈在本单位下的数值
    pub fn full_circle(self) -> f64 {
        360.0 / self.degrees_per_unit()
    }

    pub fn to_degrees(self, value: f64) -> f64 {
        value * self.degrees_per_unit()
    }

    pub fn from_degrees(self, degrees: f64) -> f64 {
        degrees / self.degrees_per_unit()
    }

    pub fn name(self) -> &'static str {
        match self {
            AngleUnit::Radians => "Radians",
            AngleUnit::Degrees => "Degrees",
            AngleUnit::Grads => "Grads",
            AngleUnit::ArcMinutes => "ArcMinutes",
            AngleUnit::ArcSeconds => "ArcSeconds",
            AngleUnit::AngularMil => "AngularMil",
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AngleUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "radians" | "radian" | "rad" => AngleUnit::Radians,
            "degrees" | "degree" | "deg" => AngleUnit::Degrees,
            "grads" | "grad" | "gradians" | "gon" => AngleUnit::Grads,
            "arcminutes" | "arcminute" => AngleUnit::ArcMinutes,
            "arcseconds" | "arcsecond" => AngleUnit::ArcSeconds,
            "angularmil" | "mil" | "mils" => AngleUnit::AngularMil,
            other => return Err(format!("\"{}\" is not a valid angle unit", other)),
        };
        Ok(unit)
    }
}

/// 将角度折叠到 [-半圈, 半圈)
pub fn wrap_angle(angle: f64, unit: AngleUnit) -> f64 {
    let full = unit.full_circle();
    let half = full / 2.0;
    (angle + half).rem_euclid(full) - half
}

/// 角度展开器: 消除相邻样本间超过半圈的跳变
#[derive(Debug, Clone)]
pub struct AngleUnwrapper {
    full: f64,
    previous: Option<f64>,
    offset: f64,
}

impl AngleUnwrapper {
    pub fn new(unit: AngleUnit) -> Self {
        Self {
            full: unit.full_circle(),
            previous: None,
            offset: 0.0,
        }
    }

    pub fn unwrap(&mut self, angle: f64) -> f64 {
        if let Some(previous) = self.previous {
            let delta = angle - previous;
            let half = self.full / 2.0;
            if delta > half {
                self.offset -= self.full;
            } else if delta < -half {
                self.offset += self.full;
            }
        }
        self.previous = Some(angle);
        angle + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_conversion() {
        assert!((TimeUnit::Seconds.from_milliseconds(1_500.0) - 1.5).abs() < 1e-12);
        assert!((TimeUnit::Hours.from_milliseconds(7_200_000.0) - 2.0).abs() < 1e-12);
        assert!((TimeUnit::Ke.from_milliseconds(864_000.0) - 1.0).abs() < 1e-12);
        assert!((TimeUnit::Minutes.to_milliseconds(2.0) - 120_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_unit_parse() {
        assert_eq!("seconds".parse::<TimeUnit>().unwrap(), TimeUnit::Seconds);
        assert_eq!("HOURS".parse::<TimeUnit>().unwrap(), TimeUnit::Hours);
        assert_eq!(" Ticks ".parse::<TimeUnit>().unwrap(), TimeUnit::Ticks);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_angle_unit() {
        assert!((AngleUnit::Radians.to_degrees(std::f64::consts::PI) - 180.0).abs() < 1e-12);
        assert!((AngleUnit::Grads.full_circle() - 400.0).abs() < 1e-9);
        assert_eq!("deg".parse::<AngleUnit>().unwrap(), AngleUnit::Degrees);
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(190.0, AngleUnit::Degrees) + 170.0).abs() < 1e-12);
        assert!((wrap_angle(-190.0, AngleUnit::Degrees) - 170.0).abs() < 1e-12);
        assert!((wrap_angle(180.0, AngleUnit::Degrees) + 180.0).abs() < 1e-12);
        assert!((wrap_angle(45.0, AngleUnit::Degrees) - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_unwrapper() {
        let mut unwrapper = AngleUnwrapper::new(AngleUnit::Degrees);
        let unwrapped: Vec<f64> = [170.0, 179.0, -179.0, -170.0]
            .iter()
            .map(|a| unwrapper.unwrap(*a))
            .collect();
        assert_eq!(unwrapped, vec![170.0, 179.0, 181.0, 190.0]);
    }
}
