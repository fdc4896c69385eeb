//! Welford 算法 - 数值稳定的在线方差
//!
//! @yutiansut @quantaxis
//!
//! - 避免大数相减导致的精度损失
//! - O(1) 更新

use super::IncrementalOperator;

/// Welford 单变量统计状态
#[derive(Debug, Clone, Default)]
pub struct WelfordState {
    /// 数据点数量
    pub count: u64,
    /// 均值
    pub mean: f64,
    /// M2 = Σ(x - mean)²
    pub m2: f64,
}

impl WelfordState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut state = Self::new();
        for value in values {
            state.update(value);
        }
        state
    }

    /// 增量更新
    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// 方差 (总体)
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// 方差 (样本)
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差 (总体)
    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 标准差 (样本)
    pub fn sample_std(&self) -> f64 {
        self.sample_variance().sqrt()
    }

    /// Z 分数；标准差为 0 时为 0
    pub fn z_score(&self, x: f64) -> f64 {
        let std = self.std();
        if std == 0.0 || !std.is_finite() {
            0.0
        } else {
            (x - self.mean) / std
        }
    }
}

/// 总体标准差
pub struct PopulationStdDev;

impl IncrementalOperator for PopulationStdDev {
    type State = WelfordState;

    fn update(state: &mut WelfordState, input: f64) {
        state.update(input);
    }

    fn value(state: &WelfordState) -> Option<f64> {
        (state.count > 0).then(|| state.std())
    }
}

/// 样本标准差 (n - 1)
pub struct SampleStdDev;

impl IncrementalOperator for SampleStdDev {
    type State = WelfordState;

    fn update(state: &mut WelfordState, input: f64) {
        state.update(input);
    }

    fn value(state: &WelfordState) -> Option<f64> {
        (state.count > 0).then(|| state.sample_std())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_basic() {
        let state = WelfordState::from_values([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((state.mean - 5.0).abs() < 1e-10);
        assert!((state.variance() - 4.0).abs() < 1e-10);
        assert!((state.std() - 2.0).abs() < 1e-10);
        assert!((state.sample_variance() - 32.0 / 7.0).abs() < 1e-10);
        assert!((state.z_score(9.0) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_numerical_stability() {
        let state = WelfordState::from_values((0..1000).map(|i| 1e9 + (i % 2) as f64));
        assert!((state.variance() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_zero_variance_z_score() {
        let state = WelfordState::from_values([3.0; 10]);
        assert_eq!(state.z_score(3.0), 0.0);
        assert_eq!(PopulationStdDev::evaluate([3.0; 4]), Some(0.0));
        assert_eq!(SampleStdDev::evaluate([1.0]), Some(0.0));
    }
}
