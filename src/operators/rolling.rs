//! 滚动窗口算子 - 移动平均、标量卡尔曼滤波
//!
//! @yutiansut @quantaxis

use super::ring_buffer::NumericRingBuffer;

// ═══════════════════════════════════════════════════════════════════════════
// RollingMean - 移动平均
// ═══════════════════════════════════════════════════════════════════════════

/// 滚动均值算子 (窗口未满时为已有样本的均值)
#[derive(Debug, Clone)]
pub struct RollingMean {
    buffer: NumericRingBuffer,
}

impl RollingMean {
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: NumericRingBuffer::new(window_size),
        }
    }

    /// 推入新值并返回当前均值
    pub fn update(&mut self, value: f64) -> f64 {
        self.buffer.push(value);
        self.buffer.mean()
    }

    pub fn value(&self) -> f64 {
        self.buffer.mean()
    }

    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }
}

impl Default for RollingMean {
    fn default() -> Self {
        Self::new(5)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ScalarKalman - 一维卡尔曼滤波
// ═══════════════════════════════════════════════════════════════════════════

/// 一维卡尔曼滤波 (常值模型)
///
/// ```text
/// P⁻ = P + Q
/// K  = P⁻ / (P⁻ + R)
/// x  = x + K (z - x)
/// P  = (1 - K) P⁻
/// ```
#[derive(Debug, Clone)]
pub struct ScalarKalman {
    process_noise: f64,
    measurement_noise: f64,
    estimate: Option<f64>,
    error_covariance: f64,
}

impl ScalarKalman {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            process_noise: process_noise.abs(),
            measurement_noise: measurement_noise.abs(),
            estimate: None,
            error_covariance: 1.0,
        }
    }

    /// 输入观测值，返回滤波后的估计；首个观测直接作为初始估计
    pub fn update(&mut self, measurement: f64) -> f64 {
        let Some(estimate) = self.estimate else {
            self.estimate = Some(measurement);
            return measurement;
        };

        let predicted = self.error_covariance + self.process_noise;
        let denominator = predicted + self.measurement_noise;
        let gain = if denominator == 0.0 { 1.0 } else { predicted / denominator };
        let next = estimate + gain * (measurement - estimate);

        self.error_covariance = (1.0 - gain) * predicted;
        self.estimate = Some(next);
        next
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }
}

impl Default for ScalarKalman {
    fn default() -> Self {
        Self::new(1e-5, 1e-3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean() {
        let mut mean = RollingMean::new(3);
        assert_eq!(mean.update(3.0), 3.0);
        assert_eq!(mean.update(6.0), 4.5);
        assert_eq!(mean.update(9.0), 6.0);
        assert!(mean.is_full());
        assert_eq!(mean.update(12.0), 9.0);
        assert_eq!(mean.count(), 3);
    }

    #[test]
    fn test_kalman_converges_to_constant() {
        let mut kalman = ScalarKalman::default();
        assert_eq!(kalman.update(10.0), 10.0);
        let mut last = 0.0;
        for i in 0..200 {
            let noise = if i % 2 == 0 { 0.5 } else { -0.5 };
            last = kalman.update(10.0 + noise);
        }
        assert!((last - 10.0).abs() < 0.1);
    }

    #[test]
    fn test_kalman_smooths_step() {
        let mut kalman = ScalarKalman::new(1e-5, 1.0);
        kalman.update(0.0);
        let filtered = kalman.update(100.0);
        assert!(filtered > 0.0 && filtered < 100.0);
    }
}
