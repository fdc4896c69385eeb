//! 增量统计算子
//!
//! @yutiansut @quantaxis
//!
//! 聚合类内核共用的 O(1) 更新状态：
//! - basic: 求和、计数、均值、极差
//! - welford: 数值稳定的方差/标准差
//! - ring_buffer: 定长数值窗口
//! - rolling: 移动平均、标量卡尔曼滤波

pub mod basic;
pub mod ring_buffer;
pub mod rolling;
pub mod welford;

pub use basic::{Count, Mean, Range, Sum};
pub use ring_buffer::NumericRingBuffer;
pub use rolling::{RollingMean, ScalarKalman};
pub use welford::{PopulationStdDev, SampleStdDev, WelfordState};

/// 增量算子 Trait
///
/// 算子本身无状态，状态由 `State` 承载，便于在内核中按值持有。
pub trait IncrementalOperator: Send + Sync + 'static {
    /// 算子状态类型
    type State: Default + Clone + Send + Sync;

    /// 增量更新
    fn update(state: &mut Self::State, input: f64);

    /// 当前值，尚无输入时为 None
    fn value(state: &Self::State) -> Option<f64>;

    /// 一次性计算
    fn evaluate<I: IntoIterator<Item = f64>>(inputs: I) -> Option<f64> {
        let mut state = Self::State::default();
        for input in inputs {
            Self::update(&mut state, input);
        }
        Self::value(&state)
    }
}
