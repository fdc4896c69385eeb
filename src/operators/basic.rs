//! 基础增量算子 - Sum, Count, Mean, Range
//!
//! @yutiansut @quantaxis

use super::IncrementalOperator;

// ═══════════════════════════════════════════════════════════════════════════
// Sum / Count / Mean
// ═══════════════════════════════════════════════════════════════════════════

/// 累加状态
#[derive(Debug, Clone, Default)]
pub struct SumState {
    pub sum: f64,
    pub count: u64,
}

/// 求和
pub struct Sum;

impl IncrementalOperator for Sum {
    type State = SumState;

    fn update(state: &mut SumState, input: f64) {
        state.sum += input;
        state.count += 1;
    }

    fn value(state: &SumState) -> Option<f64> {
        (state.count > 0).then_some(state.sum)
    }
}

/// 计数 (NaN 同样计入)
pub struct Count;

impl IncrementalOperator for Count {
    type State = SumState;

    fn update(state: &mut SumState, _input: f64) {
        state.count += 1;
    }

    fn value(state: &SumState) -> Option<f64> {
        (state.count > 0).then_some(state.count as f64)
    }
}

/// 均值
pub struct Mean;

impl IncrementalOperator for Mean {
    type State = SumState;

    fn update(state: &mut SumState, input: f64) {
        Sum::update(state, input);
    }

    fn value(state: &SumState) -> Option<f64> {
        (state.count > 0).then(|| state.sum / state.count as f64)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Range
// ═══════════════════════════════════════════════════════════════════════════

/// 最值状态
#[derive(Debug, Clone)]
pub struct ExtremesState {
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

impl Default for ExtremesState {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }
}

/// 极差 max - min
pub struct Range;

impl IncrementalOperator for Range {
    type State = ExtremesState;

    fn update(state: &mut ExtremesState, input: f64) {
        if input.is_nan() {
            return;
        }
        state.min = state.min.min(input);
        state.max = state.max.max(input);
        state.count += 1;
    }

    fn value(state: &ExtremesState) -> Option<f64> {
        (state.count > 0).then(|| state.max - state.min)
    }
}
