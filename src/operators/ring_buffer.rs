//! 定长数值窗口
//!
//! @yutiansut @quantaxis

use std::collections::VecDeque;

/// f64 环形缓冲区，推入/过期 O(1) 并维护窗口和
#[derive(Debug, Clone)]
pub struct NumericRingBuffer {
    values: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl NumericRingBuffer {
    /// 容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// 推入新值，窗口已满时返回被挤出的最旧值
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let expired = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(value);
        self.sum += value - expired.unwrap_or(0.0);
        expired
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// 空窗口均值为 0
    pub fn mean(&self) -> f64 {
        match self.values.len() {
            0 => 0.0,
            n => self.sum / n as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}
