//! Prometheus 指标导出模块
//!
//! @yutiansut @quantaxis
//!
//! 函数执行相关指标：
//! - 调用次数 (按函数、分组运算)
//! - 绑定/解析错误 (按错误类别)
//! - 准备阶段耗时
//! - Immediate 缓冲样本数与超限次数
//! - 被取消的管道数、切片数

use lazy_static::lazy_static;
use prometheus::{
    self, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ═══════════════════════════════════════════════════════════════════
    // 调用指标
    // ═══════════════════════════════════════════════════════════════════

    /// 函数调用总数
    pub static ref FUNCTION_INVOCATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("function_invocations_total", "Total number of function invocations")
            .namespace("qaseries"),
        &["function", "group_operation"]
    ).expect("Failed to create FUNCTION_INVOCATIONS metric");

    /// 调用失败总数
    pub static ref FUNCTION_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("function_errors_total", "Total number of invocations rejected before execution")
            .namespace("qaseries"),
        &["kind"]
    ).expect("Failed to create FUNCTION_ERRORS metric");

    /// 绑定与分组解析耗时 (微秒)
    pub static ref FUNCTION_PREPARE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("function_prepare_latency_us", "Parameter binding and group resolution latency in microseconds")
            .namespace("qaseries")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
        &["function"]
    ).expect("Failed to create FUNCTION_PREPARE_LATENCY metric");

    // ═══════════════════════════════════════════════════════════════════
    // 执行指标
    // ═══════════════════════════════════════════════════════════════════

    /// Immediate 内核缓冲的样本总数
    pub static ref BUFFERED_SAMPLES: IntCounter = IntCounter::new(
        "qaseries_buffered_samples_total", "Total number of samples buffered for immediate kernels"
    ).expect("Failed to create BUFFERED_SAMPLES metric");

    /// 缓冲超过上限的次数
    pub static ref BUFFER_LIMIT_EXCEEDED: IntCounter = IntCounter::new(
        "qaseries_buffer_limit_exceeded_total", "Number of immediate buffers truncated at the configured ceiling"
    ).expect("Failed to create BUFFER_LIMIT_EXCEEDED metric");

    /// 被取消的管道数
    pub static ref CANCELLED_PIPELINES: IntCounter = IntCounter::new(
        "qaseries_cancelled_pipelines_total", "Number of pipelines stopped by cancellation"
    ).expect("Failed to create CANCELLED_PIPELINES metric");

    /// 切片总数
    pub static ref SLICES_EMITTED: IntCounter = IntCounter::new(
        "qaseries_slices_emitted_total", "Number of time-aligned slices produced by the slice windower"
    ).expect("Failed to create SLICES_EMITTED metric");
}

/// 注册全部指标 (重复调用安全)
pub fn init_metrics() {
    REGISTRY.register(Box::new(FUNCTION_INVOCATIONS.clone())).ok();
    REGISTRY.register(Box::new(FUNCTION_ERRORS.clone())).ok();
    REGISTRY.register(Box::new(FUNCTION_PREPARE_LATENCY.clone())).ok();

    REGISTRY.register(Box::new(BUFFERED_SAMPLES.clone())).ok();
    REGISTRY.register(Box::new(BUFFER_LIMIT_EXCEEDED.clone())).ok();
    REGISTRY.register(Box::new(CANCELLED_PIPELINES.clone())).ok();
    REGISTRY.register(Box::new(SLICES_EMITTED.clone())).ok();

    log::debug!("Prometheus metrics registered");
}

/// 导出指标为 Prometheus 文本格式
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        log::warn!("failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// 带标签的计时器 (微秒)
pub struct LabeledTimer {
    start: std::time::Instant,
    histogram: HistogramVec,
    labels: Vec<String>,
}

impl LabeledTimer {
    pub fn new(histogram: HistogramVec, labels: Vec<String>) -> Self {
        Self {
            start: std::time::Instant::now(),
            histogram,
            labels,
        }
    }

    pub fn observe(self) {
        let elapsed = self.start.elapsed().as_micros() as f64;
        let label_refs: Vec<&str> = self.labels.iter().map(|s| s.as_str()).collect();
        self.histogram.with_label_values(&label_refs).observe(elapsed);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 便捷宏
// ═══════════════════════════════════════════════════════════════════════

/// 记录函数调用
#[macro_export]
macro_rules! record_invocation {
    ($function:expr, $group_operation:expr) => {
        $crate::observability::FUNCTION_INVOCATIONS
            .with_label_values(&[$function, $group_operation])
            .inc();
    };
}

/// 记录调用错误
#[macro_export]
macro_rules! record_function_error {
    ($kind:expr) => {
        $crate::observability::FUNCTION_ERRORS
            .with_label_values(&[$kind])
            .inc();
    };
}
