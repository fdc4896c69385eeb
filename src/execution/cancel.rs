//! 协作式取消
//!
//! @yutiansut @quantaxis
//!
//! 令牌在调用方与管道之间共享；管道在每个拉取边界检查，
//! 取消后不再从上游拉取样本。异步管道在等待上游时同时等待取消通知，
//! 上游迟迟不产出样本也能及时结束。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// 取消令牌
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("cancellation requested");
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// 等待取消；已取消时立即完成
    pub async fn cancelled(&self) {
        loop {
            // 先登记等待再检查标志，避免错过两者之间的通知
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
