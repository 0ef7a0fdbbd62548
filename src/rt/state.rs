//! 连接状态：单一可注入的在线标志
//!
//! 整个会话只有一份连接状态，由连接管理器独占写入，
//! 所有依赖方通过句柄读取或订阅变更，不存在模块级可变全局。

use tokio::sync::watch;

/// 在线状态句柄
///
/// 克隆句柄共享同一份状态；`set` 仅对 crate 内部开放（连接管理器独占写）。
#[derive(Clone)]
pub struct OnlineState {
    tx: watch::Sender<bool>,
}

impl OnlineState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// 当前是否已连接
    ///
    /// 调用方必须把"已连接"当作瞬态事实：读到 true 后仍可能在下一刻掉线。
    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// 订阅状态变更
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, connected: bool) {
        self.tx.send_replace(connected);
    }
}

impl Default for OnlineState {
    fn default() -> Self {
        Self::new()
    }
}
