//! 输入提示协调器
//!
//! 出站方向对 typing 信号做本地限频（同一作用域 3 秒最多一次）；
//! 入站方向维护"正在输入"的用户集合，每个用户只保留一个过期定时器，
//! 新信号到达时先取消旧定时器再重新计时（按键防抖），
//! 保证指示器在最后一次信号之后固定 5 秒消失。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// 出站 typing 信号的最小间隔
pub const TYPING_EMIT_INTERVAL: Duration = Duration::from_millis(3000);

/// 入站 typing 状态的过期时间（自最后一次信号起算）
pub const TYPING_EXPIRE: Duration = Duration::from_millis(5000);

/// 输入提示协调器
///
/// 状态是进程内瞬态的，作用域切换时由通道调用 `clear()` 重置。
pub struct TypingCoordinator {
    min_interval: Duration,
    expiry: Duration,
    last_sent: Mutex<Option<Instant>>,
    active: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self::with_timing(TYPING_EMIT_INTERVAL, TYPING_EXPIRE)
    }

    pub fn with_timing(min_interval: Duration, expiry: Duration) -> Self {
        Self {
            min_interval,
            expiry,
            last_sent: Mutex::new(None),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 出站限频：距上次放行不足 min_interval 时返回 false（调用方不发信号）
    pub fn should_notify(&self) -> bool {
        let mut last = self.last_sent.lock().unwrap();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// 应用入站 typing 事件
    ///
    /// is_typing=true 时加入集合并武装过期定时器（同一用户的旧定时器先取消）；
    /// is_typing=false 时立即移除。
    pub fn apply(&self, user_id: &str, is_typing: bool) {
        let mut active = self.active.lock().unwrap();

        // 无论增删，先取消该用户已有的定时器
        if let Some(prev) = active.remove(user_id) {
            prev.abort();
        }

        if !is_typing {
            debug!("[Typing] 用户停止输入: {}", user_id);
            return;
        }

        let map = Arc::clone(&self.active);
        let expiry = self.expiry;
        let user = user_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if map.lock().unwrap().remove(&user).is_some() {
                debug!("[Typing] ⏱️ 输入状态过期: {}", user);
            }
        });
        active.insert(user_id.to_string(), handle);
    }

    /// 当前正在输入的用户集合快照
    pub fn active_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.active.lock().unwrap().keys().cloned().collect();
        users.sort();
        users
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.active.lock().unwrap().contains_key(user_id)
    }

    /// 清空全部状态（作用域切换 / 通道卸载时调用）
    pub fn clear(&self) {
        let mut active = self.active.lock().unwrap();
        for (_, handle) in active.drain() {
            handle.abort();
        }
        *self.last_sent.lock().unwrap() = None;
    }
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TypingCoordinator {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    #[tokio::test(start_paused = true)]
    async fn entry_expires_without_stop_event() {
        let typing = TypingCoordinator::new();
        typing.apply("u1", true);
        assert!(typing.is_typing("u1"));

        sleep(Duration::from_millis(5100)).await;
        tokio::task::yield_now().await;
        assert!(!typing.is_typing("u1"));
        assert!(typing.active_users().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_signal_extends_the_expiry_window() {
        let typing = TypingCoordinator::new();
        typing.apply("u1", true);

        // 3 秒后再次收到信号：旧定时器取消，窗口从现在重新计 5 秒
        sleep(Duration::from_millis(3000)).await;
        typing.apply("u1", true);

        // 第 6 秒：首个定时器本应在第 5 秒触发，但已被取消
        sleep(Duration::from_millis(3000)).await;
        tokio::task::yield_now().await;
        assert!(typing.is_typing("u1"));

        // 第 8.1 秒：距最后一次信号超过 5 秒，过期
        sleep(Duration::from_millis(2100)).await;
        tokio::task::yield_now().await;
        assert!(!typing.is_typing("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_event_removes_immediately() {
        let typing = TypingCoordinator::new();
        typing.apply("u1", true);
        typing.apply("u2", true);
        typing.apply("u1", false);
        assert_eq!(typing.active_users(), vec!["u2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_rate_limit_allows_one_per_window() {
        let typing = TypingCoordinator::new();
        assert!(typing.should_notify());
        assert!(!typing.should_notify());

        advance(Duration::from_millis(2900)).await;
        assert!(!typing.should_notify());

        advance(Duration::from_millis(200)).await;
        assert!(typing.should_notify());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_everything() {
        let typing = TypingCoordinator::new();
        typing.apply("u1", true);
        typing.should_notify();
        typing.clear();
        assert!(typing.active_users().is_empty());
        // 限频状态也被重置
        assert!(typing.should_notify());
    }
}
