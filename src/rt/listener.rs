//! 回调接口定义
//!
//! 连接与消息两类监听器，调用方按需注册；默认提供空实现。

use crate::rt::types::ChatMessage;
use async_trait::async_trait;

/// 连接状态监听器
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    /// 连接状态变化
    ///
    /// 参数 `connected` 表示是否已连接，`message` 是状态说明
    async fn on_connection_status_changed(&self, connected: bool, message: String);
}

/// 空的连接监听器实现（默认实现）
pub struct EmptyConnectionListener;

#[async_trait]
impl ConnectionListener for EmptyConnectionListener {
    async fn on_connection_status_changed(&self, _connected: bool, _message: String) {}
}

/// 通道消息监听器
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// 收到本作用域的新消息
    async fn on_new_message(&self, message: ChatMessage);

    /// 乐观消息被服务端回显替换（按关联 ID 对账成功）
    async fn on_message_reconciled(&self, message: ChatMessage);

    /// 正在输入的用户集合发生变化
    async fn on_typing_changed(&self, typing_users: Vec<String>);
}

/// 空的消息监听器实现（默认实现）
pub struct EmptyMessageListener;

#[async_trait]
impl MessageListener for EmptyMessageListener {
    async fn on_new_message(&self, _message: ChatMessage) {}
    async fn on_message_reconciled(&self, _message: ChatMessage) {}
    async fn on_typing_changed(&self, _typing_users: Vec<String>) {}
}
