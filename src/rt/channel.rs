//! 聊天通道
//!
//! 一个通道对应一个作用域（群聊房间或私信会话），从连接管理器
//! 订阅该作用域的事件流，维护本地消息列表、乐观发送的回显替换
//! 以及对端输入提示。通道本身不建连接，断线时发送直接丢弃。

use crate::rt::listener::{EmptyMessageListener, MessageListener};
use crate::rt::serialization::generate_client_msg_id;
use crate::rt::socket::{SocketClient, SocketInner};
use crate::rt::types::{event, ChatMessage, ChatScope, MessageKind, ScopedEvent};
use crate::rt::typing::TypingCoordinator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// 入站消息并入本地列表的结果
enum Ingest {
    /// 新消息，已追加
    New(ChatMessage),
    /// 按 client_msg_id 命中乐观消息，已原位替换
    Reconciled(ChatMessage),
    /// 作用域不匹配，丢弃
    Dropped,
}

/// 把入站消息并入本地列表
///
/// 连接层已按作用域分发，这里再校验一次作为兜底；不匹配的消息
/// 静默丢弃。带 client_msg_id 且命中本地乐观消息时原位替换，
/// 否则追加。
fn ingest_message(
    messages: &StdMutex<Vec<ChatMessage>>,
    scope: &ChatScope,
    msg: ChatMessage,
) -> Ingest {
    if msg.scope().as_ref() != Some(scope) {
        trace!("[Channel] 作用域不匹配，消息丢弃: {:?}", msg.scope());
        return Ingest::Dropped;
    }
    let mut list = messages.lock().unwrap();
    if let Some(client_msg_id) = &msg.client_msg_id {
        if let Some(pos) = list
            .iter()
            .position(|m| m.client_msg_id.as_deref() == Some(client_msg_id.as_str()))
        {
            list[pos] = msg.clone();
            return Ingest::Reconciled(msg);
        }
    }
    list.push(msg.clone());
    Ingest::New(msg)
}

/// 聊天通道
pub struct ChatChannel {
    scope: ChatScope,
    socket: Arc<SocketInner>,
    /// 本通道在作用域注册表里的订阅凭证，退订时带回
    subscription: mpsc::UnboundedSender<ScopedEvent>,
    messages: Arc<StdMutex<Vec<ChatMessage>>>,
    typing: Arc<TypingCoordinator>,
    task: StdMutex<Option<JoinHandle<()>>>,
    detached: AtomicBool,
}

impl ChatChannel {
    /// 挂载通道：订阅作用域事件流，房间作用域还会发送 join
    pub async fn attach(client: &SocketClient, scope: ChatScope) -> Self {
        Self::attach_with_listener(client, scope, Arc::new(EmptyMessageListener)).await
    }

    /// 挂载通道并注册消息监听器
    pub async fn attach_with_listener(
        client: &SocketClient,
        scope: ChatScope,
        listener: Arc<dyn MessageListener>,
    ) -> Self {
        let socket = Arc::clone(client.inner());
        let (subscription, mut rx) = socket.subscribe_scope(scope.clone());

        // 房间需要显式加入；断线时 emit 自动丢弃，重连后由
        // 连接管理器统一补发 join
        if let ChatScope::Room(room_id) = &scope {
            socket
                .emit(event::JOIN_ROOM, serde_json::json!({ "room_id": room_id }))
                .await;
        }

        let messages: Arc<StdMutex<Vec<ChatMessage>>> = Arc::new(StdMutex::new(Vec::new()));
        let typing = Arc::new(TypingCoordinator::new());

        let task = {
            let scope = scope.clone();
            let messages = Arc::clone(&messages);
            let typing = Arc::clone(&typing);
            tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    match ev {
                        ScopedEvent::Message(msg) => {
                            match ingest_message(&messages, &scope, msg) {
                                Ingest::New(msg) => listener.on_new_message(msg).await,
                                Ingest::Reconciled(msg) => {
                                    debug!("[Channel] 🔁 乐观消息已替换: {}", msg.id);
                                    listener.on_message_reconciled(msg).await;
                                }
                                Ingest::Dropped => {}
                            }
                        }
                        ScopedEvent::Typing(ev) => {
                            typing.apply(&ev.user_id, ev.is_typing);
                            listener.on_typing_changed(typing.active_users()).await;
                        }
                    }
                }
                debug!("[Channel] 事件流结束: {}", scope);
            })
        };

        debug!("[Channel] 📌 通道挂载: {}", scope);
        Self {
            scope,
            socket,
            subscription,
            messages,
            typing,
            task: StdMutex::new(Some(task)),
            detached: AtomicBool::new(false),
        }
    }

    /// 发送消息
    ///
    /// 先乐观插入本地列表（id 暂用 client_msg_id），再发给服务端；
    /// 服务端回显时按 client_msg_id 原位替换为权威版本。
    /// 断线时整个操作是空操作，不排队不乐观插入。
    pub async fn send_message(&self, content: &str, kind: MessageKind) {
        if !self.socket.state.is_connected() {
            debug!("[Channel] 断线中，消息被丢弃: {}", self.scope);
            return;
        }
        let client_msg_id = generate_client_msg_id(&self.socket.config.user_id);
        let msg = ChatMessage {
            id: client_msg_id.clone(),
            sender_id: self.socket.config.user_id.clone(),
            content: content.to_string(),
            room_id: self.scope.room_id().map(str::to_string),
            conversation_id: self.scope.conversation_id().map(str::to_string),
            kind,
            created_at: chrono::Utc::now().to_rfc3339(),
            url: None,
            client_msg_id: Some(client_msg_id.clone()),
        };
        self.messages.lock().unwrap().push(msg);

        match &self.scope {
            ChatScope::Room(room_id) => {
                self.socket
                    .emit(
                        event::SEND_ROOM_MESSAGE,
                        serde_json::json!({
                            "room_id": room_id,
                            "content": content,
                            "type": kind,
                            "client_msg_id": client_msg_id,
                        }),
                    )
                    .await;
            }
            ChatScope::Conversation(conv_id) => {
                self.socket
                    .emit(
                        event::SEND_DM,
                        serde_json::json!({
                            "conversation_id": conv_id,
                            "content": content,
                            "type": kind,
                            "client_msg_id": client_msg_id,
                        }),
                    )
                    .await;
            }
        }
    }

    /// 上报"正在输入"，同一通道 3 秒内至多发出一次
    pub async fn notify_typing(&self) {
        if !self.socket.state.is_connected() {
            return;
        }
        if !self.typing.should_notify() {
            return;
        }
        self.socket
            .emit(
                event::TYPING,
                serde_json::json!({
                    "room_id": self.scope.room_id(),
                    "recipient_id": self.scope.conversation_id(),
                }),
            )
            .await;
    }

    /// 当前消息列表快照
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// 当前正在输入的用户（已排序）
    pub fn typing_users(&self) -> Vec<String> {
        self.typing.active_users()
    }

    pub fn scope(&self) -> &ChatScope {
        &self.scope
    }

    /// 卸载通道：退订作用域、停掉事件泵、清空输入提示定时器
    ///
    /// 幂等；Drop 时自动调用。退订带上自己的订阅凭证，
    /// 同一作用域被新通道接管后旧通道卸载不影响接管者。
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        self.socket.unsubscribe_scope(&self.scope, &self.subscription);
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
        self.typing.clear();
        debug!("[Channel] 通道卸载: {}", self.scope);
    }
}

impl Drop for ChatChannel {
    fn drop(&mut self) {
        self.detach();
    }
}
