//! 连接管理器
//!
//! 整个应用会话只持有一条长连接，由这里独占管理：建立、有界重连、
//! 周期性 presence 心跳，以及按作用域把入站事件分发给各通道订阅者。
//! 任何通道都不得自建连接；断线期间的 emit 一律丢弃，不做排队。

use crate::rt::listener::{ConnectionListener, EmptyConnectionListener};
use crate::rt::serialization::{encode_frame, parse_frame, EventFrame};
use crate::rt::state::OnlineState;
use crate::rt::types::{event, ChatMessage, ChatScope, ScopedEvent, TypingEvent};
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 传输方式（按配置顺序逐个尝试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// 流式传输（优先）
    WebSocket,
    /// HTTP 长轮询兜底
    Polling,
}

/// 连接配置
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// 当前用户 ID
    pub user_id: String,
    /// 认证 token
    pub token: String,
    /// 服务端地址，例如 `http://127.0.0.1:8000`
    pub endpoint_url: String,
    /// 握手路径（固定）
    pub handshake_path: String,
    /// 传输方式偏好顺序
    pub transports: Vec<Transport>,
    /// 掉线后的自动重连次数上限
    pub reconnection_attempts: u32,
    /// 单次建连超时
    pub connect_timeout: Duration,
    /// 重连尝试之间的间隔
    pub reconnect_delay: Duration,
    /// presence 心跳间隔
    pub heartbeat_interval: Duration,
}

impl SocketConfig {
    /// 创建默认配置
    pub fn new(user_id: String, token: String) -> Self {
        Self {
            user_id,
            token,
            endpoint_url: "http://127.0.0.1:8000".to_string(),
            handshake_path: "/ws/socket.io".to_string(),
            transports: vec![Transport::WebSocket, Transport::Polling],
            reconnection_attempts: 5,
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// 出站事件的落点：当前生效的传输写入端
enum EmitSink {
    Ws(WsWriter),
    Poll { client: reqwest::Client, url: String },
}

pub(crate) struct SocketInner {
    pub(crate) config: SocketConfig,
    pub(crate) state: OnlineState,
    sink: Mutex<Option<EmitSink>>,
    /// 作用域 → 订阅者。入站事件只投递给匹配的作用域，而不是广播后各自过滤
    scopes: StdMutex<HashMap<ChatScope, mpsc::UnboundedSender<ScopedEvent>>>,
    listener: StdMutex<Arc<dyn ConnectionListener>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    reconnecting: AtomicBool,
    heartbeat_started: AtomicBool,
}

impl SocketInner {
    fn ws_url(&self) -> String {
        // http -> ws / https -> wss
        let base = self.config.endpoint_url.replacen("http", "ws", 1);
        format!(
            "{}{}/?transport=websocket&token={}&userID={}",
            base, self.config.handshake_path, self.config.token, self.config.user_id
        )
    }

    fn poll_url(&self) -> String {
        format!(
            "{}{}/?transport=polling&token={}&userID={}",
            self.config.endpoint_url,
            self.config.handshake_path,
            self.config.token,
            self.config.user_id
        )
    }

    fn spawn_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        // 顺手清理已结束的句柄，多次重连不会让列表无限增长
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn notify_status(&self, connected: bool, message: &str) {
        let listener = self.listener.lock().unwrap().clone();
        let message = message.to_string();
        tokio::spawn(async move {
            listener
                .on_connection_status_changed(connected, message)
                .await;
        });
    }

    /// 按偏好顺序逐个尝试传输方式，每个尝试受建连超时约束
    ///
    /// 任何一条路径建立成功都会启动 presence 心跳（每个会话一次）。
    async fn establish(self: &Arc<Self>) -> Result<()> {
        for transport in self.config.transports.clone() {
            match timeout(self.config.connect_timeout, self.try_transport(transport)).await {
                Ok(Ok(())) => {
                    self.start_heartbeat();
                    return Ok(());
                }
                Ok(Err(e)) => warn!("[Socket] ⚠️ 传输 {:?} 建立失败: {:#}", transport, e),
                Err(_) => warn!(
                    "[Socket] ⚠️ 传输 {:?} 建立超时（{:?}）",
                    transport, self.config.connect_timeout
                ),
            }
        }
        Err(anyhow::anyhow!("所有传输方式均无法建立连接"))
    }

    /// 装箱的 establish，供读循环末尾的重连路径调用，
    /// 切断 establish → 读循环 → 重连 → establish 的 future 类型环
    fn establish_boxed(self: Arc<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move { self.establish().await })
    }

    /// 启动 presence 心跳任务
    ///
    /// 每个会话只启动一次，无论连接是由 connect、手动 reconnect
    /// 还是自动重连建立的；close 后重置，下个会话重新启动。
    fn start_heartbeat(self: &Arc<Self>) {
        if self.heartbeat_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let me = Arc::clone(self);
        self.spawn_task(tokio::spawn(async move {
            let mut ticker = interval(me.config.heartbeat_interval);
            ticker.tick().await; // 首个 tick 立即完成，跳过
            loop {
                ticker.tick().await;
                if me.closed.load(Ordering::SeqCst) {
                    break;
                }
                me.emit(event::PRESENCE, serde_json::json!({ "status": "online" }))
                    .await;
            }
        }));
    }

    async fn try_transport(self: &Arc<Self>, transport: Transport) -> Result<()> {
        match transport {
            Transport::WebSocket => self.connect_websocket().await,
            Transport::Polling => self.connect_polling().await,
        }
    }

    async fn connect_websocket(self: &Arc<Self>) -> Result<()> {
        let url = self.ws_url();
        info!(
            "[Socket] 🔗 建立 WebSocket 连接 (user={})",
            self.config.user_id
        );

        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .context("WebSocket 握手失败")?;
        debug!("[Socket] 握手响应状态: {}", response.status());

        let (write, read) = ws_stream.split();
        *self.sink.lock().await = Some(EmitSink::Ws(write));
        self.mark_connected("WebSocket 连接成功");

        let me = Arc::clone(self);
        self.spawn_task(tokio::spawn(async move {
            me.ws_read_loop(read).await;
        }));

        self.rejoin_rooms().await;
        Ok(())
    }

    async fn connect_polling(self: &Arc<Self>) -> Result<()> {
        let url = self.poll_url();
        info!(
            "[Socket] 🔗 建立 HTTP 长轮询连接 (user={})",
            self.config.user_id
        );

        let client = reqwest::Client::new();
        // 首次 GET 即握手；返回的事件照常路由
        let response = client.get(&url).send().await.context("长轮询握手失败")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("长轮询握手被拒绝，HTTP状态: {}", status));
        }
        let frames = response.json::<Vec<EventFrame>>().await.unwrap_or_default();

        *self.sink.lock().await = Some(EmitSink::Poll {
            client: client.clone(),
            url: url.clone(),
        });
        self.mark_connected("长轮询连接成功");

        for frame in frames {
            self.route(frame);
        }

        let me = Arc::clone(self);
        self.spawn_task(tokio::spawn(async move {
            me.poll_read_loop(client, url).await;
        }));

        self.rejoin_rooms().await;
        Ok(())
    }

    fn mark_connected(&self, message: &str) {
        self.state.set(true);
        info!("[Socket] ✅ {}", message);
        self.notify_status(true, message);
    }

    async fn ws_read_loop(self: Arc<Self>, mut read: WsReader) {
        while let Some(item) = read.next().await {
            match item {
                Ok(WsMessage::Text(text)) => match parse_frame(&text) {
                    Ok(frame) => self.route(frame),
                    Err(e) => debug!("[Socket] 事件帧解析失败: {}, 原始: {}", e, text),
                },
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!("[Socket] 👋 连接关闭: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[Socket] WebSocket 错误: {}", e);
                    break;
                }
            }
        }
        self.on_transport_down().await;
    }

    async fn poll_read_loop(self: Arc<Self>, client: reqwest::Client, url: String) {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Vec<EventFrame>>().await {
                        Ok(frames) => {
                            for frame in frames {
                                self.route(frame);
                            }
                        }
                        Err(e) => debug!("[Socket] 长轮询响应解析失败: {}", e),
                    }
                }
                Ok(response) => {
                    warn!("[Socket] 长轮询中断，HTTP状态: {}", response.status());
                    break;
                }
                Err(e) => {
                    warn!("[Socket] 长轮询错误: {}", e);
                    break;
                }
            }
        }
        self.on_transport_down().await;
    }

    /// 读端结束：翻转状态并做有界自动重连；次数耗尽后保持断开，
    /// 只能由外部调用 `reconnect()` 再触发
    async fn on_transport_down(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        *self.sink.lock().await = None;
        self.state.set(false);
        self.notify_status(false, "连接断开");

        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        for attempt in 1..=self.config.reconnection_attempts {
            tokio::time::sleep(self.config.reconnect_delay).await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            info!(
                "[Socket] 🔄 重连尝试 {}/{}",
                attempt, self.config.reconnection_attempts
            );
            match Arc::clone(self).establish_boxed().await {
                Ok(()) => {
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => warn!("[Socket] 重连失败: {:#}", e),
            }
        }
        self.reconnecting.store(false, Ordering::SeqCst);
        if self.config.reconnection_attempts > 0 {
            error!("[Socket] ❌ 重连次数耗尽，保持断开");
        }
    }

    /// 连接（重新）建立后，为已注册的房间作用域补发 join
    async fn rejoin_rooms(self: &Arc<Self>) {
        let rooms: Vec<String> = self
            .scopes
            .lock()
            .unwrap()
            .keys()
            .filter_map(|scope| scope.room_id().map(str::to_string))
            .collect();
        for room_id in rooms {
            self.emit(event::JOIN_ROOM, serde_json::json!({ "room_id": room_id }))
                .await;
        }
    }

    /// 发出一个作用域事件；断线时静默丢弃（不排队）
    pub(crate) async fn emit(&self, event_name: &str, data: serde_json::Value) {
        if !self.state.is_connected() {
            debug!("[Socket] 断线中，事件被丢弃: {}", event_name);
            return;
        }
        let frame = match encode_frame(event_name, data) {
            Ok(f) => f,
            Err(e) => {
                error!("[Socket] 事件编码失败: {}", e);
                return;
            }
        };

        let poll_target = {
            let mut guard = self.sink.lock().await;
            match guard.as_mut() {
                Some(EmitSink::Ws(writer)) => {
                    if let Err(e) = writer.send(WsMessage::Text(frame.clone())).await {
                        warn!("[Socket] 发送失败: {}", e);
                    }
                    None
                }
                Some(EmitSink::Poll { client, url }) => Some((client.clone(), url.clone())),
                None => {
                    debug!("[Socket] 无可用传输，事件被丢弃: {}", event_name);
                    None
                }
            }
        };
        if let Some((client, url)) = poll_target {
            if let Err(e) = client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(frame)
                .send()
                .await
            {
                warn!("[Socket] 长轮询发送失败: {}", e);
            }
        }
    }

    /// 入站事件路由：按作用域投递给对应订阅者
    pub(crate) fn route(&self, frame: EventFrame) {
        match frame.event.as_str() {
            event::NEW_ROOM_MESSAGE | event::NEW_DM => {
                match serde_json::from_value::<ChatMessage>(frame.data) {
                    Ok(msg) => match msg.scope() {
                        Some(scope) => self.deliver(&scope, ScopedEvent::Message(msg)),
                        None => debug!("[Socket] 消息缺少合法作用域，丢弃: {}", frame.event),
                    },
                    Err(e) => debug!("[Socket] 消息解析失败: {}", e),
                }
            }
            event::USER_TYPING => match serde_json::from_value::<TypingEvent>(frame.data) {
                Ok(ev) => {
                    if let Some(room_id) = ev.room_id.clone() {
                        self.deliver(&ChatScope::Room(room_id), ScopedEvent::Typing(ev));
                    } else if let Some(conv_id) = ev.conversation_id.clone() {
                        self.deliver(&ChatScope::Conversation(conv_id), ScopedEvent::Typing(ev));
                    } else {
                        // payload 不带作用域时服务端已经按作用域投递过，
                        // 广播给全部订阅者即可
                        let subscribers: Vec<_> =
                            self.scopes.lock().unwrap().values().cloned().collect();
                        for tx in subscribers {
                            let _ = tx.send(ScopedEvent::Typing(ev.clone()));
                        }
                    }
                }
                Err(e) => debug!("[Socket] typing 事件解析失败: {}", e),
            },
            other => debug!("[Socket] 未知事件: {}", other),
        }
    }

    fn deliver(&self, scope: &ChatScope, ev: ScopedEvent) {
        let tx = self.scopes.lock().unwrap().get(scope).cloned();
        match tx {
            Some(tx) => {
                if tx.send(ev).is_err() {
                    debug!("[Socket] 订阅者已失效: {}", scope);
                }
            }
            None => trace!("[Socket] 无订阅者，事件丢弃: {}", scope),
        }
    }

    /// 注册一个作用域订阅；同一作用域重复注册时新订阅替换旧订阅
    ///
    /// 返回的发送端是订阅者的"凭证"：退订时带回来，只有当前
    /// 注册的订阅才会被移除。
    pub(crate) fn subscribe_scope(
        &self,
        scope: ChatScope,
    ) -> (
        mpsc::UnboundedSender<ScopedEvent>,
        mpsc::UnboundedReceiver<ScopedEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scopes.lock().unwrap().insert(scope, tx.clone());
        (tx, rx)
    }

    /// 退订作用域
    ///
    /// 仅当注册表里的发送端仍属于该订阅者时才移除；被替换掉的旧
    /// 订阅者退订不会误删接替者的订阅。
    pub(crate) fn unsubscribe_scope(
        &self,
        scope: &ChatScope,
        subscription: &mpsc::UnboundedSender<ScopedEvent>,
    ) {
        let mut scopes = self.scopes.lock().unwrap();
        if scopes
            .get(scope)
            .is_some_and(|current| current.same_channel(subscription))
        {
            scopes.remove(scope);
        }
    }

    fn shutdown_sync(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
        self.heartbeat_started.store(false, Ordering::SeqCst);
        self.state.set(false);
    }
}

/// 连接管理器
///
/// 在应用启动时 `connect()` 一次；`close()`（或 Drop）保证心跳定时器
/// 取消、连接关闭，异常退出路径也不例外。
pub struct SocketClient {
    inner: Arc<SocketInner>,
}

impl SocketClient {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                config,
                state: OnlineState::new(),
                sink: Mutex::new(None),
                scopes: StdMutex::new(HashMap::new()),
                listener: StdMutex::new(Arc::new(EmptyConnectionListener)),
                tasks: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                heartbeat_started: AtomicBool::new(false),
            }),
        }
    }

    /// 注册连接监听器
    pub fn set_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        *self.inner.listener.lock().unwrap() = listener;
    }

    /// 建立连接并启动 presence 心跳
    ///
    /// 按传输偏好顺序尝试；全部失败返回错误且状态保持断开。
    /// 心跳由连接管理器持有，独立于任何通道；断线期间 emit 自动丢弃。
    pub async fn connect(&self) -> Result<()> {
        if self.inner.state.is_connected() {
            warn!("[Socket] 已连接，忽略重复 connect");
            return Ok(());
        }
        self.inner.closed.store(false, Ordering::SeqCst);
        self.inner.establish().await
    }

    /// 手动重连（自动重连次数耗尽后的唯一恢复途径）
    pub async fn reconnect(&self) -> Result<()> {
        if self.inner.state.is_connected() {
            return Ok(());
        }
        self.inner.closed.store(false, Ordering::SeqCst);
        self.inner.establish().await
    }

    /// 关闭连接并取消全部后台任务
    pub async fn close(&self) {
        info!("[Socket] 👋 主动关闭连接");
        self.inner.shutdown_sync();
        *self.inner.sink.lock().await = None;
        self.inner.notify_status(false, "连接已关闭");
    }

    /// 发出一个事件（断线时静默丢弃）
    pub async fn emit(&self, event_name: &str, data: serde_json::Value) {
        self.inner.emit(event_name, data).await;
    }

    /// 在线状态句柄（可克隆、可订阅）
    pub fn online_state(&self) -> OnlineState {
        self.inner.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub(crate) fn inner(&self) -> &Arc<SocketInner> {
        &self.inner
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.inner.shutdown_sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            let filter_layer = EnvFilter::new("info,bgclive_realtime=debug");
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        });
    }

    fn test_config(endpoint: String) -> SocketConfig {
        let mut config = SocketConfig::new("u1".to_string(), "test-token".to_string());
        config.endpoint_url = endpoint;
        config.transports = vec![Transport::WebSocket];
        config.reconnection_attempts = 0;
        config.connect_timeout = Duration::from_secs(3);
        config
    }

    fn room_message_frame(room_id: &str, id: &str) -> EventFrame {
        EventFrame {
            event: event::NEW_ROOM_MESSAGE.to_string(),
            data: serde_json::json!({
                "id": id,
                "sender_id": "u2",
                "content": "hello",
                "room_id": room_id,
                "type": "TEXT",
                "created_at": "2026-01-01T00:00:00",
            }),
        }
    }

    #[tokio::test]
    async fn handshake_flips_state_and_drop_flips_back() {
        init_test_logger();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = ws.close(None).await;
        });

        let client = SocketClient::new(test_config(format!("http://{}", addr)));
        let mut rx = client.online_state().subscribe();
        assert!(!client.is_connected());

        client.connect().await.unwrap();
        assert!(client.is_connected());

        // 服务端断开后状态翻回 false
        rx.wait_for(|connected| !*connected).await.unwrap();
        assert!(!client.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_leaves_state_disconnected() {
        init_test_logger();
        // 9 是 discard 端口，基本不会有监听者
        let mut config = test_config("http://127.0.0.1:9".to_string());
        config.connect_timeout = Duration::from_millis(500);
        let client = SocketClient::new(config);
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn emit_while_disconnected_is_a_silent_noop() {
        let client = SocketClient::new(test_config("http://127.0.0.1:9".to_string()));
        // 未连接时 emit 不 panic、不报错
        client
            .emit(event::PRESENCE, serde_json::json!({"status": "online"}))
            .await;
    }

    #[tokio::test]
    async fn route_delivers_only_to_matching_scope() {
        init_test_logger();
        let client = SocketClient::new(test_config("http://127.0.0.1:9".to_string()));
        let inner = client.inner();

        let (_tx, mut rx) = inner.subscribe_scope(ChatScope::Room("A".to_string()));
        inner.route(room_message_frame("A", "m1"));
        inner.route(room_message_frame("B", "m2"));

        match rx.recv().await.unwrap() {
            ScopedEvent::Message(msg) => assert_eq!(msg.id, "m1"),
            other => panic!("意外事件: {:?}", other),
        }
        // B 房间的事件没有投递过来
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_without_scope_is_broadcast_to_all_subscribers() {
        let client = SocketClient::new(test_config("http://127.0.0.1:9".to_string()));
        let inner = client.inner();
        let (_tx_a, mut rx_a) = inner.subscribe_scope(ChatScope::Room("A".to_string()));
        let (_tx_b, mut rx_b) = inner.subscribe_scope(ChatScope::Conversation("C".to_string()));

        inner.route(EventFrame {
            event: event::USER_TYPING.to_string(),
            data: serde_json::json!({"user_id": "u9", "is_typing": true}),
        });

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                ScopedEvent::Typing(ev) => assert_eq!(ev.user_id, "u9"),
                other => panic!("意外事件: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn resubscribing_a_scope_replaces_the_old_subscriber() {
        let client = SocketClient::new(test_config("http://127.0.0.1:9".to_string()));
        let inner = client.inner();

        let (old_tx, mut old_rx) = inner.subscribe_scope(ChatScope::Room("A".to_string()));
        let (_new_tx, mut new_rx) = inner.subscribe_scope(ChatScope::Room("A".to_string()));
        drop(old_tx);

        inner.route(room_message_frame("A", "m1"));
        assert!(new_rx.recv().await.is_some());
        // 旧订阅的发送端已被替换丢弃
        assert!(old_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_unsubscribe_does_not_evict_the_replacement() {
        let client = SocketClient::new(test_config("http://127.0.0.1:9".to_string()));
        let inner = client.inner();
        let scope = ChatScope::Room("A".to_string());

        let (old_tx, _old_rx) = inner.subscribe_scope(scope.clone());
        let (new_tx, mut new_rx) = inner.subscribe_scope(scope.clone());

        // 被替换的旧订阅者退订，不能拆掉接替者的订阅
        inner.unsubscribe_scope(&scope, &old_tx);
        inner.route(room_message_frame("A", "m1"));
        assert!(new_rx.recv().await.is_some());

        // 接替者自己退订才真正移除
        inner.unsubscribe_scope(&scope, &new_tx);
        assert!(inner.scopes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn auto_reconnect_reestablishes_after_drop() {
        init_test_logger();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // 第一条连接：握手后立即关闭
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.close(None).await;
            // 第二条连接：重连成功后保持存活
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let mut config = test_config(format!("http://{}", addr));
        config.reconnection_attempts = 3;
        config.reconnect_delay = Duration::from_millis(100);
        let client = SocketClient::new(config);
        let mut rx = client.online_state().subscribe();

        client.connect().await.unwrap();
        // 掉线后自动重连把状态翻回 true
        rx.wait_for(|connected| !*connected).await.unwrap();
        rx.wait_for(|connected| *connected).await.unwrap();
        assert!(client.is_connected());
        server.abort();
    }

    #[tokio::test]
    async fn heartbeat_runs_after_manual_reconnect() {
        init_test_logger();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = test_config(format!("http://{}", addr));
        config.heartbeat_interval = Duration::from_millis(100);
        config.connect_timeout = Duration::from_millis(300);
        let client = SocketClient::new(config);

        // 首次 connect 失败（服务端尚未应答握手）
        assert!(client.connect().await.is_err());

        // 服务端上线，等第一帧 presence 心跳
        let server = tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                while let Some(item) = ws.next().await {
                    match item {
                        Ok(WsMessage::Text(text)) => {
                            let frame = parse_frame(&text).unwrap();
                            if frame.event == event::PRESENCE {
                                return;
                            }
                        }
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }
            }
        });

        client.reconnect().await.unwrap();
        assert!(client.is_connected());
        // 手动重连建立的会话同样发出 presence 心跳
        timeout(Duration::from_secs(2), server)
            .await
            .expect("重连后未收到 presence 心跳")
            .unwrap();
    }

    #[tokio::test]
    async fn finished_task_handles_are_reaped_on_spawn() {
        let client = SocketClient::new(test_config("http://127.0.0.1:9".to_string()));
        let inner = client.inner();

        inner.spawn_task(tokio::spawn(async {}));
        tokio::time::sleep(Duration::from_millis(50)).await;

        inner.spawn_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }));
        // 已结束的句柄在下一次 spawn 时被清理
        assert_eq!(inner.tasks.lock().unwrap().len(), 1);
    }
}
