//! 实时层公共类型定义
//!
//! 包含消息、作用域、订阅事件以及 REST 水合接口的 wire 结构。

use serde::{Deserialize, Serialize};

/// Socket 事件名称
///
/// 与服务端约定的事件名保持一致（消费 3 个，发出 5 个）。
pub mod event {
    // 入站
    pub const NEW_ROOM_MESSAGE: &str = "new_room_message";
    pub const NEW_DM: &str = "new_dm";
    pub const USER_TYPING: &str = "user_typing";
    // 出站
    pub const JOIN_ROOM: &str = "join_room";
    pub const SEND_ROOM_MESSAGE: &str = "send_room_message";
    pub const SEND_DM: &str = "send_dm";
    pub const TYPING: &str = "typing";
    pub const PRESENCE: &str = "presence";
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    System,
}

/// 聊天作用域：房间或单聊会话，二者互斥
///
/// 用枚举而不是两个 Option 字段表达"恰好设置其中一个"的约束，
/// 非法状态在类型层面不可构造。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatScope {
    Room(String),
    Conversation(String),
}

impl ChatScope {
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ChatScope::Room(id) => Some(id),
            ChatScope::Conversation(_) => None,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ChatScope::Room(_) => None,
            ChatScope::Conversation(id) => Some(id),
        }
    }
}

impl std::fmt::Display for ChatScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatScope::Room(id) => write!(f, "room:{}", id),
            ChatScope::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

/// 聊天消息
///
/// wire 格式上 room_id / conversation_id 均为可选字段，
/// 合法消息恰好设置其中一个；`scope()` 对非法组合返回 None。
/// `client_msg_id` 是客户端生成的关联 ID，服务端回显时原样带回，
/// 用于把乐观插入的本地消息替换为权威版本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
}

impl ChatMessage {
    /// 返回消息所属的作用域；room_id 和 conversation_id 不恰好设置一个时返回 None
    pub fn scope(&self) -> Option<ChatScope> {
        match (&self.room_id, &self.conversation_id) {
            (Some(room_id), None) => Some(ChatScope::Room(room_id.clone())),
            (None, Some(conv_id)) => Some(ChatScope::Conversation(conv_id.clone())),
            _ => None,
        }
    }
}

/// 输入提示事件（入站）
///
/// 服务端只按作用域投递，payload 本身可以不带作用域字段；
/// 带了的话连接层会用它做精确路由。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingEvent {
    pub user_id: String,
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// 路由到单个作用域订阅者的入站事件
#[derive(Debug, Clone)]
pub enum ScopedEvent {
    Message(ChatMessage),
    Typing(TypingEvent),
}

// ===================== REST 水合接口的响应结构 =====================

/// 动态（feed）帖子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: String,
}

/// 分页元数据
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationMetadata {
    pub has_next: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub count: i64,
}

/// 游标分页响应包装结构体
#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub metadata: PaginationMetadata,
}

/// 聊天房间
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRoom {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: String,
}

/// 单聊会话
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_one_id: String,
    pub user_two_id: String,
    pub last_message_at: String,
}

/// 用户资料
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    #[serde(default)]
    pub location_state: Option<String>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
    #[serde(default)]
    pub privacy_level: Option<String>,
    pub last_active: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_scope_is_exclusive() {
        let mut msg: ChatMessage = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "sender_id": "u1",
            "content": "hello",
            "room_id": "r1",
            "type": "TEXT",
            "created_at": "2026-01-01T00:00:00",
        }))
        .unwrap();
        assert_eq!(msg.scope(), Some(ChatScope::Room("r1".to_string())));

        msg.conversation_id = Some("c1".to_string());
        assert_eq!(msg.scope(), None);

        msg.room_id = None;
        assert_eq!(msg.scope(), Some(ChatScope::Conversation("c1".to_string())));
    }

    #[test]
    fn message_kind_wire_names_are_uppercase() {
        assert_eq!(serde_json::to_string(&MessageKind::Image).unwrap(), "\"IMAGE\"");
        let kind: MessageKind = serde_json::from_str("\"SYSTEM\"").unwrap();
        assert_eq!(kind, MessageKind::System);
    }

    #[test]
    fn typing_event_without_scope_fields_parses() {
        let ev: TypingEvent =
            serde_json::from_value(serde_json::json!({"user_id": "u2", "is_typing": true}))
                .unwrap();
        assert!(ev.is_typing);
        assert!(ev.room_id.is_none() && ev.conversation_id.is_none());
    }
}
