//! 事件帧的编解码与客户端消息 ID 生成

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Socket 事件帧
///
/// 所有出入站事件统一为 `{"event": <名称>, "data": <payload>}` 的 JSON 帧。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// 编码出站事件帧
pub fn encode_frame(event: &str, data: serde_json::Value) -> Result<String> {
    let frame = EventFrame {
        event: event.to_string(),
        data,
    };
    Ok(serde_json::to_string(&frame)?)
}

/// 解析入站事件帧
pub fn parse_frame(text: &str) -> Result<EventFrame> {
    Ok(serde_json::from_str(text)?)
}

/// 生成客户端消息关联 ID
///
/// 发送时写入消息体，服务端回显时原样带回，本地用它把乐观消息
/// 替换为权威版本（replace-by-correlation-id）。
pub fn generate_client_msg_id(user_id: &str) -> String {
    format!("{}-{}", user_id, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let text = encode_frame("presence", serde_json::json!({"status": "online"})).unwrap();
        let frame = parse_frame(&text).unwrap();
        assert_eq!(frame.event, "presence");
        assert_eq!(frame.data["status"], "online");
    }

    #[test]
    fn frame_without_data_field_parses() {
        let frame = parse_frame(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(frame.event, "ping");
        assert!(frame.data.is_null());
    }

    #[test]
    fn client_msg_ids_are_unique_per_call() {
        let a = generate_client_msg_id("u1");
        let b = generate_client_msg_id("u1");
        assert_ne!(a, b);
        assert!(a.starts_with("u1-"));
    }
}
