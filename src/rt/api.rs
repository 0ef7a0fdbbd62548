//! REST 水合接口
//!
//! 实时通道只增量投递，初始数据（动态分页、房间/会话列表、用户资料）
//! 由这里的 HTTP 客户端拉取。与 socket 层不同，这里的失败是真实的
//! 错误并向上传播，由调用方决定是否回退离线缓存。

use crate::rt::types::{ChatRoom, Conversation, FeedPost, PaginatedResponse, UserProfile};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

/// REST 接口配置
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// 服务端地址，例如 `http://127.0.0.1:8000`
    pub api_base_url: String,
    /// 认证 token（作为 Bearer 头附加到每个请求）
    pub token: String,
}

/// REST 客户端
pub struct ApiClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.token))
                .context("token 含非法字符")?,
        );
        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, operation: &str) -> Result<T> {
        debug!("[API] 📡 {} 请求: {}", operation, url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("{}请求发送失败", operation))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("[API] {}请求失败，HTTP状态: {}, 响应: {}", operation, status, body);
            return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body));
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("{}响应解析失败", operation))
    }

    /// 拉取一页动态
    ///
    /// `cursor` 为 None 拉首页，否则从上一页 metadata 带回的游标续拉。
    pub async fn get_feed_page(
        &self,
        feed_type: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<PaginatedResponse<FeedPost>> {
        let mut url = format!(
            "{}/api/feed/?feed_type={}&limit={}",
            self.api_base_url, feed_type, limit
        );
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(cursor);
        }
        self.get_json(&url, "动态分页").await
    }

    /// 发布一条动态，返回服务端权威版本
    pub async fn create_post(&self, content: &str, image_url: Option<&str>) -> Result<FeedPost> {
        let url = format!("{}/api/feed/", self.api_base_url);
        info!("[API] 📡 发布动态");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "content": content,
                "image_url": image_url,
            }))
            .send()
            .await
            .context("发布动态请求发送失败")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("[API] 发布动态失败，HTTP状态: {}, 响应: {}", status, body);
            return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body));
        }
        response.json::<FeedPost>().await.context("发布动态响应解析失败")
    }

    /// 当前用户加入的群聊房间列表
    pub async fn get_rooms(&self) -> Result<PaginatedResponse<ChatRoom>> {
        let url = format!("{}/api/chat/rooms", self.api_base_url);
        self.get_json(&url, "房间列表").await
    }

    /// 当前用户的私信会话列表
    pub async fn get_conversations(&self) -> Result<PaginatedResponse<Conversation>> {
        let url = format!("{}/api/chat/conversations", self.api_base_url);
        self.get_json(&url, "会话列表").await
    }

    /// 拉取用户资料
    pub async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile> {
        let url = format!("{}/api/profiles/{}", self.api_base_url, user_id);
        self.get_json(&url, "用户资料").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_client() -> ApiClient {
        ApiClient::new(&ApiConfig {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            token: "test-token".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let api = ApiClient::new(&ApiConfig {
            api_base_url: "http://127.0.0.1:8000/".to_string(),
            token: "t".to_string(),
        })
        .unwrap();
        assert_eq!(api.api_base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn illegal_token_is_rejected() {
        let result = ApiClient::new(&ApiConfig {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            token: "bad\ntoken".to_string(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_returns_error() {
        let api = ApiClient::new(&ApiConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            token: "t".to_string(),
        })
        .unwrap();
        assert!(api.get_feed_page("all", None, 20).await.is_err());
    }

    /// 需要本地服务端，默认跳过：
    /// cargo test feed_pagination_live -- --ignored --nocapture
    #[tokio::test]
    #[ignore]
    async fn feed_pagination_live() {
        let api = local_client();
        let page = api.get_feed_page("all", None, 20).await.unwrap();
        println!(
            "首页 {} 条, has_next={}",
            page.items.len(),
            page.metadata.has_next
        );
        if page.metadata.has_next {
            let next = api
                .get_feed_page("all", page.metadata.next_cursor.as_deref(), 20)
                .await
                .unwrap();
            println!("次页 {} 条", next.items.len());
        }
    }
}
