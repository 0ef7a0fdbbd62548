//! 动态同步器
//!
//! 把 REST 分页、内存环形缓冲和离线缓存串起来：刷新时网络优先、
//! 失败回退缓存；网络成功的首页快照顺手写入离线缓存；向下翻页
//! 追加到缓冲尾部；发布成功的新动态插到缓冲头部。

use crate::rt::api::{ApiClient, ApiConfig};
use crate::rt::feed::{FeedBuffer, InsertPosition};
use crate::rt::offline::OfflineStore;
use crate::rt::types::FeedPost;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use tracing::{info, warn};

/// 同步器配置
#[derive(Clone, Debug)]
pub struct FeedSyncerConfig {
    pub api_base_url: String,
    pub token: String,
    /// 离线缓存数据库地址，例如 `sqlite:///tmp/feed.db?mode=rwc`
    pub offline_db_url: String,
    /// 每页条数
    pub page_size: usize,
}

impl FeedSyncerConfig {
    pub fn new(api_base_url: String, token: String, offline_db_url: String) -> Self {
        Self {
            api_base_url,
            token,
            offline_db_url,
            page_size: 20,
        }
    }
}

/// 刷新结果的数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Network,
    OfflineCache,
}

/// 动态同步器
pub struct FeedSyncer {
    api: ApiClient,
    buffer: StdMutex<FeedBuffer>,
    offline: OfflineStore,
    next_cursor: StdMutex<Option<String>>,
    has_next: AtomicBool,
    page_size: usize,
}

impl FeedSyncer {
    pub fn new(config: FeedSyncerConfig) -> Result<Self> {
        let api = ApiClient::new(&ApiConfig {
            api_base_url: config.api_base_url,
            token: config.token,
        })?;
        Ok(Self {
            api,
            buffer: StdMutex::new(FeedBuffer::new()),
            offline: OfflineStore::new(config.offline_db_url),
            next_cursor: StdMutex::new(None),
            has_next: AtomicBool::new(false),
            page_size: config.page_size,
        })
    }

    /// 刷新首页：网络优先，失败时回退离线缓存
    ///
    /// 网络成功会整体替换缓冲、重置分页游标，并把首页快照写入
    /// 离线缓存；回退路径上分页不可用（has_next 为 false）。
    pub async fn refresh(&self, feed_type: &str) -> FeedSource {
        match self.api.get_feed_page(feed_type, None, self.page_size).await {
            Ok(page) => {
                info!("[FeedSync] ✅ 网络刷新成功: {} 条", page.items.len());
                self.buffer.lock().unwrap().set_posts(page.items.clone());
                *self.next_cursor.lock().unwrap() = page.metadata.next_cursor;
                self.has_next
                    .store(page.metadata.has_next, Ordering::SeqCst);
                self.offline.save_feed(&page.items).await;
                FeedSource::Network
            }
            Err(e) => {
                warn!("[FeedSync] ⚠️ 网络刷新失败，回退离线缓存: {:#}", e);
                let cached = self.offline.get_feed().await;
                info!("[FeedSync] 离线缓存命中 {} 条", cached.len());
                self.buffer.lock().unwrap().set_posts(cached);
                *self.next_cursor.lock().unwrap() = None;
                self.has_next.store(false, Ordering::SeqCst);
                FeedSource::OfflineCache
            }
        }
    }

    /// 向下翻一页，追加到缓冲尾部；返回是否拉到了新内容
    pub async fn load_more(&self, feed_type: &str) -> Result<bool> {
        if !self.has_next.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let cursor = self.next_cursor.lock().unwrap().clone();
        let page = self
            .api
            .get_feed_page(feed_type, cursor.as_deref(), self.page_size)
            .await?;
        let fetched = page.items.len();
        self.buffer
            .lock()
            .unwrap()
            .add_posts(page.items, InsertPosition::Bottom);
        *self.next_cursor.lock().unwrap() = page.metadata.next_cursor;
        self.has_next
            .store(page.metadata.has_next, Ordering::SeqCst);
        info!("[FeedSync] 翻页追加 {} 条", fetched);
        Ok(fetched > 0)
    }

    /// 发布一条动态；服务端返回的权威版本插到缓冲头部
    pub async fn publish(&self, content: &str, image_url: Option<&str>) -> Result<FeedPost> {
        let post = self.api.create_post(content, image_url).await?;
        self.buffer
            .lock()
            .unwrap()
            .add_posts(vec![post.clone()], InsertPosition::Top);
        Ok(post)
    }

    /// 当前缓冲内容快照
    pub fn posts(&self) -> Vec<FeedPost> {
        self.buffer.lock().unwrap().posts().to_vec()
    }

    pub fn post_count(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn has_next(&self) -> bool {
        self.has_next.load(Ordering::SeqCst)
    }
}
