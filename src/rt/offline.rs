//! 离线缓存：本地 SQLite 持久化的最近帖子窗口
//!
//! 断网时 feed 用这里的快照兜底。存储按帖子 ID 作键，最多保留最近
//! 50 条。写入采用"写新代、翻转标记、删旧代"的快照交换，
//! 并发读取永远看到一份完整的旧快照或新快照，不会读到空/半截集合。
//!
//! 这一层的所有失败都就地吞掉：读失败返回空列表，写失败只记日志，
//! 绝不向调用方抛错——宁可少一份缓存，不能影响在线路径。

use crate::rt::types::FeedPost;
use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// 离线快照最多保留的帖子数（小于内存缓冲的上限 500）
pub const MAX_CACHED_POSTS: usize = 50;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS feed_cache (
        post_id    TEXT    NOT NULL,
        generation INTEGER NOT NULL,
        data       TEXT    NOT NULL,
        cached_at  INTEGER NOT NULL,
        PRIMARY KEY (post_id, generation)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_cache_meta (
        id                 INTEGER PRIMARY KEY CHECK (id = 0),
        current_generation INTEGER NOT NULL
    )
    "#,
    "INSERT OR IGNORE INTO feed_cache_meta (id, current_generation) VALUES (0, 0)",
];

/// 离线帖子存储
///
/// `init()` 幂等，重复调用是空操作；所有读写入口内部都会先确保初始化。
pub struct OfflineStore {
    db_url: String,
    pool: OnceCell<Pool<Sqlite>>,
}

impl OfflineStore {
    /// 创建存储句柄（不建立连接，首次使用时惰性初始化）
    ///
    /// `db_url` 例如 `sqlite://offline.db?mode=rwc`
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            pool: OnceCell::new(),
        }
    }

    /// 打开（必要时创建）本地存储，幂等
    pub async fn init(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn pool(&self) -> Result<&Pool<Sqlite>> {
        self.pool
            .get_or_try_init(|| async {
                info!("[Offline] 🔗 打开离线缓存: {}", self.db_url);
                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect(&self.db_url)
                    .await
                    .context(format!("打开离线缓存数据库失败: {}", self.db_url))?;
                for stmt in SCHEMA {
                    sqlx::query(stmt).execute(&pool).await?;
                }
                Ok(pool)
            })
            .await
    }

    /// 写入一份最新快照（最多取前 50 条）
    ///
    /// 失败被吞掉：只记错误日志，不抛给调用方，也不重试。
    /// 中途失败时代标记不翻转，读取方继续看到上一份完整快照。
    pub async fn save_feed(&self, posts: &[FeedPost]) {
        if let Err(e) = self.save_feed_inner(posts).await {
            error!("[Offline] ❌ 保存离线快照失败: {:#}", e);
        }
    }

    async fn save_feed_inner(&self, posts: &[FeedPost]) -> Result<()> {
        let pool = self.pool().await?;

        let current: i64 =
            sqlx::query_scalar("SELECT current_generation FROM feed_cache_meta WHERE id = 0")
                .fetch_one(pool)
                .await?;
        let next = current + 1;

        let mut written = 0usize;
        let now = chrono::Utc::now().timestamp_millis();
        for post in posts.iter().take(MAX_CACHED_POSTS) {
            sqlx::query(
                "INSERT OR REPLACE INTO feed_cache (post_id, generation, data, cached_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&post.id)
            .bind(next)
            .bind(serde_json::to_string(post)?)
            .bind(now)
            .execute(pool)
            .await?;
            written += 1;
        }

        // 全部写入成功后才翻转当前代标记，再清掉上一代
        sqlx::query("UPDATE feed_cache_meta SET current_generation = ? WHERE id = 0")
            .bind(next)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM feed_cache WHERE generation < ?")
            .bind(next)
            .execute(pool)
            .await?;

        debug!("[Offline] 💾 快照已更新: {} 条（第 {} 代）", written, next);
        Ok(())
    }

    /// 读取当前快照的全部记录
    ///
    /// 任何失败（未初始化、文件损坏、存储不可用）都返回空列表。
    pub async fn get_feed(&self) -> Vec<FeedPost> {
        match self.get_feed_inner().await {
            Ok(posts) => posts,
            Err(e) => {
                warn!("[Offline] ⚠️ 读取离线快照失败，返回空列表: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn get_feed_inner(&self) -> Result<Vec<FeedPost>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT data FROM feed_cache \
             WHERE generation = (SELECT current_generation FROM feed_cache_meta WHERE id = 0) \
             ORDER BY rowid",
        )
        .fetch_all(pool)
        .await?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            posts.push(serde_json::from_str(&data).context("离线快照记录损坏")?);
        }
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: usize) -> FeedPost {
        FeedPost {
            id: format!("p{}", id),
            author_id: "u1".to_string(),
            content: format!("post {}", id),
            image_url: None,
            created_at: "2026-01-01T00:00:00".to_string(),
        }
    }

    fn posts(n: usize) -> Vec<FeedPost> {
        (0..n).map(post).collect()
    }

    fn temp_store(dir: &tempfile::TempDir) -> OfflineStore {
        let path = dir.path().join("offline.db");
        OfflineStore::new(format!("sqlite://{}?mode=rwc", path.display()))
    }

    #[tokio::test]
    async fn get_feed_on_fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        // 从未 init 过也不报错
        assert!(store.get_feed().await.is_empty());
    }

    #[tokio::test]
    async fn get_feed_on_broken_url_is_empty_not_an_error() {
        let store = OfflineStore::new("sqlite:///nonexistent-dir/offline.db?mode=ro");
        assert!(store.get_feed().await.is_empty());
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.init().await.unwrap();
        store.init().await.unwrap();
        store.save_feed(&posts(3)).await;
        assert_eq!(store.get_feed().await.len(), 3);
    }

    #[tokio::test]
    async fn save_feed_caps_at_fifty_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.save_feed(&posts(80)).await;

        let cached = store.get_feed().await;
        assert_eq!(cached.len(), MAX_CACHED_POSTS);
        // 保留的是前 50 条
        assert_eq!(cached[0].id, "p0");
        assert_eq!(cached[49].id, "p49");
    }

    #[tokio::test]
    async fn second_snapshot_fully_replaces_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.save_feed(&posts(10)).await;

        let fresh: Vec<FeedPost> = (100..103).map(post).collect();
        store.save_feed(&fresh).await;

        let cached = store.get_feed().await;
        assert_eq!(cached.len(), 3);
        assert!(cached.iter().all(|p| p.id.starts_with("p10")));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = temp_store(&dir);
            store.save_feed(&posts(5)).await;
        }
        let reopened = temp_store(&dir);
        assert_eq!(reopened.get_feed().await.len(), 5);
    }
}
