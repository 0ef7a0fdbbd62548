//! 内存中的动态列表缓冲
//!
//! 为 feed UI 维护一份有硬上限的有序帖子序列：新帖/自己的帖子插在顶部，
//! 分页结果追加在底部；超限时从插入方向的对侧裁剪。

use crate::rt::types::FeedPost;
use tracing::debug;

/// 内存缓冲的硬上限
pub const MAX_FEED_ITEMS: usize = 500;

/// 插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// 顶部插入（新帖、自己发布的帖子）
    Top,
    /// 底部插入（分页加载）
    Bottom,
}

/// 动态列表缓冲
///
/// 单线程协作式调度下使用；裁剪用一个重入标志保护，
/// 防止嵌套回调里再次触发裁剪时破坏缓冲。
pub struct FeedBuffer {
    posts: Vec<FeedPost>,
    cap: usize,
    pruning: bool,
}

impl FeedBuffer {
    pub fn new() -> Self {
        Self::with_cap(MAX_FEED_ITEMS)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            posts: Vec::new(),
            cap,
            pruning: false,
        }
    }

    /// 插入一批帖子并按需裁剪
    ///
    /// 顶部插入超限时保留前 cap 条（从尾部丢弃最旧的）；
    /// 底部插入超限时保留后 cap 条（从头部丢弃最旧的）。
    /// 保留项之间的相对顺序不变，插入后长度恒 ≤ cap。
    pub fn add_posts(&mut self, new_posts: Vec<FeedPost>, position: InsertPosition) {
        match position {
            InsertPosition::Top => {
                self.posts.splice(0..0, new_posts);
            }
            InsertPosition::Bottom => {
                self.posts.extend(new_posts);
            }
        }

        if self.posts.len() > self.cap && !self.pruning {
            self.pruning = true;
            let dropped = self.posts.len() - self.cap;
            match position {
                InsertPosition::Top => self.posts.truncate(self.cap),
                InsertPosition::Bottom => {
                    self.posts.drain(..dropped);
                }
            }
            debug!("[Feed] ✂️ 缓冲裁剪 {} 条，当前 {}", dropped, self.posts.len());
            self.pruning = false;
        }
    }

    /// 无条件替换整个缓冲（初始加载 / 离线缓存回退）
    ///
    /// 不做上限裁剪，信任调用方提供的条数 ≤ cap。
    pub fn set_posts(&mut self, posts: Vec<FeedPost>) {
        self.posts = posts;
    }

    pub fn posts(&self) -> &[FeedPost] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

impl Default for FeedBuffer {
    fn default() -> Self {
        Self::new()
    }
}
