pub mod rt;

// 重新导出常用类型和函数，方便外部使用
pub use rt::{
    api::{ApiClient, ApiConfig},
    channel::ChatChannel,
    feed::{FeedBuffer, InsertPosition, MAX_FEED_ITEMS},
    listener::{ConnectionListener, MessageListener},
    offline::{OfflineStore, MAX_CACHED_POSTS},
    socket::{SocketClient, SocketConfig, Transport},
    state::OnlineState,
    syncer::{FeedSource, FeedSyncer, FeedSyncerConfig},
    types::{ChatMessage, ChatScope, FeedPost, MessageKind, TypingEvent},
    typing::TypingCoordinator,
    virtual_list::{LoadMoreGuard, VirtualListConfig, VirtualSlice},
};
