pub mod api;
pub mod channel;
pub mod feed;
pub mod listener;
pub mod offline;
pub mod serialization;
pub mod socket;
pub mod state;
pub mod syncer;
pub mod types;
pub mod typing;
pub mod virtual_list;

// 重新导出连接与通道相关类型
pub use channel::ChatChannel;
pub use socket::{SocketClient, SocketConfig, Transport};
pub use state::OnlineState;

// 重新导出动态流相关类型
pub use feed::{FeedBuffer, InsertPosition, MAX_FEED_ITEMS};
pub use syncer::{FeedSource, FeedSyncer, FeedSyncerConfig};
