/// Cache state for the loading pipeline
///
/// - `entry`: metadata rows and content hashing
/// - `store`: the persistent SQLite thumbnail store
/// - `memory`: the bounded in-memory LRU of decoded bitmaps

pub mod entry;
pub mod memory;
pub mod store;

pub use entry::CacheEntry;
pub use memory::{MemoryCache, MemoryStats};
pub use store::{CacheStore, CachedThumbnail, StoreConfig, StoreStatistics};
