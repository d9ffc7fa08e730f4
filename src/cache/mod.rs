pub mod duplicate_cache;

pub use duplicate_cache::{CacheStats, MemoryDuplicateStore, RedisDuplicateStore};
