//! Storage layer: arena, slabs, eviction lists and the entry store

mod arena;
mod entry;
mod lru;
mod slab;
mod store;

pub use arena::{Arena, ChunkRef, PageRef};
pub use entry::{CacheEntry, calculate_expire_at, current_timestamp};
pub use lru::{LruList, NodeRef};
pub use slab::{SizeClass, select_class};
pub use store::{EVICTED_KEYS, EXPIRED_KEYS_REMOVED, SlabStorage};
