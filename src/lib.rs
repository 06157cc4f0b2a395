//! # SlabCache
//!
//! Memcached-style in-memory cache server with slab allocation and
//! per-class LRU eviction.
//!
//! All values live inside one fixed-capacity arena carved into pages; each
//! size class bump-allocates fixed-size chunks from its pages and reclaims
//! them through a free list. When a class runs dry, its least recently used
//! entry is evicted and the chunk reused on the spot.
//!
//! ## Features
//!
//! - Binary length-prefixed TCP protocol (set / get / delete)
//! - Fixed-capacity slab arena, no per-entry heap allocation for values
//! - Per-size-class LRU eviction under memory pressure
//! - TTL support with lazy expiration
//! - Prometheus metrics endpoint
//! - Health check endpoints for load balancer integration
//!
//! ## Example
//!
//! ```ignore
//! use slabcache::config::Config;
//! use slabcache::storage::SlabStorage;
//! use slabcache::server::Server;
//!
//! let config = Config::from_env()?;
//! let storage = SlabStorage::new(&config.memory);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    frames    ┌───────────────────────────────────────┐
//! │  client  │─────────────▶│ SlabCache                             │
//! │ (binary  │              │  ├─ connection handlers (framing)     │
//! │  proto)  │◀─────────────│  ├─ dispatcher worker pool            │
//! └──────────┘   responses  │  └─ slab store (arena + LRU + map)    │
//!                           └───────────────────────────────────────┘
//! ```

// Modules
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use error::{ProtocolError, Result, SlabCacheError, StorageError};
