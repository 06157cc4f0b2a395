//! Prelude module for common imports.
//!
//! This module re-exports commonly used types and traits for convenience.
//!
//! # Usage
//!
//! ```ignore
//! use slabcache::prelude::*;
//! ```

// Error types
pub use crate::error::{ProtocolError, Result, SlabCacheError, StorageError};

// Configuration
pub use crate::config::{Config, MemoryConfig, MetricsConfig, ServerConfig};

// Storage
pub use crate::storage::{Arena, ChunkRef, SlabStorage};

// Protocol
pub use crate::protocol::{FrameHeader, Request, ResponseWriter};

// Metrics
pub use crate::metrics::Metrics;

// Server
pub use crate::server::Server;

// Common external crates
pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
