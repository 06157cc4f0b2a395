//! Error types for SlabCache

use thiserror::Error;

/// Main error type for SlabCache
#[derive(Error, Debug)]
pub enum SlabCacheError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Wire framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("operation is not supported: opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("frame too short: {0} bytes, header needs 10")]
    FrameTooShort(usize),

    #[error("frame length {prefix} does not match header (10 + {key_len} + {body_len})")]
    LengthMismatch {
        prefix: usize,
        key_len: usize,
        body_len: usize,
    },

    #[error("payload too large: {size} bytes, largest size class is {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Storage engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Arena exhausted and nothing to evict. The message text is written
    /// verbatim to the client on the allocation-failure path.
    #[error("there is not enough space")]
    OutOfMemory,

    #[error("object not found")]
    NotFound,

    #[error("time expire")]
    Expired,

    #[error("chunk reference out of bounds")]
    InvalidChunk,
}

pub type Result<T> = std::result::Result<T, SlabCacheError>;
