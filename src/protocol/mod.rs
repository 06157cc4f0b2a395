//! Binary wire protocol implementation

pub mod command;
pub mod frame;
pub mod response;

pub use command::Request;
pub use frame::{
    FrameHeader, HEADER_SIZE, LENGTH_PREFIX_SIZE, OP_FETCH, OP_INSERT, OP_REMOVE, decode_length,
    encode_fetch, encode_insert, encode_remove,
};
pub use response::ResponseWriter;
