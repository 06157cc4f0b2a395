//! Response builder for the binary protocol
//!
//! Responses are raw bytes written back on the same connection, without a
//! length prefix. Fixed texts match the original wire contract.

use bytes::BytesMut;

/// Response writer backed by a reusable buffer
pub struct ResponseWriter {
    buf: BytesMut,
}

impl ResponseWriter {
    /// Create a new response writer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the internal buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffer, leaving an empty buffer in its place
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Returns true if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Successful set
    pub fn object_inserted(&mut self) {
        self.buf.extend_from_slice(b"object inserted");
    }

    /// Successful delete
    pub fn deleted(&mut self) {
        self.buf.extend_from_slice(b"deleted");
    }

    /// Key absent on get/delete
    pub fn not_found(&mut self) {
        self.buf.extend_from_slice(b"object not found");
    }

    /// Key present but its TTL elapsed
    pub fn time_expired(&mut self) {
        self.buf.extend_from_slice(b"time expire");
    }

    /// Successful get: the stored value bytes, verbatim
    pub fn value(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Allocation or framing failure reported to the client
    pub fn error(&mut self, message: &str) {
        self.buf.extend_from_slice(message.as_bytes());
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_texts() {
        let mut writer = ResponseWriter::new(256);

        writer.object_inserted();
        assert_eq!(writer.take().as_ref(), b"object inserted");

        writer.deleted();
        assert_eq!(writer.take().as_ref(), b"deleted");

        writer.not_found();
        assert_eq!(writer.take().as_ref(), b"object not found");

        writer.time_expired();
        assert_eq!(writer.take().as_ref(), b"time expire");
    }

    #[test]
    fn test_value_is_verbatim() {
        let mut writer = ResponseWriter::new(256);
        writer.value(b"\x00binary\xff");
        assert_eq!(writer.buffer(), b"\x00binary\xff");
    }

    #[test]
    fn test_error_text() {
        let mut writer = ResponseWriter::new(256);
        writer.error("there is not enough space");
        assert_eq!(writer.buffer(), b"there is not enough space");
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut writer = ResponseWriter::new(16);
        writer.deleted();
        assert!(!writer.is_empty());
        writer.clear();
        assert!(writer.is_empty());
        writer.not_found();
        assert_eq!(writer.buffer(), b"object not found");
    }
}
