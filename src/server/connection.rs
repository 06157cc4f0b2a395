//! Connection handling: the per-connection framing state machine
//!
//! Each connection loops through length prefix → frame body → dispatch.
//! Allocation failures and oversized payloads are reported to the client and
//! the unread body is drained so the stream stays in sync; a length prefix
//! that disagrees with the decoded header closes the connection instead,
//! because framing can no longer be trusted.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use super::Server;
use super::dispatcher::{ClientHandle, Dispatcher, Job};
use crate::ProtocolError;
use crate::protocol::{
    FrameHeader, HEADER_SIZE, LENGTH_PREFIX_SIZE, OP_FETCH, OP_INSERT, OP_REMOVE, Request,
    decode_length,
};

/// Handle a single client connection
pub async fn handle(
    server: Arc<Server>,
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    _permit: OwnedSemaphorePermit,
) -> anyhow::Result<()> {
    let peer = stream.peer_addr()?;
    let (mut reader, writer) = stream.into_split();
    let client = ClientHandle::new(writer, peer);
    let mut frame_buf = BytesMut::with_capacity(server.config.read_buffer_size);

    loop {
        // AwaitingLengthPrefix
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        tokio::select! {
            _ = server.cancel_token.cancelled() => break,
            result = reader.read_exact(&mut prefix) => {
                if let Err(e) = result {
                    if e.kind() != std::io::ErrorKind::UnexpectedEof {
                        debug!(peer = %peer, "read error: {}", e);
                    }
                    break;
                }
            }
        }

        let frame_len = decode_length(prefix);
        server
            .metrics
            .bytes_read
            .inc_by((LENGTH_PREFIX_SIZE + frame_len) as u64);

        if frame_len < HEADER_SIZE {
            server.metrics.protocol_errors.inc();
            warn!(peer = %peer, frame_len, "frame shorter than header, closing connection");
            break;
        }

        if frame_len > server.storage.max_frame_len() {
            server.metrics.protocol_errors.inc();
            let err = ProtocolError::PayloadTooLarge {
                size: frame_len,
                max: server.storage.max_frame_len(),
            };
            warn!(peer = %peer, "{}", err);
            if client.send(err.to_string().as_bytes()).await.is_err() {
                break;
            }
            if drain(&mut reader, frame_len).await.is_err() {
                break;
            }
            continue;
        }

        // AwaitingFrameBody: the chunk is reserved before the body arrives,
        // evicting from this class's LRU if it is exhausted
        let class = server.storage.select_class(frame_len);
        let chunk = match server.storage.allocate_or_evict(class) {
            Ok(chunk) => chunk,
            Err(e) => {
                server.metrics.oom_errors.inc();
                warn!(peer = %peer, class, "allocation failed: {}", e);
                if client.send(e.to_string().as_bytes()).await.is_err() {
                    break;
                }
                if drain(&mut reader, frame_len).await.is_err() {
                    break;
                }
                continue;
            }
        };

        frame_buf.resize(frame_len, 0);
        if let Err(e) = reader.read_exact(&mut frame_buf).await {
            server.storage.release_chunk(class, chunk);
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                debug!(peer = %peer, "read error: {}", e);
            }
            break;
        }

        // Dispatching: decode once, workers never re-parse
        let header = match FrameHeader::decode(&frame_buf) {
            Ok(header) => header,
            Err(e) => {
                server.storage.release_chunk(class, chunk);
                server.metrics.protocol_errors.inc();
                warn!(peer = %peer, "{}", e);
                break;
            }
        };

        if header.frame_len() != frame_len {
            server.storage.release_chunk(class, chunk);
            server.metrics.protocol_errors.inc();
            let err = ProtocolError::LengthMismatch {
                prefix: frame_len,
                key_len: header.key_len as usize,
                body_len: header.body_len as usize,
            };
            warn!(peer = %peer, "{}, closing connection", err);
            break;
        }

        let key = frame_buf[HEADER_SIZE..header.value_offset()].to_vec();

        let request = match header.opcode {
            OP_INSERT => {
                if let Err(e) = server.storage.fill_chunk(class, chunk, &frame_buf) {
                    server.storage.release_chunk(class, chunk);
                    warn!(peer = %peer, "chunk fill failed: {}", e);
                    break;
                }
                Request::Insert {
                    key,
                    class,
                    chunk,
                    value_offset: header.value_offset(),
                    value_len: header.body_len as usize,
                    ttl: header.ttl,
                }
            }
            // fetch/remove never look at the frame again; give the chunk back
            OP_FETCH => {
                server.storage.release_chunk(class, chunk);
                Request::Fetch { key }
            }
            OP_REMOVE => {
                server.storage.release_chunk(class, chunk);
                Request::Remove { key }
            }
            op => {
                server.storage.release_chunk(class, chunk);
                server.metrics.protocol_errors.inc();
                warn!(peer = %peer, "{}", ProtocolError::UnknownOpcode(op));
                continue;
            }
        };

        dispatcher.dispatch(Job {
            request,
            client: client.clone(),
        });
    }

    server.metrics.active_connections.dec();
    Ok(())
}

/// Read and discard `remaining` bytes so the stream stays frame-aligned
async fn drain<R: AsyncRead + Unpin>(reader: &mut R, mut remaining: usize) -> std::io::Result<()> {
    let mut scratch = [0u8; 8192];
    while remaining > 0 {
        let take = remaining.min(scratch.len());
        let n = reader.read(&mut scratch[..take]).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        remaining -= n;
    }
    Ok(())
}
