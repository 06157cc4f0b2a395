//! Dispatcher: a fixed worker pool over one shared request queue
//!
//! Connection handlers enqueue decoded requests; any worker may execute any
//! request for any key. Workers are stateless, the storage engine does its
//! own synchronization. Response writes go through the connection's shared
//! write half; a failed write means the client went away and is logged, not
//! retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::StorageError;
use crate::metrics::Metrics;
use crate::protocol::{Request, ResponseWriter};
use crate::storage::SlabStorage;

/// Write side of one client connection, shared by the handler and workers
#[derive(Clone)]
pub struct ClientHandle {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    peer: SocketAddr,
}

impl ClientHandle {
    pub fn new(writer: OwnedWriteHalf, peer: SocketAddr) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            peer,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write raw response bytes; concurrent responses for one connection
    /// serialize on the writer lock
    pub async fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await
    }
}

/// One queued unit of work
pub struct Job {
    pub request: Request,
    pub client: ClientHandle,
}

/// Handle for enqueueing jobs to the worker pool
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Spawn `workers` tasks draining a shared unbounded queue
    pub fn start(
        workers: usize,
        storage: Arc<SlabStorage>,
        metrics: Arc<Metrics>,
        write_buffer_size: usize,
        cancel_token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        info!("Starting {} dispatcher workers", workers);
        for id in 0..workers {
            let rx = Arc::clone(&rx);
            let storage = Arc::clone(&storage);
            let metrics = Arc::clone(&metrics);
            let cancel = cancel_token.clone();

            tokio::spawn(async move {
                worker_loop(id, rx, storage, metrics, write_buffer_size, cancel).await;
            });
        }

        Self { tx }
    }

    /// Hand a job to the pool; never blocks the producer
    pub fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!("dispatcher queue closed, dropping request");
        }
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    storage: Arc<SlabStorage>,
    metrics: Arc<Metrics>,
    write_buffer_size: usize,
    cancel_token: CancellationToken,
) {
    let mut response = ResponseWriter::new(write_buffer_size);

    loop {
        let job = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = cancel_token.cancelled() => return,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => return,
                },
            }
        };

        let start = Instant::now();
        let op = job.request.name();
        response.clear();
        execute(&storage, &metrics, job.request, &mut response);
        metrics.cmd_latency.observe(start.elapsed().as_secs_f64());
        trace!(worker = id, op, "executed request");

        metrics.bytes_written.inc_by(response.buffer().len() as u64);
        if let Err(e) = job.client.send(response.buffer()).await {
            // connection is gone; queued responses are not retried
            debug!(worker = id, peer = %job.client.peer(), "response write failed: {}", e);
        }
    }
}

/// Execute one decoded request against the storage engine
pub(crate) fn execute(
    storage: &SlabStorage,
    metrics: &Metrics,
    request: Request,
    response: &mut ResponseWriter,
) {
    match request {
        Request::Insert {
            key,
            class,
            chunk,
            value_offset,
            value_len,
            ttl,
        } => {
            metrics.cmd_insert.inc();
            storage.insert(key, class, chunk, value_offset, value_len, ttl);
            response.object_inserted();
        }
        Request::Fetch { key } => {
            metrics.cmd_fetch.inc();
            match storage.fetch(&key) {
                Ok(value) => {
                    metrics.fetch_hits.inc();
                    response.value(&value);
                }
                Err(StorageError::Expired) => {
                    metrics.fetch_misses.inc();
                    response.time_expired();
                }
                Err(_) => {
                    metrics.fetch_misses.inc();
                    response.not_found();
                }
            }
        }
        Request::Remove { key } => {
            metrics.cmd_remove.inc();
            match storage.remove(&key) {
                Ok(()) => response.deleted(),
                Err(_) => response.not_found(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::protocol::{HEADER_SIZE, LENGTH_PREFIX_SIZE, encode_insert};

    fn tiny_storage() -> SlabStorage {
        SlabStorage::new(&MemoryConfig {
            arena_capacity: 256,
            page_size: 256,
            size_classes: vec![64],
        })
    }

    /// Build the Insert variant the connection handler would produce
    fn insert_request(storage: &SlabStorage, key: &[u8], value: &[u8], ttl: u32) -> Request {
        let encoded = encode_insert(key, value, ttl);
        let frame = &encoded[LENGTH_PREFIX_SIZE..];

        let class = storage.select_class(frame.len());
        let chunk = storage.allocate_or_evict(class).unwrap();
        storage.fill_chunk(class, chunk, frame).unwrap();

        Request::Insert {
            key: key.to_vec(),
            class,
            chunk,
            value_offset: HEADER_SIZE + key.len(),
            value_len: value.len(),
            ttl,
        }
    }

    #[test]
    fn test_execute_insert_fetch_remove() {
        let storage = tiny_storage();
        let metrics = Metrics::new();
        let mut response = ResponseWriter::new(256);

        let request = insert_request(&storage, b"k", b"v", 0);
        execute(&storage, &metrics, request, &mut response);
        assert_eq!(response.take().as_ref(), b"object inserted");

        execute(&storage, &metrics, Request::Fetch { key: b"k".to_vec() }, &mut response);
        assert_eq!(response.take().as_ref(), b"v");

        execute(&storage, &metrics, Request::Remove { key: b"k".to_vec() }, &mut response);
        assert_eq!(response.take().as_ref(), b"deleted");

        execute(&storage, &metrics, Request::Fetch { key: b"k".to_vec() }, &mut response);
        assert_eq!(response.take().as_ref(), b"object not found");

        assert_eq!(metrics.cmd_insert.get(), 1);
        assert_eq!(metrics.cmd_fetch.get(), 2);
        assert_eq!(metrics.fetch_hits.get(), 1);
        assert_eq!(metrics.fetch_misses.get(), 1);
    }

    #[test]
    fn test_execute_remove_missing_key() {
        let storage = tiny_storage();
        let metrics = Metrics::new();
        let mut response = ResponseWriter::new(256);

        execute(
            &storage,
            &metrics,
            Request::Remove { key: b"absent".to_vec() },
            &mut response,
        );
        assert_eq!(response.take().as_ref(), b"object not found");
    }
}
