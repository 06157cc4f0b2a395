//! Slab-backed storage engine
//!
//! Ties the arena, the size-classed slabs, the per-class LRU lists and the
//! concurrent key map into the entry lifecycle: entries are created on
//! insert, promoted on fetch, and destroyed on remove, lazy TTL expiry or
//! LRU eviction.
//!
//! Lock discipline: no map shard guard is ever held while a slab or list
//! lock is taken; entries are copied out of the map first. Eviction composes
//! one list op, one map op and one slab op without an atomic envelope.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::StorageError;
use crate::config::MemoryConfig;
use crate::storage::arena::{Arena, ChunkRef};
use crate::storage::entry::{CacheEntry, calculate_expire_at, current_timestamp};
use crate::storage::lru::LruList;
use crate::storage::slab::{SizeClass, select_class};

/// Global counter for keys removed by lazy expiration
pub static EXPIRED_KEYS_REMOVED: AtomicU64 = AtomicU64::new(0);

/// Global counter for keys evicted under memory pressure
pub static EVICTED_KEYS: AtomicU64 = AtomicU64::new(0);

/// In-memory store over the slab allocator
pub struct SlabStorage {
    arena: Arc<Arena>,
    classes: Vec<SizeClass>,
    lru: Vec<Mutex<LruList>>,
    map: DashMap<Vec<u8>, CacheEntry>,
    sizes: Vec<usize>,
}

impl SlabStorage {
    /// Build the engine from a validated memory configuration
    pub fn new(config: &MemoryConfig) -> Self {
        let arena = Arc::new(Arena::new(config.arena_capacity, config.page_size));

        let classes: Vec<SizeClass> = config
            .size_classes
            .iter()
            .enumerate()
            .map(|(index, &size)| SizeClass::new(index, size, Arc::clone(&arena)))
            .collect();

        let lru = (0..classes.len()).map(|_| Mutex::new(LruList::new())).collect();

        Self {
            arena,
            lru,
            map: DashMap::new(),
            sizes: config.size_classes.clone(),
            classes,
        }
    }

    /// Smallest class whose chunks fit a frame of `frame_len` bytes
    pub fn select_class(&self, frame_len: usize) -> usize {
        select_class(&self.sizes, frame_len)
    }

    /// Chunk size of the given class
    pub fn chunk_size(&self, class: usize) -> usize {
        self.sizes[class]
    }

    /// Largest frame any class can hold
    pub fn max_frame_len(&self) -> usize {
        self.sizes.last().copied().unwrap_or(0)
    }

    /// Allocate a chunk, falling back to LRU eviction when the class is
    /// exhausted.
    ///
    /// A class that never obtained a page has nothing to evict; the arena
    /// error propagates and the caller reports it to the client.
    pub fn allocate_or_evict(&self, class: usize) -> Result<ChunkRef, StorageError> {
        let slab = self.classes.get(class).ok_or(StorageError::InvalidChunk)?;

        match slab.allocate() {
            Ok(chunk) => Ok(chunk),
            Err(err) => {
                if !slab.has_active_page() {
                    return Err(err);
                }
                self.evict_one(class).ok_or(err)
            }
        }
    }

    /// Copy a frame into its chunk, bounds-checked against the chunk size
    pub fn fill_chunk(&self, class: usize, chunk: ChunkRef, frame: &[u8]) -> Result<(), StorageError> {
        let slab = self.classes.get(class).ok_or(StorageError::InvalidChunk)?;
        if frame.len() > slab.chunk_size() {
            return Err(StorageError::InvalidChunk);
        }
        self.arena.fill(chunk, frame)
    }

    /// Return an unused chunk to its class (fetch/remove frames, error paths)
    pub fn release_chunk(&self, class: usize, chunk: ChunkRef) {
        if let Some(slab) = self.classes.get(class) {
            slab.release(chunk);
        }
    }

    /// Store an entry whose frame already sits in `chunk`.
    ///
    /// A duplicate key is replaced: the prior entry leaves the map first,
    /// then its node is unlinked and its chunk released, then the new entry
    /// is published.
    pub fn insert(
        &self,
        key: Vec<u8>,
        class: usize,
        chunk: ChunkRef,
        value_offset: usize,
        value_len: usize,
        ttl: u32,
    ) {
        self.insert_at(key, class, chunk, value_offset, value_len, ttl, current_timestamp());
    }

    fn insert_at(
        &self,
        key: Vec<u8>,
        class: usize,
        chunk: ChunkRef,
        value_offset: usize,
        value_len: usize,
        ttl: u32,
        now: u64,
    ) {
        if let Some((_, old)) = self.map.remove(&key) {
            self.lru[old.class].lock().unlink(old.node);
            self.classes[old.class].release(old.chunk);
        }

        let node = self.lru[class].lock().insert_front(chunk, key.clone());
        let entry = CacheEntry {
            class,
            chunk,
            value_offset,
            value_len,
            expire_at: calculate_expire_at(ttl, now),
            node,
        };
        self.map.insert(key, entry);
    }

    /// Look up a value, promoting it to most recently used.
    ///
    /// An entry whose TTL elapsed is destroyed on discovery and reported as
    /// `Expired`; the next fetch sees `NotFound`.
    pub fn fetch(&self, key: &[u8]) -> Result<Bytes, StorageError> {
        self.fetch_at(key, current_timestamp())
    }

    pub fn fetch_at(&self, key: &[u8], now: u64) -> Result<Bytes, StorageError> {
        let entry = match self.map.get(key) {
            Some(guard) => *guard,
            None => return Err(StorageError::NotFound),
        };

        if entry.is_expired_at(now) {
            // only the caller that wins the removal frees the resources
            if let Some((_, stale)) = self.map.remove_if(key, |_, v| v.node == entry.node) {
                self.lru[stale.class].lock().unlink(stale.node);
                self.classes[stale.class].release(stale.chunk);
                EXPIRED_KEYS_REMOVED.fetch_add(1, Ordering::Relaxed);
                debug!(
                    key = %String::from_utf8_lossy(key),
                    expire_at = stale.expire_at,
                    "lazy expiration removed key"
                );
            }
            return Err(StorageError::Expired);
        }

        self.lru[entry.class].lock().touch(entry.node);
        self.arena.copy_out(entry.chunk, entry.value_offset, entry.value_len)
    }

    /// Destroy an entry; `NotFound` when the key is absent
    pub fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        match self.map.remove(key) {
            Some((_, entry)) => {
                self.lru[entry.class].lock().unlink(entry.node);
                self.classes[entry.class].release(entry.chunk);
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    /// Evict the least recently used entry of one class, returning its chunk
    /// for immediate reuse by the caller that hit the allocation failure.
    pub fn evict_one(&self, class: usize) -> Option<ChunkRef> {
        let (chunk, key) = self.lru[class].lock().evict_tail()?;
        self.map.remove(&key);
        EVICTED_KEYS.fetch_add(1, Ordering::Relaxed);
        debug!(
            key = %String::from_utf8_lossy(&key),
            class,
            "evicted least recently used key"
        );
        Some(chunk)
    }

    /// Number of live entries
    pub fn live_entries(&self) -> usize {
        self.map.len()
    }

    /// Arena bytes handed out so far
    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    /// Usable arena capacity
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Free chunks sitting in one class's free list
    pub fn free_chunks(&self, class: usize) -> usize {
        self.classes[class].free_chunks()
    }
}
