//! Fixed-capacity memory arena
//!
//! The arena pre-allocates its whole capacity as fixed-size pages and hands
//! pages out one at a time. Pages are never returned to the arena; reclaimed
//! chunks go back to their owning size class's free list instead. Chunk
//! bytes are reached through bounds-checked accessors keyed by [`ChunkRef`],
//! never through raw addresses.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::StorageError;

/// Handle to one page issued by the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef(u32);

impl PageRef {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Opaque reference to a chunk's location: page index plus byte offset.
///
/// Valid only while the chunk is not concurrently reused; ownership moves
/// with it (into a cache entry on allocation, back to the free list on
/// release).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    pub page: u32,
    pub offset: u32,
}

/// Pre-allocated page pool with a monotonic allocation cursor
pub struct Arena {
    pages: Vec<RwLock<Box<[u8]>>>,
    page_size: usize,
    next: Mutex<usize>,
}

impl Arena {
    /// Build an arena of `capacity / page_size` zeroed pages.
    ///
    /// Callers validate that at least one page fits (see `Config::validate`).
    pub fn new(capacity: usize, page_size: usize) -> Self {
        let page_count = capacity / page_size;
        let pages = (0..page_count)
            .map(|_| RwLock::new(vec![0u8; page_size].into_boxed_slice()))
            .collect();

        Self {
            pages,
            page_size,
            next: Mutex::new(0),
        }
    }

    /// Hand out the next unused page.
    ///
    /// Concurrent callers observe a consistent, non-overlapping sequence;
    /// the cursor only ever moves forward.
    pub fn allocate_page(&self) -> Result<PageRef, StorageError> {
        let mut next = self.next.lock();
        if *next >= self.pages.len() {
            return Err(StorageError::OutOfMemory);
        }

        let page = PageRef(*next as u32);
        *next += 1;
        Ok(page)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Usable capacity in bytes (whole pages)
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.page_size
    }

    /// Bytes handed out so far
    pub fn allocated_bytes(&self) -> usize {
        *self.next.lock() * self.page_size
    }

    /// Copy `data` into the chunk, starting at its first byte.
    ///
    /// Bounds are checked against the page; the caller guarantees `data`
    /// fits the chunk size of the owning class.
    pub fn fill(&self, chunk: ChunkRef, data: &[u8]) -> Result<(), StorageError> {
        let page = self
            .pages
            .get(chunk.page as usize)
            .ok_or(StorageError::InvalidChunk)?;

        let start = chunk.offset as usize;
        let mut guard = page.write();
        let dst = guard
            .get_mut(start..start + data.len())
            .ok_or(StorageError::InvalidChunk)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes out of the chunk, starting `offset` bytes in
    pub fn copy_out(&self, chunk: ChunkRef, offset: usize, len: usize) -> Result<Bytes, StorageError> {
        let page = self
            .pages
            .get(chunk.page as usize)
            .ok_or(StorageError::InvalidChunk)?;

        let start = chunk.offset as usize + offset;
        let guard = page.read();
        let src = guard.get(start..start + len).ok_or(StorageError::InvalidChunk)?;
        Ok(Bytes::copy_from_slice(src))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_are_sequential_until_exhausted() {
        let arena = Arena::new(4 * 1024, 1024);
        assert_eq!(arena.capacity(), 4 * 1024);

        for expected in 0..4 {
            let page = arena.allocate_page().unwrap();
            assert_eq!(page.index(), expected);
        }

        assert_eq!(arena.allocate_page(), Err(StorageError::OutOfMemory));
        assert_eq!(arena.allocated_bytes(), arena.capacity());
    }

    #[test]
    fn test_capacity_rounds_down_to_whole_pages() {
        let arena = Arena::new(2500, 1024);
        assert_eq!(arena.capacity(), 2048);
        arena.allocate_page().unwrap();
        arena.allocate_page().unwrap();
        assert!(arena.allocate_page().is_err());
    }

    #[test]
    fn test_fill_and_copy_out() {
        let arena = Arena::new(1024, 1024);
        let page = arena.allocate_page().unwrap();
        let chunk = ChunkRef {
            page: page.index(),
            offset: 64,
        };

        arena.fill(chunk, b"hello world").unwrap();

        let out = arena.copy_out(chunk, 6, 5).unwrap();
        assert_eq!(out.as_ref(), b"world");
    }

    #[test]
    fn test_out_of_bounds_access_is_rejected() {
        let arena = Arena::new(1024, 1024);
        arena.allocate_page().unwrap();

        let bad_page = ChunkRef { page: 9, offset: 0 };
        assert_eq!(arena.fill(bad_page, b"x"), Err(StorageError::InvalidChunk));

        let past_end = ChunkRef {
            page: 0,
            offset: 1020,
        };
        assert_eq!(
            arena.fill(past_end, b"too long"),
            Err(StorageError::InvalidChunk)
        );
        assert!(arena.copy_out(past_end, 0, 16).is_err());
    }

    #[test]
    fn test_concurrent_page_allocation_never_overlaps() {
        use std::sync::Arc;

        let arena = Arc::new(Arena::new(64 * 256, 256));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let arena = Arc::clone(&arena);
            handles.push(std::thread::spawn(move || {
                let mut pages = Vec::new();
                while let Ok(page) = arena.allocate_page() {
                    pages.push(page.index());
                }
                pages
            }));
        }

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        // every page issued exactly once, nothing past capacity
        assert_eq!(all.len(), 64);
        assert!(all.windows(2).all(|w| w[0] != w[1]));
        assert_eq!(arena.allocated_bytes(), arena.capacity());
    }
}
