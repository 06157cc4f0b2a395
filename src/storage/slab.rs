//! Size-classed slab sub-allocators
//!
//! Each size class owns a sequence of arena pages and carves them into
//! fixed-size chunks: reclaimed chunks are reused from the free list before
//! the current page is bumped, and a fresh page is requested only when the
//! current one is full.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::StorageError;
use crate::storage::arena::{Arena, ChunkRef, PageRef};

/// State guarded by the class lock
#[derive(Debug, Default)]
struct ClassInner {
    current_page: Option<PageRef>,
    page_offset: usize,
    free_list: Vec<ChunkRef>,
}

/// Sub-allocator for chunks of one fixed size
pub struct SizeClass {
    index: usize,
    chunk_size: usize,
    arena: Arc<Arena>,
    inner: Mutex<ClassInner>,
}

impl SizeClass {
    pub fn new(index: usize, chunk_size: usize, arena: Arc<Arena>) -> Self {
        Self {
            index,
            chunk_size,
            arena,
            inner: Mutex::new(ClassInner::default()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Every chunk this class ever returns has exactly this length
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// How many chunks fit in one page
    pub fn chunks_per_page(&self) -> usize {
        self.arena.page_size() / self.chunk_size
    }

    /// Allocate one chunk.
    ///
    /// Free-list chunks are returned as-is, not zeroed; callers must not
    /// assume fresh memory.
    pub fn allocate(&self) -> Result<ChunkRef, StorageError> {
        let mut inner = self.inner.lock();

        if let Some(chunk) = inner.free_list.pop() {
            return Ok(chunk);
        }

        if let Some(page) = inner.current_page
            && inner.page_offset + self.chunk_size <= self.arena.page_size()
        {
            let chunk = ChunkRef {
                page: page.index(),
                offset: inner.page_offset as u32,
            };
            inner.page_offset += self.chunk_size;
            return Ok(chunk);
        }

        let page = self.arena.allocate_page()?;
        inner.current_page = Some(page);
        inner.page_offset = self.chunk_size;

        Ok(ChunkRef {
            page: page.index(),
            offset: 0,
        })
    }

    /// Return a chunk to the free list.
    ///
    /// The caller guarantees no live entry or eviction node still refers to
    /// it; use after release is undefined.
    pub fn release(&self, chunk: ChunkRef) {
        self.inner.lock().free_list.push(chunk);
    }

    /// Whether this class ever obtained a page from the arena
    pub fn has_active_page(&self) -> bool {
        self.inner.lock().current_page.is_some()
    }

    /// Chunks currently sitting on the free list
    pub fn free_chunks(&self) -> usize {
        self.inner.lock().free_list.len()
    }
}

/// Pick the smallest class whose chunk size fits `data_size`.
///
/// `sizes` is ascending; oversized requests map to the last index (the
/// connection layer rejects those before allocation, see `PayloadTooLarge`).
pub fn select_class(sizes: &[usize], data_size: usize) -> usize {
    let idx = sizes.partition_point(|&size| size < data_size);
    if idx == sizes.len() { sizes.len() - 1 } else { idx }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_arena(pages: usize, page_size: usize) -> Arc<Arena> {
        Arc::new(Arena::new(pages * page_size, page_size))
    }

    #[test]
    fn test_select_smallest_fitting_class() {
        let sizes = crate::config::default_size_classes();

        assert_eq!(select_class(&sizes, 10), 0); // smallest 64 B class
        assert_eq!(select_class(&sizes, 64), 0); // exact fit, leftmost wins
        assert_eq!(select_class(&sizes, 65), 1);
        assert_eq!(select_class(&sizes, 128), 1); // the 128 B class
        assert_eq!(select_class(&sizes, 1024 * 1024), 14);
    }

    #[test]
    fn test_select_oversized_maps_to_largest() {
        let sizes = crate::config::default_size_classes();
        assert_eq!(select_class(&sizes, 1_048_596), sizes.len() - 1);
        assert_eq!(select_class(&sizes, usize::MAX), sizes.len() - 1);
    }

    #[test]
    fn test_bump_allocation_within_a_page() {
        let class = SizeClass::new(0, 64, test_arena(1, 256));

        let a = class.allocate().unwrap();
        let b = class.allocate().unwrap();
        assert_eq!(a, ChunkRef { page: 0, offset: 0 });
        assert_eq!(b, ChunkRef { page: 0, offset: 64 });
        assert_eq!(class.chunks_per_page(), 4);
    }

    #[test]
    fn test_free_list_is_preferred_over_bump() {
        let class = SizeClass::new(0, 64, test_arena(1, 256));

        let a = class.allocate().unwrap();
        let _b = class.allocate().unwrap();

        class.release(a);
        assert_eq!(class.free_chunks(), 1);

        // released chunk comes back before the page is bumped further
        assert_eq!(class.allocate().unwrap(), a);
        assert_eq!(class.free_chunks(), 0);
        assert_eq!(
            class.allocate().unwrap(),
            ChunkRef {
                page: 0,
                offset: 128
            }
        );
    }

    #[test]
    fn test_new_page_requested_when_full() {
        let class = SizeClass::new(0, 128, test_arena(2, 256));

        class.allocate().unwrap();
        class.allocate().unwrap();

        // first page exhausted, third chunk lands on page 1
        let c = class.allocate().unwrap();
        assert_eq!(c, ChunkRef { page: 1, offset: 0 });
    }

    #[test]
    fn test_arena_exhaustion_propagates() {
        let class = SizeClass::new(0, 256, test_arena(1, 256));

        class.allocate().unwrap();
        assert_eq!(class.allocate(), Err(StorageError::OutOfMemory));

        // a release makes allocation possible again
        class.release(ChunkRef { page: 0, offset: 0 });
        assert!(class.allocate().is_ok());
    }

    #[test]
    fn test_has_active_page() {
        let class = SizeClass::new(0, 64, test_arena(1, 256));
        assert!(!class.has_active_page());
        class.allocate().unwrap();
        assert!(class.has_active_page());
    }

    #[test]
    fn test_classes_share_one_arena() {
        let arena = test_arena(2, 256);
        let small = SizeClass::new(0, 64, Arc::clone(&arena));
        let large = SizeClass::new(1, 256, Arc::clone(&arena));

        let a = small.allocate().unwrap();
        let b = large.allocate().unwrap();

        // each class owns a distinct page
        assert_ne!(a.page, b.page);
        assert_eq!(arena.allocated_bytes(), arena.capacity());
        assert_eq!(large.allocate(), Err(StorageError::OutOfMemory));
    }
}
