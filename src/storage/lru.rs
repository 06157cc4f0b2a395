//! Per-size-class LRU eviction list
//!
//! A doubly linked list over a slotted node table: head is most recently
//! used, tail is the eviction victim. Slots are reused through a free list;
//! each reuse bumps the slot's generation, so a `NodeRef` held by a racing
//! caller goes stale instead of corrupting the list.

use crate::storage::arena::ChunkRef;

/// Handle to a list node: slot index plus the generation it was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    index: u32,
    r#gen: u32,
}

#[derive(Debug)]
struct Node {
    prev: Option<u32>,
    next: Option<u32>,
    r#gen: u32,
    live: bool,
    chunk: ChunkRef,
    key: Vec<u8>,
}

/// Recency list for one size class; callers wrap it in a mutex
#[derive(Debug, Default)]
pub struct LruList {
    nodes: Vec<Node>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl LruList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Link a new node at the head (most recently used)
    pub fn insert_front(&mut self, chunk: ChunkRef, key: Vec<u8>) -> NodeRef {
        let index = match self.free.pop() {
            Some(index) => {
                let node = &mut self.nodes[index as usize];
                node.r#gen = node.r#gen.wrapping_add(1);
                node.live = true;
                node.prev = None;
                node.next = self.head;
                node.chunk = chunk;
                node.key = key;
                index
            }
            None => {
                self.nodes.push(Node {
                    prev: None,
                    next: self.head,
                    r#gen: 0,
                    live: true,
                    chunk,
                    key,
                });
                (self.nodes.len() - 1) as u32
            }
        };

        match self.head {
            Some(old_head) => self.nodes[old_head as usize].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;

        NodeRef {
            index,
            r#gen: self.nodes[index as usize].r#gen,
        }
    }

    /// Move a node to the head; no-op if already there or the ref is stale
    pub fn touch(&mut self, node: NodeRef) {
        if !self.is_current(node) || self.head == Some(node.index) {
            return;
        }

        self.detach(node.index);

        let inner = &mut self.nodes[node.index as usize];
        inner.prev = None;
        inner.next = self.head;

        match self.head {
            Some(old_head) => self.nodes[old_head as usize].prev = Some(node.index),
            None => self.tail = Some(node.index),
        }
        self.head = Some(node.index);
    }

    /// Remove a node and retire its slot; returns false on a stale ref
    pub fn unlink(&mut self, node: NodeRef) -> bool {
        if !self.is_current(node) {
            return false;
        }

        self.detach(node.index);
        self.retire(node.index);
        true
    }

    /// Unlink and return the least recently used node's chunk and key
    pub fn evict_tail(&mut self) -> Option<(ChunkRef, Vec<u8>)> {
        let index = self.tail?;
        self.detach(index);
        Some(self.retire(index))
    }

    fn is_current(&self, node: NodeRef) -> bool {
        self.nodes
            .get(node.index as usize)
            .is_some_and(|n| n.live && n.r#gen == node.r#gen)
    }

    /// Patch neighbours around a node, fixing head/tail at the ends
    fn detach(&mut self, index: u32) {
        let (prev, next) = {
            let node = &self.nodes[index as usize];
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n as usize].prev = prev,
            None => self.tail = prev,
        }
    }

    fn retire(&mut self, index: u32) -> (ChunkRef, Vec<u8>) {
        let node = &mut self.nodes[index as usize];
        node.live = false;
        node.prev = None;
        node.next = None;

        let chunk = node.chunk;
        let key = std::mem::take(&mut node.key);

        self.free.push(index);
        self.len -= 1;
        (chunk, key)
    }

    /// Keys from head to tail; test helper for ordering assertions
    #[cfg(test)]
    fn keys_front_to_back(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = &self.nodes[index as usize];
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u32) -> ChunkRef {
        ChunkRef { page: 0, offset }
    }

    #[test]
    fn test_insert_front_orders_most_recent_first() {
        let mut list = LruList::new();

        list.insert_front(chunk(0), b"a".to_vec());
        list.insert_front(chunk(64), b"b".to_vec());
        list.insert_front(chunk(128), b"c".to_vec());

        assert_eq!(list.len(), 3);
        assert_eq!(
            list.keys_front_to_back(),
            vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
    }

    #[test]
    fn test_evict_tail_returns_oldest() {
        let mut list = LruList::new();

        list.insert_front(chunk(0), b"a".to_vec());
        list.insert_front(chunk(64), b"b".to_vec());

        let (freed, key) = list.evict_tail().unwrap();
        assert_eq!(freed, chunk(0));
        assert_eq!(key, b"a");
        assert_eq!(list.len(), 1);

        let (freed, key) = list.evict_tail().unwrap();
        assert_eq!(freed, chunk(64));
        assert_eq!(key, b"b");
        assert!(list.evict_tail().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn test_touch_promotes_to_head() {
        let mut list = LruList::new();

        let a = list.insert_front(chunk(0), b"a".to_vec());
        list.insert_front(chunk(64), b"b".to_vec());
        list.insert_front(chunk(128), b"c".to_vec());

        list.touch(a);

        assert_eq!(
            list.keys_front_to_back(),
            vec![b"a".to_vec(), b"c".to_vec(), b"b".to_vec()]
        );

        // oldest is now b, not a
        let (_, key) = list.evict_tail().unwrap();
        assert_eq!(key, b"b");
    }

    #[test]
    fn test_touch_head_is_noop() {
        let mut list = LruList::new();

        list.insert_front(chunk(0), b"a".to_vec());
        let b = list.insert_front(chunk(64), b"b".to_vec());

        list.touch(b);
        assert_eq!(
            list.keys_front_to_back(),
            vec![b"b".to_vec(), b"a".to_vec()]
        );
    }

    #[test]
    fn test_unlink_middle_patches_neighbours() {
        let mut list = LruList::new();

        list.insert_front(chunk(0), b"a".to_vec());
        let b = list.insert_front(chunk(64), b"b".to_vec());
        list.insert_front(chunk(128), b"c".to_vec());

        assert!(list.unlink(b));
        assert_eq!(
            list.keys_front_to_back(),
            vec![b"c".to_vec(), b"a".to_vec()]
        );

        // unlinking the tail moves the tail back
        let (_, key) = list.evict_tail().unwrap();
        assert_eq!(key, b"a");
        let (_, key) = list.evict_tail().unwrap();
        assert_eq!(key, b"c");
    }

    #[test]
    fn test_stale_ref_is_ignored_after_slot_reuse() {
        let mut list = LruList::new();

        let a = list.insert_front(chunk(0), b"a".to_vec());
        assert!(list.unlink(a));

        // slot reused for a different key, generation bumped
        let b = list.insert_front(chunk(64), b"b".to_vec());
        assert_eq!(list.len(), 1);

        assert!(!list.unlink(a));
        list.touch(a);
        assert_eq!(list.len(), 1);

        assert!(list.unlink(b));
        assert!(list.is_empty());
    }

    #[test]
    fn test_double_unlink_is_safe() {
        let mut list = LruList::new();
        let a = list.insert_front(chunk(0), b"a".to_vec());

        assert!(list.unlink(a));
        assert!(!list.unlink(a));
        assert!(list.is_empty());
    }
}
