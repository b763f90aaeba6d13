//! Recycled state buffers for the host save callback
//!
//! Serialized states run to hundreds of kilobytes for memory-snapshot
//! hosts; allocating one per simulation frame shows up immediately in
//! the frame budget. The pool keeps up to one buffer per ring slot and
//! hands the best fit back to the save path as a reuse hint.

use crate::config::SAVED_STATE_CAPACITY;

#[derive(Debug)]
pub(crate) struct StateBufferPool {
    buffers: Vec<Vec<u8>>,
    /// Running max of observed serialized state sizes; acquire only
    /// returns buffers that can hold this much without regrowing.
    size_hint: usize,
}

impl StateBufferPool {
    pub fn new() -> Self {
        Self {
            buffers: Vec::with_capacity(SAVED_STATE_CAPACITY),
            size_hint: 0,
        }
    }

    /// Record an observed serialized state size.
    pub fn note_size(&mut self, size: usize) {
        if size > self.size_hint {
            self.size_hint = size;
        }
    }

    pub fn size_hint(&self) -> usize {
        self.size_hint
    }

    /// Take the smallest buffer whose capacity covers the size hint.
    ///
    /// Returns `None` until a size has been observed or when no pooled
    /// buffer is large enough; the caller then lets the host allocate.
    pub fn acquire(&mut self) -> Option<Vec<u8>> {
        if self.size_hint == 0 || self.buffers.is_empty() {
            return None;
        }
        let best = self
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, buf)| buf.capacity() >= self.size_hint)
            .min_by_key(|(_, buf)| buf.capacity())
            .map(|(i, _)| i)?;
        let mut buf = self.buffers.swap_remove(best);
        buf.clear();
        Some(buf)
    }

    /// Return a raw state buffer. Dropped on the floor once the pool
    /// holds a full ring's worth.
    pub fn release(&mut self, buf: Vec<u8>) {
        if buf.capacity() == 0 {
            return;
        }
        if self.buffers.len() >= SAVED_STATE_CAPACITY {
            return;
        }
        self.buffers.push(buf);
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Drop every pooled buffer and forget the size hint. Used on
    /// teardown and re-init.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.size_hint = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_requires_size_hint() {
        let mut pool = StateBufferPool::new();
        pool.release(Vec::with_capacity(1024));
        assert!(pool.acquire().is_none());

        pool.note_size(512);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_acquire_picks_smallest_sufficient() {
        let mut pool = StateBufferPool::new();
        pool.note_size(100);
        pool.release(Vec::with_capacity(4096));
        pool.release(Vec::with_capacity(128));
        pool.release(Vec::with_capacity(64)); // too small, stays

        let buf = pool.acquire().unwrap();
        assert_eq!(buf.capacity(), 128);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_release_bounded_by_ring_capacity() {
        let mut pool = StateBufferPool::new();
        for _ in 0..SAVED_STATE_CAPACITY + 5 {
            pool.release(Vec::with_capacity(16));
        }
        assert_eq!(pool.len(), SAVED_STATE_CAPACITY);
    }

    #[test]
    fn test_acquired_buffer_is_cleared() {
        let mut pool = StateBufferPool::new();
        pool.note_size(4);
        pool.release(vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let buf = pool.acquire().unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 4);
    }

    #[test]
    fn test_size_hint_is_running_max() {
        let mut pool = StateBufferPool::new();
        pool.note_size(100);
        pool.note_size(50);
        assert_eq!(pool.size_hint(), 100);
        pool.note_size(200);
        assert_eq!(pool.size_hint(), 200);
    }
}
