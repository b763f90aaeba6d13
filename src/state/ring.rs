//! Fixed-depth ring of saved frames keyed by frame number

use crate::config::SAVED_STATE_CAPACITY;
use crate::input::Frame;

use super::frame::SavedFrame;

/// Circular store of the last [`SAVED_STATE_CAPACITY`] saved frames.
///
/// Saves write at `head` and advance it; lookups scan linearly (the
/// capacity is tiny). Capacity exceeds the prediction window by two so
/// the base of any delta chain stays resident while every frame in the
/// window can still be reconstructed.
#[derive(Debug)]
pub(crate) struct SavedStateRing {
    frames: Vec<SavedFrame>,
    head: usize,
}

impl SavedStateRing {
    pub fn new() -> Self {
        Self {
            frames: (0..SAVED_STATE_CAPACITY).map(|_| SavedFrame::empty()).collect(),
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn set_head(&mut self, head: usize) {
        debug_assert!(head < self.frames.len());
        self.head = head;
    }

    /// Move `head` one slot forward.
    pub fn advance_head(&mut self) {
        self.head = (self.head + 1) % self.frames.len();
    }

    pub fn slot(&self, index: usize) -> &SavedFrame {
        &self.frames[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut SavedFrame {
        &mut self.frames[index]
    }

    /// The most recently written slot (the one just behind `head`).
    pub fn last_saved(&self) -> &SavedFrame {
        &self.frames[self.last_saved_index()]
    }

    pub fn last_saved_index(&self) -> usize {
        (self.head + self.frames.len() - 1) % self.frames.len()
    }

    /// Locate the slot holding `frame`.
    ///
    /// Returns `None` instead of asserting so callers can surface a load
    /// failure rather than crash mid-rollback.
    pub fn find(&self, frame: Frame) -> Option<usize> {
        self.frames.iter().position(|slot| slot.frame == frame)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedFrame> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SavedFrame> {
        self.frames.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::frame::SavedPayload;
    use super::*;

    fn install(ring: &mut SavedStateRing, frame: Frame) {
        let head = ring.head();
        let slot = ring.slot_mut(head);
        slot.frame = frame;
        slot.uncompressed_size = 4;
        slot.payload = Some(SavedPayload::Raw(Arc::new(vec![0; 4])));
        ring.advance_head();
    }

    #[test]
    fn test_find_resident_frame() {
        let mut ring = SavedStateRing::new();
        for frame in 0..5 {
            install(&mut ring, frame);
        }
        assert_eq!(ring.find(3), Some(3));
        assert_eq!(ring.find(99), None);
    }

    #[test]
    fn test_head_wraps_and_overwrites() {
        let mut ring = SavedStateRing::new();
        let capacity = ring.capacity() as Frame;
        for frame in 0..capacity + 3 {
            // overwrite semantics: the wrapped slot now belongs to the new frame
            let head = ring.head();
            ring.slot_mut(head).clear();
            install(&mut ring, frame);
        }
        // the oldest three frames fell out of the ring
        assert_eq!(ring.find(0), None);
        assert_eq!(ring.find(2), None);
        assert_eq!(ring.find(3), Some(3 % ring.capacity()));
        assert_eq!(ring.find(capacity + 2), Some((capacity as usize + 2) % ring.capacity()));
    }

    #[test]
    fn test_frame_numbers_unique() {
        let mut ring = SavedStateRing::new();
        for frame in 0..ring.capacity() as Frame * 2 {
            let head = ring.head();
            ring.slot_mut(head).clear();
            install(&mut ring, frame);

            let mut resident: Vec<Frame> =
                ring.iter().filter(|s| !s.is_empty()).map(|s| s.frame).collect();
            resident.sort_unstable();
            resident.dedup();
            assert_eq!(
                resident.len(),
                ring.iter().filter(|s| !s.is_empty()).count(),
                "duplicate frame number in ring"
            );
        }
    }

    #[test]
    fn test_last_saved() {
        let mut ring = SavedStateRing::new();
        install(&mut ring, 0);
        install(&mut ring, 1);
        assert_eq!(ring.last_saved().frame, 1);
    }
}
