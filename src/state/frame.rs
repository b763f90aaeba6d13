//! One slot of the saved-state ring

use std::sync::Arc;

use crate::input::{Frame, NULL_FRAME};

/// Payload bytes shared read-only with the compression worker while a
/// job is in flight. `compress_pending` on the owning slot is the token
/// that keeps the strong count at 1 everywhere else, so
/// [`Arc::try_unwrap`] recovers the `Vec` for the buffer pool on free.
pub(crate) type SharedBuf = Arc<Vec<u8>>;

/// Payload of a saved frame, tagged by ownership and encoding.
///
/// `Raw` buffers came from the host's save callback and go back to the
/// buffer pool on free. `Delta` and `Compressed` buffers are allocated
/// by the core and dropped on free. A compressed *delta* keeps the
/// slot's `delta` flag set while holding a `Compressed` payload.
#[derive(Debug, Clone)]
pub(crate) enum SavedPayload {
    Raw(SharedBuf),
    Delta(SharedBuf),
    Compressed(Vec<u8>),
}

impl SavedPayload {
    pub fn len(&self) -> usize {
        match self {
            SavedPayload::Raw(buf) | SavedPayload::Delta(buf) => buf.len(),
            SavedPayload::Compressed(data) => data.len(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, SavedPayload::Compressed(_))
    }

    /// The shareable buffer, when the payload is still uncompressed.
    pub fn shared(&self) -> Option<&SharedBuf> {
        match self {
            SavedPayload::Raw(buf) | SavedPayload::Delta(buf) => Some(buf),
            SavedPayload::Compressed(_) => None,
        }
    }
}

/// One slot of the saved-state ring.
#[derive(Debug)]
pub(crate) struct SavedFrame {
    /// Frame held by this slot, or [`NULL_FRAME`] when empty
    pub frame: Frame,
    pub payload: Option<SavedPayload>,
    /// Length of the serialized state before delta/compression
    pub uncompressed_size: usize,
    /// Host-computed checksum, carried for logging and sync tests
    pub checksum: u32,
    /// Payload is (or was, before compression) an XOR delta against the
    /// previous frame's raw state
    pub delta: bool,
    /// A compression job referencing this slot is in flight
    pub compress_pending: bool,
}

impl SavedFrame {
    pub fn empty() -> Self {
        Self {
            frame: NULL_FRAME,
            payload: None,
            uncompressed_size: 0,
            checksum: 0,
            delta: false,
            compress_pending: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame == NULL_FRAME
    }

    pub fn is_compressed(&self) -> bool {
        self.payload.as_ref().is_some_and(|p| p.is_compressed())
    }

    /// Stored payload length (compressed length when compressed).
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }

    /// Take the payload and reset the slot to empty.
    ///
    /// Callers must have drained any pending compression first; see
    /// `SyncCore::release_slot`.
    pub fn clear(&mut self) -> Option<SavedPayload> {
        debug_assert!(!self.compress_pending);
        self.frame = NULL_FRAME;
        self.uncompressed_size = 0;
        self.checksum = 0;
        self.delta = false;
        self.compress_pending = false;
        self.payload.take()
    }
}
