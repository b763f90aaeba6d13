//! Frame numbers and per-frame input records
//!
//! Inputs are opaque byte strings of a fixed per-session width. The core
//! never interprets the bits; it only compares them to detect prediction
//! errors and copies them into the synchronized per-frame layout.

use smallvec::SmallVec;

/// Frame number. Monotonically non-decreasing, starting at 0.
pub type Frame = i32;

/// Sentinel frame meaning "none".
pub const NULL_FRAME: Frame = -1;

/// Inline storage for input payloads (covers typical pad state without
/// heap allocation; larger input sizes spill automatically)
pub type InputBits = SmallVec<[u8; 16]>;

/// One player's input for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInput {
    /// Frame this input applies to, or [`NULL_FRAME`]
    pub frame: Frame,
    bits: InputBits,
}

impl GameInput {
    /// Create an input from raw bits, stamped to `frame`.
    pub fn new(frame: Frame, bits: &[u8]) -> Self {
        Self {
            frame,
            bits: SmallVec::from_slice(bits),
        }
    }

    /// The null input: no frame, zeroed bits of the given width.
    pub fn null(input_size: usize) -> Self {
        Self {
            frame: NULL_FRAME,
            bits: smallvec::smallvec![0; input_size],
        }
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn size(&self) -> usize {
        self.bits.len()
    }

    pub fn is_null_frame(&self) -> bool {
        self.frame == NULL_FRAME
    }

    /// Zero the payload in place, keeping the width.
    pub fn erase(&mut self) {
        self.bits.fill(0);
    }

    /// Bit-for-bit payload comparison, ignoring the frame stamp.
    pub(crate) fn bits_equal(&self, other: &GameInput) -> bool {
        self.bits == other.bits
    }
}

/// Synchronized inputs for one frame: one `input_size`-byte record per
/// player plus a bitmask of players disconnected at this frame.
///
/// Reused across frames by the caller; [`crate::SyncCore::synchronize_inputs`]
/// rewrites it in place.
#[derive(Debug, Clone)]
pub struct FrameInputs {
    bits: Vec<u8>,
    input_size: usize,
    num_players: usize,
    frame: Frame,
    disconnect_flags: u32,
}

impl FrameInputs {
    pub fn new(num_players: usize, input_size: usize) -> Self {
        Self {
            bits: vec![0; num_players * input_size],
            input_size,
            num_players,
            frame: NULL_FRAME,
            disconnect_flags: 0,
        }
    }

    /// The frame these inputs were assembled for.
    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Input bits for `player`.
    pub fn player(&self, player: usize) -> &[u8] {
        let start = player * self.input_size;
        &self.bits[start..start + self.input_size]
    }

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Mask with bit `p` set when player `p` is disconnected at this frame.
    pub fn disconnect_flags(&self) -> u32 {
        self.disconnect_flags
    }

    pub fn is_disconnected(&self, player: usize) -> bool {
        self.disconnect_flags & (1 << player) != 0
    }

    pub(crate) fn reset_for(&mut self, frame: Frame) {
        self.bits.fill(0);
        self.disconnect_flags = 0;
        self.frame = frame;
    }

    pub(crate) fn set_player(&mut self, player: usize, bits: &[u8]) {
        let start = player * self.input_size;
        self.bits[start..start + self.input_size].copy_from_slice(bits);
    }

    pub(crate) fn mark_disconnected(&mut self, player: usize) {
        self.disconnect_flags |= 1 << player;
    }
}
