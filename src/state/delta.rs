//! Saved-frame decode and delta-chain reconstruction
//!
//! A delta frame stores the XOR of its raw state against the previous
//! frame's raw state, possibly LZ4-compressed on top. Reconstruction
//! decodes the nearest non-delta base at or below the target frame and
//! XOR-accumulates every delta up to the target. Any hole in the chain
//! is a recoverable error, never a panic: the controller aborts the
//! rollback and resets prediction instead.

use std::fmt;

use crate::input::Frame;
use crate::simd;

use super::codec;
use super::frame::{SavedFrame, SavedPayload};
use super::ring::SavedStateRing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecodeError {
    /// Slot has no payload or a zero uncompressed size
    EmptySlot { frame: Frame },
    /// LZ4 decode failed or produced the wrong number of bytes
    Decompress { frame: Frame },
    /// Delta chain walk hit a frame that is no longer resident
    MissingLink { frame: Frame, missing: Frame },
    /// Delta chain never reached a non-delta base
    NoBase { frame: Frame },
    /// Accumulator shorter than a delta inside the chain
    SizeMismatch {
        frame: Frame,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySlot { frame } => write!(f, "frame {} has no state payload", frame),
            Self::Decompress { frame } => write!(f, "failed to decompress frame {}", frame),
            Self::MissingLink { frame, missing } => write!(
                f,
                "cannot reconstruct frame {}: frame {} left the ring",
                frame, missing
            ),
            Self::NoBase { frame } => {
                write!(f, "cannot reconstruct frame {}: no keyframe below it", frame)
            }
            Self::SizeMismatch {
                frame,
                expected,
                actual,
            } => write!(
                f,
                "frame {} delta is {} bytes but the accumulator holds {}",
                frame, expected, actual
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one slot's payload into `out` (raw bytes for any variant;
/// for a delta slot this is the XOR payload, not the original state).
pub(crate) fn decode_slot(slot: &SavedFrame, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    let payload = slot
        .payload
        .as_ref()
        .filter(|_| slot.uncompressed_size > 0)
        .ok_or(DecodeError::EmptySlot { frame: slot.frame })?;

    out.clear();
    out.resize(slot.uncompressed_size, 0);
    match payload {
        SavedPayload::Compressed(data) => {
            codec::decompress_block(data, out)
                .ok_or(DecodeError::Decompress { frame: slot.frame })?;
        }
        SavedPayload::Raw(buf) | SavedPayload::Delta(buf) => {
            simd::copy(out, buf);
        }
    }
    Ok(())
}

/// Rebuild the raw state of `frame` into `out`.
///
/// Non-delta frames decode directly. Delta frames walk back to the
/// nearest resident non-delta base, then apply each stored delta in
/// order. A non-delta slot inside the walk range (a keyframe that
/// landed mid-chain) replaces the accumulator instead of XORing into it.
pub(crate) fn reconstruct_frame(
    ring: &SavedStateRing,
    frame: Frame,
    out: &mut Vec<u8>,
    scratch: &mut Vec<u8>,
) -> Result<(), DecodeError> {
    let index = ring.find(frame).ok_or(DecodeError::MissingLink {
        frame,
        missing: frame,
    })?;
    if !ring.slot(index).delta {
        return decode_slot(ring.slot(index), out);
    }

    let mut base_frame = frame;
    let base_index = loop {
        if base_frame < 0 {
            return Err(DecodeError::NoBase { frame });
        }
        let idx = ring.find(base_frame).ok_or(DecodeError::MissingLink {
            frame,
            missing: base_frame,
        })?;
        if !ring.slot(idx).delta {
            break idx;
        }
        base_frame -= 1;
    };
    decode_slot(ring.slot(base_index), out)?;

    for link in base_frame + 1..=frame {
        let idx = ring.find(link).ok_or(DecodeError::MissingLink {
            frame,
            missing: link,
        })?;
        let slot = ring.slot(idx);
        if !slot.delta {
            decode_slot(slot, out)?;
            continue;
        }

        decode_slot(slot, scratch)?;
        if out.len() < slot.uncompressed_size {
            return Err(DecodeError::SizeMismatch {
                frame: link,
                expected: slot.uncompressed_size,
                actual: out.len(),
            });
        }
        simd::xor_in_place(
            &mut out[..slot.uncompressed_size],
            &scratch[..slot.uncompressed_size],
        );
    }
    Ok(())
}
