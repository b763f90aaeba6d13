//! Saved-state storage: ring, payload variants, delta pipeline, pool
//!
//! One slot per recent frame, delta-encoded against the previous frame
//! with periodic keyframes, LZ4 on top, and a recycled-buffer pool so
//! steady-state saving allocates nothing.

pub(crate) mod codec;
pub(crate) mod delta;
mod frame;
mod pool;
mod ring;
mod stats;

pub(crate) use delta::{decode_slot, reconstruct_frame, DecodeError};
pub(crate) use frame::{SavedFrame, SavedPayload, SharedBuf};
pub(crate) use pool::StateBufferPool;
pub(crate) use ring::SavedStateRing;
pub(crate) use stats::DeltaStats;

pub use stats::StateStats;
