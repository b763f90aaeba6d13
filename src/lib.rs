//! Rollback synchronization core for peer-to-peer lockstep simulations
//!
//! A deterministic simulation advances every frame using *predicted*
//! remote inputs; when the authoritative inputs arrive and contradict a
//! prediction, the core rolls the simulation back to the first
//! incorrect frame and replays forward, all inside a few milliseconds
//! of frame budget.
//!
//! # Architecture
//!
//! - [`SyncCore`] - Frame counter, prediction barrier, rollback control
//! - [`SyncHandler`] - Callback contract the host simulation implements
//! - Saved-state ring: delta-encoded, LZ4-compressed per-frame
//!   snapshots with periodic keyframes and a recycled buffer pool
//! - Compression worker: a background thread that hides LZ4 cost off
//!   the simulation thread
//! - Per-player input queues that report the first frame where a
//!   prediction went wrong
//!
//! Transport, time synchronization, and disconnect policy live outside
//! this crate; the core consumes their decisions through
//! [`ConnectStatus`] and [`SyncCore::set_last_confirmed_frame`].

mod compress;
mod config;
mod events;
mod host;
mod input;
mod input_queue;
mod simd;
mod state;
mod sync;

#[cfg(test)]
mod integration;
#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{
    SyncConfig, DEFAULT_LZ4_ACCEL, EVENT_QUEUE_DEPTH, KEYFRAME_INTERVAL, MAX_PREDICTION_FRAMES,
    SAVED_STATE_CAPACITY,
};
pub use events::SyncEvent;
pub use host::{HostError, SavedState, SyncHandler};
pub use input::{Frame, FrameInputs, GameInput, InputBits, NULL_FRAME};
pub use state::StateStats;
pub use sync::{ConnectStatus, SyncCore, SyncError};
