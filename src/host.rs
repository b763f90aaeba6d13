//! Host callback contract
//!
//! The core drives a host-provided deterministic simulation through
//! [`SyncHandler`]; the host never calls back into the core from inside
//! a callback. Save hands the host a recycled buffer it may fill (via
//! `mem::take`) or ignore; load hands the host the exact serialized
//! bytes a save produced.

use std::fmt;

use crate::events::SyncEvent;
use crate::input::{Frame, FrameInputs};

/// A serialized simulation state as produced by the host.
#[derive(Debug, Clone)]
pub struct SavedState {
    /// The full serialized state
    pub data: Vec<u8>,
    /// Host-computed checksum over `data`, carried for logging and
    /// sync-test tooling
    pub checksum: u32,
}

/// Failure reported by a host callback. The core treats save/load
/// failures as fatal for the session.
#[derive(Debug, Clone)]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HostError {}

/// Callbacks the host registers with the sync core.
pub trait SyncHandler {
    /// Serialize the entire simulation state as of `frame`.
    ///
    /// `reuse` is a recycled buffer whose capacity usually covers the
    /// previous state size. Implementations either take it
    /// (`std::mem::take`) and fill it, or leave it untouched and return
    /// a fresh allocation; an untouched hint goes back to the pool.
    fn save_state(&mut self, frame: Frame, reuse: &mut Vec<u8>) -> Result<SavedState, HostError>;

    /// Restore the simulation from `state`, exactly the bytes a prior
    /// `save_state` produced for `frame`. Every determinism-affecting
    /// field must be restored.
    fn load_state(&mut self, frame: Frame, state: &[u8]) -> Result<(), HostError>;

    /// Execute one simulation tick with the given synchronized inputs.
    ///
    /// Called by the core only while re-executing frames after a
    /// rollback; the core increments the frame counter and saves state
    /// itself after each call.
    fn advance_frame(&mut self, inputs: &FrameInputs);

    /// Notification sink for controller events; also available by
    /// polling [`crate::SyncCore::poll_event`].
    fn on_event(&mut self, event: &SyncEvent) {
        let _ = event;
    }
}
