//! The sync controller: frame counter, prediction barrier, rollback
//!
//! Owns the saved-state ring, the per-player input queues, the buffer
//! pool, and the compression worker. The host advances its simulation
//! one frame at a time, feeding local/remote inputs in and pulling
//! synchronized inputs out; when a confirmed input contradicts an
//! earlier prediction the controller rolls the simulation back to the
//! first incorrect frame and replays forward through the host.

mod save;
#[cfg(test)]
mod tests;

use std::fmt;

use tracing::{debug, trace, warn};

use crate::compress::CompressWorker;
use crate::config::{ResolvedConfig, SyncConfig};
use crate::events::{EventQueue, SyncEvent};
use crate::host::{HostError, SyncHandler};
use crate::input::{Frame, FrameInputs, GameInput, NULL_FRAME};
use crate::input_queue::InputQueue;
use crate::state::{DeltaStats, SavedStateRing, StateBufferPool, StateStats};

pub(crate) use save::LoadFrameError;

/// Fatal session failure: a host callback refused a save or load. The
/// simulation can no longer be kept in sync after one of these.
#[derive(Debug)]
pub enum SyncError {
    SaveFailed { frame: Frame, source: HostError },
    LoadFailed { frame: Frame, source: HostError },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaveFailed { frame, source } => {
                write!(f, "host failed to save state at frame {}: {}", frame, source)
            }
            Self::LoadFailed { frame, source } => {
                write!(f, "host failed to load state at frame {}: {}", frame, source)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SaveFailed { source, .. } | Self::LoadFailed { source, .. } => Some(source),
        }
    }
}

/// Per-player connection view, maintained by the transport layer.
///
/// A disconnected player keeps contributing confirmed inputs up to
/// `last_frame`; past it the core zero-fills their slot and raises the
/// disconnect bit in [`FrameInputs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectStatus {
    pub disconnected: bool,
    /// Last frame for which this player's inputs are authoritative
    pub last_frame: Frame,
}

impl Default for ConnectStatus {
    fn default() -> Self {
        Self {
            disconnected: false,
            last_frame: NULL_FRAME,
        }
    }
}

/// Rollback synchronization core.
pub struct SyncCore {
    pub(crate) config: ResolvedConfig,

    pub(crate) framecount: Frame,
    pub(crate) last_confirmed_frame: Frame,
    pub(crate) rollingback: bool,

    pub(crate) savedstate: SavedStateRing,
    pub(crate) pool: StateBufferPool,
    pub(crate) input_queues: Vec<InputQueue>,
    pub(crate) connect_status: Vec<ConnectStatus>,

    /// Raw bytes of the most recently saved (or loaded) state; deltas
    /// are computed against this copy
    pub(crate) last_state: Vec<u8>,
    pub(crate) last_state_frame: Frame,
    pub(crate) last_state_valid: bool,
    /// Decode target for load/reconstruct
    pub(crate) load_scratch: Vec<u8>,
    /// Per-link decode scratch during chain reconstruction
    pub(crate) delta_scratch: Vec<u8>,

    pub(crate) delta_stats: DeltaStats,
    pub(crate) events: EventQueue,
    pub(crate) compress: Option<CompressWorker>,
}

impl SyncCore {
    /// Create a core for the given session configuration, resolving
    /// environment overrides and starting the compression worker when
    /// async compression is enabled.
    pub fn new(config: &SyncConfig) -> Self {
        let resolved = config.resolve();
        debug!(
            "sync core: {} players, input {} bytes, prediction {} frames, lz4 accel {}, async {}",
            resolved.num_players,
            resolved.input_size,
            resolved.max_prediction_frames,
            resolved.lz4_accel,
            resolved.async_compress
        );

        let compress = if resolved.async_compress {
            CompressWorker::spawn()
        } else {
            None
        };

        let input_queues = (0..resolved.num_players)
            .map(|id| InputQueue::new(id, resolved.input_size))
            .collect();

        Self {
            framecount: 0,
            last_confirmed_frame: NULL_FRAME,
            rollingback: false,
            savedstate: SavedStateRing::new(),
            pool: StateBufferPool::new(),
            input_queues,
            connect_status: vec![ConnectStatus::default(); resolved.num_players],
            last_state: Vec::new(),
            last_state_frame: NULL_FRAME,
            last_state_valid: false,
            load_scratch: Vec::new(),
            delta_scratch: Vec::new(),
            delta_stats: DeltaStats::default(),
            events: EventQueue::new(),
            compress,
            config: resolved,
        }
    }

    pub fn frame_count(&self) -> Frame {
        self.framecount
    }

    pub fn in_rollback(&self) -> bool {
        self.rollingback
    }

    pub fn num_players(&self) -> usize {
        self.config.num_players
    }

    pub fn input_size(&self) -> usize {
        self.config.input_size
    }

    pub fn max_prediction_frames(&self) -> usize {
        self.config.max_prediction_frames
    }

    pub fn set_frame_delay(&mut self, player: usize, delay: i32) {
        self.input_queues[player].set_frame_delay(delay);
    }

    /// Record the newest frame every peer has confirmed; confirmed
    /// inputs below it are discarded from all queues.
    pub fn set_last_confirmed_frame(&mut self, frame: Frame) {
        self.last_confirmed_frame = frame;
        if frame > 0 {
            for queue in &mut self.input_queues {
                queue.discard_confirmed_frames(frame);
            }
        }
    }

    pub fn set_connect_status(&mut self, player: usize, status: ConnectStatus) {
        self.connect_status[player] = status;
    }

    pub fn connect_status(&self, player: usize) -> ConnectStatus {
        self.connect_status[player]
    }

    /// Offer a local input for the current frame.
    ///
    /// Returns `Ok(false)` without touching any queue when the
    /// simulation has outrun its prediction budget; the caller should
    /// stall until remote confirmations catch up. The very first input
    /// also captures the initial frame-0 save.
    pub fn add_local_input<H: SyncHandler>(
        &mut self,
        handler: &mut H,
        player: usize,
        input: GameInput,
    ) -> Result<bool, SyncError> {
        let frames_behind = self.framecount - self.last_confirmed_frame;
        if self.framecount >= self.config.max_prediction_frames as Frame
            && frames_behind >= self.config.max_prediction_frames as Frame
        {
            warn!("rejecting local input: reached prediction barrier");
            return Ok(false);
        }

        if self.framecount == 0 {
            self.save_current_frame(handler)?;
        }

        trace!(
            "sending undelayed local frame {} to queue {}",
            self.framecount,
            player
        );
        let mut input = input;
        input.frame = self.framecount;
        self.input_queues[player].add_input(input);

        Ok(true)
    }

    /// Accept an authoritative remote input; the queue decides whether
    /// it confirms or contradicts an earlier prediction.
    pub fn add_remote_input(&mut self, player: usize, input: GameInput) {
        let bits = GameInput::new(input.frame, input.bits());
        let stamped = self.input_queues[player].add_input(input);
        if stamped != NULL_FRAME {
            let mut confirmed = bits;
            confirmed.frame = stamped;
            self.events.push(SyncEvent::ConfirmedInput { input: confirmed });
        }
    }

    /// Assemble the inputs to simulate the current frame with: the
    /// confirmed input per player when available, a prediction
    /// otherwise, zeros plus a disconnect bit for players disconnected
    /// past their last authoritative frame.
    ///
    /// Call [`check_simulation`](Self::check_simulation) before this
    /// each frame so detected mispredictions are rolled back first.
    pub fn synchronize_inputs(&mut self, output: &mut FrameInputs) {
        debug_assert_eq!(output.num_players(), self.config.num_players);
        output.reset_for(self.framecount);
        for player in 0..self.config.num_players {
            let status = self.connect_status[player];
            if status.disconnected && self.framecount > status.last_frame {
                output.mark_disconnected(player);
            } else {
                let (input, _) = self.input_queues[player].input(self.framecount);
                output.set_player(player, input.bits());
            }
        }
    }

    /// Like [`synchronize_inputs`](Self::synchronize_inputs) but only
    /// confirmed inputs for an arbitrary frame; players without a
    /// confirmed record contribute zeros.
    pub fn get_confirmed_inputs(&self, frame: Frame, output: &mut FrameInputs) {
        debug_assert_eq!(output.num_players(), self.config.num_players);
        output.reset_for(frame);
        for player in 0..self.config.num_players {
            let status = self.connect_status[player];
            if status.disconnected && frame > status.last_frame {
                output.mark_disconnected(player);
            } else if let Some(input) = self.input_queues[player].confirmed_input(frame) {
                output.set_player(player, input.bits());
            }
        }
    }

    /// Advance the frame counter and save the resulting state (the
    /// outcome of executing the previous frame, relabeled as
    /// state-at-the-new-frame).
    pub fn increment_frame<H: SyncHandler>(&mut self, handler: &mut H) -> Result<(), SyncError> {
        self.framecount += 1;
        self.save_current_frame(handler)
    }

    /// Compare every queue's predictions against arrived confirmations
    /// and roll back to the earliest incorrect frame if any.
    pub fn check_simulation<H: SyncHandler>(&mut self, handler: &mut H) -> Result<(), SyncError> {
        let mut first_incorrect = NULL_FRAME;
        for (player, queue) in self.input_queues.iter().enumerate() {
            let incorrect = queue.first_incorrect_frame();
            if incorrect != NULL_FRAME
                && (first_incorrect == NULL_FRAME || incorrect < first_incorrect)
            {
                trace!("queue {} reports incorrect frame {}", player, incorrect);
                first_incorrect = incorrect;
            }
        }

        if first_incorrect == NULL_FRAME {
            trace!("prediction ok, proceeding");
            return Ok(());
        }
        self.adjust_simulation(handler, first_incorrect)
    }

    /// Roll back to `seek_to` and replay forward to the current frame.
    ///
    /// A failed load (slot evicted, chain truncated, decode mismatch)
    /// aborts the rollback recoverably: prediction resets at the target
    /// and no frames are re-executed. Host callback failures are fatal.
    pub fn adjust_simulation<H: SyncHandler>(
        &mut self,
        handler: &mut H,
        seek_to: Frame,
    ) -> Result<(), SyncError> {
        let return_to = self.framecount;
        let count = self.framecount - seek_to;

        debug!("rolling back {} frames to frame {}", count, seek_to);
        self.rollingback = true;

        match self.load_frame(handler, seek_to) {
            Ok(()) => {}
            Err(LoadFrameError::Host { frame, source }) => {
                self.rollingback = false;
                return Err(SyncError::LoadFailed { frame, source });
            }
            Err(err) => {
                warn!(
                    "failed to load frame {} for rollback ({}); clearing prediction errors",
                    seek_to, err
                );
                self.reset_prediction(seek_to);
                self.rollingback = false;
                return Ok(());
            }
        }
        debug_assert_eq!(self.framecount, seek_to);

        // Replay: re-synchronize inputs (predictions now resolve to the
        // confirmed records), tick the host, save.
        self.reset_prediction(self.framecount);
        let mut inputs = FrameInputs::new(self.config.num_players, self.config.input_size);
        for _ in 0..count {
            self.synchronize_inputs(&mut inputs);
            handler.advance_frame(&inputs);
            self.increment_frame(handler)?;
        }
        debug_assert_eq!(self.framecount, return_to);

        self.rollingback = false;
        debug!("rollback complete at frame {}", self.framecount);
        Ok(())
    }

    /// Pull the next controller event, if any.
    pub fn poll_event(&mut self) -> Option<SyncEvent> {
        self.events.pop()
    }

    /// Drain queued events into the handler's `on_event` sink.
    pub fn dispatch_events<H: SyncHandler>(&mut self, handler: &mut H) {
        while let Some(event) = self.events.pop() {
            handler.on_event(&event);
        }
    }

    /// Snapshot of delta/compression statistics.
    pub fn state_stats(&self) -> StateStats {
        let queue = self
            .compress
            .as_ref()
            .map(|worker| worker.queue_stats())
            .unwrap_or_default();
        let pending = self
            .savedstate
            .iter()
            .filter(|slot| slot.compress_pending)
            .count();

        StateStats {
            delta_frames: self.delta_stats.delta_frames(),
            keyframes: self.delta_stats.keyframes(),
            delta_ratio_last: self.delta_stats.ratio_last(),
            delta_ratio_avg: self.delta_stats.ratio_avg(),
            delta_ratio_max: self.delta_stats.ratio_max(),
            compress_job_queue_len: queue.job_queue_len,
            compress_result_queue_len: queue.result_queue_len,
            compress_pending_count: pending,
            compress_job_queue_max: queue.job_queue_max,
            compress_result_queue_max: queue.result_queue_max,
        }
    }

    fn reset_prediction(&mut self, frame: Frame) {
        for queue in &mut self.input_queues {
            queue.reset_prediction(frame);
        }
    }
}

impl Drop for SyncCore {
    fn drop(&mut self) {
        self.stop_compression_worker();
        self.pool.clear();
    }
}
