//! Save, load, and compression plumbing for the sync controller
//!
//! The save path: drain finished compressions, free the slot being
//! overwritten (waiting out any in-flight job on it), run the host's
//! save with a pooled reuse hint, delta-encode against the previous
//! raw state unless this is a keyframe, then compress (on the worker
//! when possible, inline otherwise). The load path reverses it:
//! reconstruct or decompress the slot, hand the raw bytes to the host,
//! and refresh the delta baseline.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::compress::{CompressJob, CompressResult};
use crate::config::KEYFRAME_INTERVAL;
use crate::host::{HostError, SyncHandler};
use crate::input::Frame;
use crate::simd;
use crate::state::{
    codec, decode_slot, reconstruct_frame, DecodeError, SavedPayload, SharedBuf,
};

use super::{SyncCore, SyncError};

/// Why a frame could not be loaded. Only the `Host` variant is fatal;
/// everything else aborts the rollback recoverably.
#[derive(Debug)]
pub(crate) enum LoadFrameError {
    /// No resident slot holds the frame
    NotSaved(Frame),
    /// The slot (or its delta chain) failed to decode
    Decode(DecodeError),
    /// The host rejected the restored bytes
    Host { frame: Frame, source: HostError },
}

impl fmt::Display for LoadFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSaved(frame) => write!(f, "frame {} is not resident in the ring", frame),
            Self::Decode(err) => err.fmt(f),
            Self::Host { frame, source } => {
                write!(f, "host load failed at frame {}: {}", frame, source)
            }
        }
    }
}

impl std::error::Error for LoadFrameError {}

impl SyncCore {
    /// Save the current frame into the ring.
    pub(crate) fn save_current_frame<H: SyncHandler>(
        &mut self,
        handler: &mut H,
    ) -> Result<(), SyncError> {
        self.process_compression_results();

        // Overwrite an existing slot for this frame number if one is
        // resident (double save at frame 0), otherwise write at head.
        let index = self
            .savedstate
            .find(self.framecount)
            .unwrap_or_else(|| self.savedstate.head());
        self.release_slot(index);

        let mut reuse = self.pool.acquire().unwrap_or_default();
        let hint_capacity = reuse.capacity();
        let saved = match handler.save_state(self.framecount, &mut reuse) {
            Ok(saved) => saved,
            Err(source) => {
                error!("host save failed at frame {}: {}", self.framecount, source);
                return Err(SyncError::SaveFailed {
                    frame: self.framecount,
                    source,
                });
            }
        };
        if hint_capacity > 0 && reuse.capacity() > 0 {
            // Host ignored the hint and allocated its own buffer.
            trace!("save ignored {}-byte reuse hint", hint_capacity);
            self.pool.release(reuse);
        }

        let data = saved.data;
        let size = data.len();
        if size == 0 {
            error!("host save produced an empty state at frame {}", self.framecount);
            return Err(SyncError::SaveFailed {
                frame: self.framecount,
                source: HostError::new("save_state produced an empty state"),
            });
        }
        self.pool.note_size(size);

        let keyframe = self.framecount % KEYFRAME_INTERVAL == 0;
        let can_delta = self.last_state_valid
            && self.last_state.len() == size
            && self.last_state_frame == self.framecount - 1;
        let use_delta = can_delta && !keyframe;

        let (payload, input) = if use_delta {
            let mut delta = vec![0u8; size];
            simd::xor_buffers(&mut delta, &data, &self.last_state);
            self.update_last_state(&data, self.framecount);
            // The raw state is no longer needed; recycle it.
            self.pool.release(data);
            let delta = Arc::new(delta);
            (SavedPayload::Delta(Arc::clone(&delta)), delta)
        } else {
            self.update_last_state(&data, self.framecount);
            let raw = Arc::new(data);
            (SavedPayload::Raw(Arc::clone(&raw)), raw)
        };
        {
            let slot = self.savedstate.slot_mut(index);
            slot.frame = self.framecount;
            slot.uncompressed_size = size;
            slot.checksum = saved.checksum;
            slot.delta = use_delta;
            slot.compress_pending = false;
            slot.payload = Some(payload);
        }

        if !self.queue_compression(index, Arc::clone(&input)) {
            self.compress_inline(index, input);
        }

        let slot = self.savedstate.slot(index);
        if slot.delta {
            self.delta_stats.record_delta(slot.payload_len(), slot.uncompressed_size);
        } else {
            self.delta_stats.record_keyframe();
        }
        debug!(
            "saved frame {} (raw {} stored {} checksum {:08x})",
            slot.frame,
            slot.uncompressed_size,
            slot.payload_len(),
            slot.checksum
        );

        self.savedstate.set_head((index + 1) % self.savedstate.capacity());
        Ok(())
    }

    /// Restore the simulation to `frame` from the ring.
    pub(crate) fn load_frame<H: SyncHandler>(
        &mut self,
        handler: &mut H,
        frame: Frame,
    ) -> Result<(), LoadFrameError> {
        if frame == self.framecount {
            trace!("load of current frame {} is a no-op", frame);
            return Ok(());
        }

        let index = self
            .savedstate
            .find(frame)
            .ok_or(LoadFrameError::NotSaved(frame))?;
        let (is_delta, size, slot_frame, checksum) = {
            let slot = self.savedstate.slot(index);
            (slot.delta, slot.uncompressed_size, slot.frame, slot.checksum)
        };
        debug!(
            "loading frame {} (size {} checksum {:08x})",
            slot_frame, size, checksum
        );
        if size == 0 || self.savedstate.slot(index).payload_len() == 0 {
            return Err(LoadFrameError::Decode(DecodeError::EmptySlot { frame }));
        }

        if is_delta {
            reconstruct_frame(
                &self.savedstate,
                frame,
                &mut self.load_scratch,
                &mut self.delta_scratch,
            )
            .map_err(LoadFrameError::Decode)?;
            handler
                .load_state(frame, &self.load_scratch[..size])
                .map_err(|source| LoadFrameError::Host { frame, source })?;
            self.last_state.clear();
            self.last_state.resize(size, 0);
            simd::copy(&mut self.last_state, &self.load_scratch[..size]);
        } else if self.savedstate.slot(index).is_compressed() {
            decode_slot(self.savedstate.slot(index), &mut self.load_scratch)
                .map_err(LoadFrameError::Decode)?;
            handler
                .load_state(frame, &self.load_scratch[..size])
                .map_err(|source| LoadFrameError::Host { frame, source })?;
            self.last_state.clear();
            self.last_state.resize(size, 0);
            simd::copy(&mut self.last_state, &self.load_scratch[..size]);
        } else {
            // Raw slot: hand the payload to the host directly.
            let raw = self
                .savedstate
                .slot(index)
                .payload
                .as_ref()
                .and_then(|p| p.shared())
                .cloned()
                .ok_or(LoadFrameError::Decode(DecodeError::EmptySlot { frame }))?;
            handler
                .load_state(frame, raw.as_slice())
                .map_err(|source| LoadFrameError::Host { frame, source })?;
            self.last_state.clear();
            self.last_state.resize(size, 0);
            simd::copy(&mut self.last_state, raw.as_slice());
        }
        self.last_state_frame = slot_frame;
        self.last_state_valid = true;

        // Point the ring just past the loaded slot, as if this frame had
        // only just been saved.
        self.framecount = slot_frame;
        self.savedstate.set_head((index + 1) % self.savedstate.capacity());
        Ok(())
    }

    fn update_last_state(&mut self, state: &[u8], frame: Frame) {
        self.last_state.clear();
        self.last_state.resize(state.len(), 0);
        simd::copy(&mut self.last_state, state);
        self.last_state_frame = frame;
        self.last_state_valid = true;
    }

    /// Free a slot's payload, routing raw buffers back to the pool.
    /// Waits out any in-flight compression so the worker never reads a
    /// recycled buffer.
    pub(crate) fn release_slot(&mut self, index: usize) {
        if self.savedstate.slot(index).compress_pending {
            self.wait_for_slot(index);
        }
        let payload = self.savedstate.slot_mut(index).clear();
        if let Some(SavedPayload::Raw(buf)) = payload {
            if let Ok(vec) = Arc::try_unwrap(buf) {
                self.pool.release(vec);
            }
        }
    }

    /// Block until the slot's in-flight compression has been applied or
    /// dropped; afterwards the worker holds no reference to the slot's
    /// payload.
    pub(crate) fn wait_for_slot(&mut self, index: usize) {
        loop {
            self.process_compression_results();
            if !self.savedstate.slot(index).compress_pending {
                return;
            }
            let Some(worker) = self.compress.as_ref() else {
                self.savedstate.slot_mut(index).compress_pending = false;
                return;
            };
            if !worker.wait_for_result() {
                // Worker is shutting down; the teardown drain owns the
                // remaining records.
                self.savedstate.slot_mut(index).compress_pending = false;
                return;
            }
        }
    }

    /// Drain every finished compression into its slot.
    pub(crate) fn process_compression_results(&mut self) {
        while let Some(result) = self.compress.as_ref().and_then(|w| w.pop_result()) {
            self.apply_compression_result(result);
        }
    }

    /// Install a finished compression if the slot still holds the exact
    /// payload the job was queued for and the output is a strict win.
    pub(crate) fn apply_compression_result(&mut self, result: CompressResult) {
        let CompressResult {
            slot: index,
            frame,
            input,
            output,
        } = result;

        let slot = self.savedstate.slot_mut(index);
        slot.compress_pending = false;

        if slot.frame != frame {
            trace!("dropping stale compression result for frame {}", frame);
            return;
        }
        let same_buffer = slot
            .payload
            .as_ref()
            .and_then(|p| p.shared())
            .is_some_and(|buf| Arc::ptr_eq(buf, &input));
        if !same_buffer {
            // Slot re-saved or already compressed by the inline path.
            return;
        }
        if output.is_empty() || output.len() >= slot.uncompressed_size {
            trace!(
                "compression rejected for frame {} ({} vs {} bytes)",
                frame,
                output.len(),
                slot.uncompressed_size
            );
            return;
        }

        let old = slot.payload.replace(SavedPayload::Compressed(output));
        drop(input);
        if let Some(SavedPayload::Raw(buf)) = old {
            if let Ok(vec) = Arc::try_unwrap(buf) {
                self.pool.release(vec);
            }
        }
    }

    /// Hand a payload to the worker. Refused when async compression is
    /// off, the worker is gone, the slot already has a job in flight,
    /// or the queues are full.
    pub(crate) fn queue_compression(&mut self, index: usize, input: SharedBuf) -> bool {
        let Some(worker) = self.compress.as_ref() else {
            return false;
        };
        if input.is_empty() || self.savedstate.slot(index).compress_pending {
            return false;
        }
        let job = CompressJob {
            slot: index,
            frame: self.savedstate.slot(index).frame,
            input,
            accel: self.config.lz4_accel,
        };
        if worker.try_enqueue(job) {
            self.savedstate.slot_mut(index).compress_pending = true;
            true
        } else {
            false
        }
    }

    /// Compress on the simulation thread, keeping the uncompressed
    /// payload when there is no size win.
    pub(crate) fn compress_inline(&mut self, index: usize, input: SharedBuf) {
        if input.is_empty() {
            return;
        }
        let compressed = codec::compress_block(&input, self.config.lz4_accel);
        drop(input);

        let slot = self.savedstate.slot_mut(index);
        if compressed.is_empty() || compressed.len() >= slot.uncompressed_size {
            trace!(
                "inline compression rejected for frame {} ({} vs {} bytes)",
                slot.frame,
                compressed.len(),
                slot.uncompressed_size
            );
            return;
        }
        let old = slot.payload.replace(SavedPayload::Compressed(compressed));
        if let Some(SavedPayload::Raw(buf)) = old {
            if let Ok(vec) = Arc::try_unwrap(buf) {
                self.pool.release(vec);
            }
        }
    }

    /// Stop the worker and clear `compress_pending` on every slot its
    /// leftover jobs and results still reference.
    pub(crate) fn stop_compression_worker(&mut self) {
        let Some(worker) = self.compress.take() else {
            return;
        };
        let leftovers = worker.shutdown();
        for job in &leftovers.jobs {
            self.savedstate.slot_mut(job.slot).compress_pending = false;
        }
        for result in &leftovers.results {
            self.savedstate.slot_mut(result.slot).compress_pending = false;
        }
        // Leftover output buffers free when `leftovers` drops here.
    }
}
