//! Per-player input queue with frame delay and prediction tracking
//!
//! Each queue buffers one player's inputs. Confirmed inputs live in a
//! fixed ring; while the authoritative input for a frame has not
//! arrived, the queue hands out a *predicted* input (the bits of the
//! last confirmed one) and remembers where prediction started. When the
//! real input lands it is compared against what was predicted; the
//! first mismatching frame is reported to the controller as the
//! rollback target.

use tracing::{debug, trace};

use crate::input::{Frame, GameInput, NULL_FRAME};

/// Ring depth. Far larger than any prediction window; bounded by the
/// controller discarding confirmed frames as peers acknowledge them.
pub(crate) const INPUT_QUEUE_LENGTH: usize = 128;

#[derive(Debug)]
pub(crate) struct InputQueue {
    /// Queue id, used only in log messages
    id: usize,
    head: usize,
    tail: usize,
    length: usize,
    first_frame: bool,
    /// Frame the owner last handed to `add_input`, pre-delay
    last_user_added_frame: Frame,
    /// Frame of the most recently stored confirmed input
    last_added_frame: Frame,
    /// First frame where a confirmed input contradicted a prediction
    first_incorrect_frame: Frame,
    /// Most recent frame handed out by `input` (confirmed or predicted)
    last_frame_requested: Frame,
    frame_delay: i32,
    inputs: Vec<GameInput>,
    /// Prediction cursor: bits being handed out past the confirmed
    /// tail, with `frame` tracking the next confirmation to verify
    prediction: GameInput,
}

impl InputQueue {
    pub fn new(id: usize, input_size: usize) -> Self {
        Self {
            id,
            head: 0,
            tail: 0,
            length: 0,
            first_frame: true,
            last_user_added_frame: NULL_FRAME,
            last_added_frame: NULL_FRAME,
            first_incorrect_frame: NULL_FRAME,
            last_frame_requested: NULL_FRAME,
            frame_delay: 0,
            inputs: (0..INPUT_QUEUE_LENGTH).map(|_| GameInput::null(input_size)).collect(),
            prediction: GameInput::null(input_size),
        }
    }

    pub fn set_frame_delay(&mut self, delay: i32) {
        self.frame_delay = delay;
    }

    pub fn first_incorrect_frame(&self) -> Frame {
        self.first_incorrect_frame
    }

    pub fn last_confirmed_frame(&self) -> Frame {
        self.last_added_frame
    }

    /// Drop confirmed records with frame numbers below `frame`, keeping
    /// anything at or past the last requested frame (those records are
    /// still needed to verify outstanding predictions).
    pub fn discard_confirmed_frames(&mut self, mut frame: Frame) {
        debug_assert!(frame >= 0);
        if self.last_frame_requested != NULL_FRAME {
            frame = frame.min(self.last_frame_requested + 1);
        }
        trace!(
            "discarding confirmed frames below {} (last added {}, len {}) on queue {}",
            frame,
            self.last_added_frame,
            self.length,
            self.id
        );
        if self.length == 0 {
            return;
        }
        if frame > self.last_added_frame {
            self.tail = self.head;
            self.length = 0;
            return;
        }
        let tail_frame = self.inputs[self.tail].frame;
        if frame <= tail_frame {
            return;
        }
        let offset = (frame - tail_frame) as usize;
        self.tail = (self.tail + offset) % INPUT_QUEUE_LENGTH;
        self.length -= offset;
    }

    /// Forget the prediction state once a rollback has replayed through
    /// `frame`. No mismatch below `frame` may be reported afterwards.
    pub fn reset_prediction(&mut self, frame: Frame) {
        debug_assert!(
            self.first_incorrect_frame == NULL_FRAME || frame <= self.first_incorrect_frame
        );
        trace!("resetting prediction to frame {} on queue {}", frame, self.id);
        self.prediction.frame = NULL_FRAME;
        self.first_incorrect_frame = NULL_FRAME;
        self.last_frame_requested = NULL_FRAME;
    }

    /// The confirmed input for `frame`, or `None` if it never arrived
    /// or already left the ring.
    pub fn confirmed_input(&self, frame: Frame) -> Option<&GameInput> {
        debug_assert!(
            self.first_incorrect_frame == NULL_FRAME || frame < self.first_incorrect_frame
        );
        debug_assert!(frame >= 0);
        let offset = frame as usize % INPUT_QUEUE_LENGTH;
        let record = &self.inputs[offset];
        (record.frame == frame).then_some(record)
    }

    /// The input to simulate `frame` with. Returns the confirmed input
    /// when present; otherwise a prediction stamped to `frame`, with the
    /// second tuple element `false`.
    pub fn input(&mut self, frame: Frame) -> (GameInput, bool) {
        debug_assert_eq!(self.first_incorrect_frame, NULL_FRAME);
        self.last_frame_requested = frame;

        if self.prediction.frame == NULL_FRAME {
            if self.length > 0 {
                debug_assert!(frame >= self.inputs[self.tail].frame);
                let offset = (frame - self.inputs[self.tail].frame) as usize;
                if offset < self.length {
                    let index = (offset + self.tail) % INPUT_QUEUE_LENGTH;
                    debug_assert_eq!(self.inputs[index].frame, frame);
                    return (self.inputs[index].clone(), true);
                }
            }

            // Nothing confirmed for this frame yet; start predicting.
            if frame == 0 || self.last_added_frame == NULL_FRAME {
                trace!("basing new prediction on nothing (queue {})", self.id);
                self.prediction.erase();
                self.prediction.frame = 0;
            } else {
                self.prediction = self.inputs[self.prev_head()].clone();
                self.prediction.frame += 1;
            }
        }

        let mut predicted = self.prediction.clone();
        predicted.frame = frame;
        (predicted, false)
    }

    /// Store an input. Local inputs arrive stamped to the current frame
    /// and get the queue's frame delay applied; remote inputs arrive
    /// with delay already baked in (their queue's delay is 0).
    ///
    /// Returns the frame the input was actually stored at, or
    /// [`NULL_FRAME`] when a shrinking delay made it redundant.
    pub fn add_input(&mut self, input: GameInput) -> Frame {
        trace!("adding input frame {} to queue {}", input.frame, self.id);
        debug_assert!(
            self.last_user_added_frame == NULL_FRAME
                || input.frame == self.last_user_added_frame + 1
        );
        self.last_user_added_frame = input.frame;

        let new_frame = self.advance_queue_head(input.frame);
        if new_frame != NULL_FRAME {
            self.add_delayed_input(input, new_frame);
        }
        new_frame
    }

    /// Apply the frame delay, replicating the last input forward when
    /// the delay grew and dropping the input when it shrank.
    fn advance_queue_head(&mut self, frame: Frame) -> Frame {
        let mut expected_frame = if self.first_frame {
            0
        } else {
            self.inputs[self.prev_head()].frame + 1
        };

        let frame = frame + self.frame_delay;
        if expected_frame > frame {
            // The delay shrank; this input is already covered.
            debug!(
                "dropping input frame {} (expected {}) on queue {}",
                frame, expected_frame, self.id
            );
            return NULL_FRAME;
        }

        while expected_frame < frame {
            // The delay grew; fill the gap with the last input.
            let replicated = self.inputs[self.prev_head()].clone();
            self.add_delayed_input(replicated, expected_frame);
            expected_frame += 1;
        }

        debug_assert!(frame == 0 || frame == self.inputs[self.prev_head()].frame + 1);
        frame
    }

    fn add_delayed_input(&mut self, mut input: GameInput, frame_number: Frame) {
        debug_assert!(
            self.last_added_frame == NULL_FRAME || frame_number == self.last_added_frame + 1
        );

        if self.prediction.frame != NULL_FRAME && frame_number == self.prediction.frame {
            // This input was predicted; verify it.
            if self.first_incorrect_frame == NULL_FRAME && !self.prediction.bits_equal(&input) {
                debug!(
                    "frame {} contradicts prediction on queue {}",
                    frame_number, self.id
                );
                self.first_incorrect_frame = frame_number;
            }

            if self.prediction.frame == self.last_frame_requested
                && self.first_incorrect_frame == NULL_FRAME
            {
                // Confirmations caught up with everything we handed out.
                trace!("prediction caught up on queue {}", self.id);
                self.prediction.frame = NULL_FRAME;
            } else {
                self.prediction.frame += 1;
            }
        }

        input.frame = frame_number;
        self.inputs[self.head] = input;
        self.head = (self.head + 1) % INPUT_QUEUE_LENGTH;
        self.length += 1;
        debug_assert!(self.length <= INPUT_QUEUE_LENGTH);
        self.first_frame = false;
        self.last_added_frame = frame_number;
    }

    fn prev_head(&self) -> usize {
        (self.head + INPUT_QUEUE_LENGTH - 1) % INPUT_QUEUE_LENGTH
    }
}
