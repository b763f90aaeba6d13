//! Shared helpers for controller and integration tests

use xxhash_rust::xxh32::xxh32;

use crate::events::SyncEvent;
use crate::host::{HostError, SavedState, SyncHandler};
use crate::input::{Frame, FrameInputs, GameInput, NULL_FRAME};
use crate::sync::SyncCore;

/// Deterministic toy simulation: a byte blob stirred by the
/// synchronized inputs each tick. Identical input sequences always
/// produce identical state, so save/load correctness is observable by
/// comparing blobs.
pub(crate) struct TestGame {
    pub state: Vec<u8>,
    pub saves: usize,
    pub loads: usize,
    pub advances: usize,
    pub last_loaded_frame: Frame,
    pub events: Vec<SyncEvent>,
    /// Allocate fresh buffers instead of filling the reuse hint
    pub ignore_reuse_hint: bool,
    pub fail_saves: bool,
    pub fail_loads: bool,
}

impl TestGame {
    pub fn new(state_size: usize) -> Self {
        Self {
            state: (0..state_size).map(|i| (i % 251) as u8).collect(),
            saves: 0,
            loads: 0,
            advances: 0,
            last_loaded_frame: NULL_FRAME,
            events: Vec::new(),
            ignore_reuse_hint: false,
            fail_saves: false,
            fail_loads: false,
        }
    }

    /// A blob that LZ4 cannot shrink (xorshift noise).
    pub fn with_incompressible_state(state_size: usize) -> Self {
        let mut game = Self::new(state_size);
        let mut x: u32 = 0x9e37_79b9;
        for byte in &mut game.state {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            *byte = (x >> 24) as u8;
        }
        game
    }

    pub fn checksum(&self) -> u32 {
        xxh32(&self.state, 0)
    }
}

impl SyncHandler for TestGame {
    fn save_state(&mut self, _frame: Frame, reuse: &mut Vec<u8>) -> Result<SavedState, HostError> {
        if self.fail_saves {
            return Err(HostError::new("save_state disabled by test"));
        }
        self.saves += 1;
        let data = if self.ignore_reuse_hint {
            self.state.clone()
        } else {
            let mut buf = std::mem::take(reuse);
            buf.clear();
            buf.extend_from_slice(&self.state);
            buf
        };
        let checksum = xxh32(&data, 0);
        Ok(SavedState { data, checksum })
    }

    fn load_state(&mut self, frame: Frame, state: &[u8]) -> Result<(), HostError> {
        if self.fail_loads {
            return Err(HostError::new("load_state disabled by test"));
        }
        self.loads += 1;
        self.last_loaded_frame = frame;
        self.state.clear();
        self.state.extend_from_slice(state);
        Ok(())
    }

    fn advance_frame(&mut self, inputs: &FrameInputs) {
        self.advances += 1;
        let mut acc: u8 = 0;
        for player in 0..inputs.num_players() {
            for &byte in inputs.player(player) {
                acc = acc.wrapping_mul(31).wrapping_add(byte);
            }
        }
        for (i, byte) in self.state.iter_mut().enumerate() {
            *byte = byte.wrapping_mul(13).wrapping_add(acc).wrapping_add(i as u8);
        }
    }

    fn on_event(&mut self, event: &SyncEvent) {
        self.events.push(event.clone());
    }
}

/// Drive one normal (non-rollback) frame: local input for player 0,
/// synchronize, tick the game, advance the core.
pub(crate) fn step(core: &mut SyncCore, game: &mut TestGame, local_bits: &[u8]) {
    let accepted = core
        .add_local_input(game, 0, GameInput::new(0, local_bits))
        .expect("save failed");
    assert!(accepted, "prediction barrier hit unexpectedly");

    let mut inputs = FrameInputs::new(core.num_players(), core.input_size());
    core.synchronize_inputs(&mut inputs);
    game.advance_frame(&inputs);
    core.increment_frame(game).expect("save failed");
}
