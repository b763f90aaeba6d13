//! Controller unit tests (rollback scenarios live in `integration`)

use crate::config::SyncConfig;
use crate::events::SyncEvent;
use crate::input::{FrameInputs, GameInput, NULL_FRAME};
use crate::sync::{ConnectStatus, SyncCore};
use crate::test_utils::{step, TestGame};

fn new_core() -> SyncCore {
    SyncCore::new(&SyncConfig::new(2, 4))
}

#[test]
fn test_first_local_input_captures_initial_save() {
    let mut core = new_core();
    let mut game = TestGame::new(64);

    let accepted = core
        .add_local_input(&mut game, 0, GameInput::new(0, &[1, 0, 0, 0]))
        .unwrap();
    assert!(accepted);
    assert_eq!(game.saves, 1);
    assert!(core.savedstate.find(0).is_some());
}

#[test]
fn test_prediction_barrier_rejects_past_budget() {
    let mut core = new_core();
    let mut game = TestGame::new(64);
    let window = core.max_prediction_frames() as i32;

    // No remote confirmations ever arrive: last_confirmed stays -1.
    for frame in 0..window {
        assert_eq!(core.frame_count(), frame);
        step(&mut core, &mut game, &[frame as u8, 0, 0, 0]);
    }
    assert_eq!(core.frame_count(), window);

    let before = core.input_queues[0].last_confirmed_frame();
    let accepted = core
        .add_local_input(&mut game, 0, GameInput::new(0, &[9, 0, 0, 0]))
        .unwrap();
    assert!(!accepted, "input past the prediction barrier must be rejected");
    assert_eq!(
        core.input_queues[0].last_confirmed_frame(),
        before,
        "rejected input must not touch the queue"
    );
}

#[test]
fn test_synchronize_inputs_assembles_per_player_records() {
    let mut core = new_core();
    let mut game = TestGame::new(64);

    core.add_local_input(&mut game, 0, GameInput::new(0, &[7, 7, 7, 7]))
        .unwrap();
    core.add_remote_input(1, GameInput::new(0, &[3, 3, 3, 3]));

    let mut inputs = FrameInputs::new(2, 4);
    core.synchronize_inputs(&mut inputs);
    assert_eq!(inputs.frame(), 0);
    assert_eq!(inputs.player(0), &[7, 7, 7, 7]);
    assert_eq!(inputs.player(1), &[3, 3, 3, 3]);
    assert_eq!(inputs.disconnect_flags(), 0);
}

#[test]
fn test_synchronize_inputs_zero_fills_disconnected() {
    let mut core = new_core();
    let mut game = TestGame::new(64);

    core.add_local_input(&mut game, 0, GameInput::new(0, &[7, 7, 7, 7]))
        .unwrap();
    core.set_connect_status(
        1,
        ConnectStatus {
            disconnected: true,
            last_frame: NULL_FRAME,
        },
    );

    let mut inputs = FrameInputs::new(2, 4);
    core.synchronize_inputs(&mut inputs);
    assert_eq!(inputs.player(1), &[0, 0, 0, 0]);
    assert!(inputs.is_disconnected(1));
    assert!(!inputs.is_disconnected(0));
}

#[test]
fn test_remote_input_emits_confirmed_event() {
    let mut core = new_core();
    core.add_remote_input(1, GameInput::new(0, &[1, 2, 3, 4]));

    match core.poll_event() {
        Some(SyncEvent::ConfirmedInput { input }) => {
            assert_eq!(input.frame, 0);
            assert_eq!(input.bits(), &[1, 2, 3, 4]);
        }
        other => panic!("expected ConfirmedInput, got {:?}", other),
    }
    assert!(core.poll_event().is_none());
}

#[test]
fn test_dispatch_events_forwards_to_handler() {
    let mut core = new_core();
    let mut game = TestGame::new(64);

    core.add_remote_input(1, GameInput::new(0, &[1, 0, 0, 0]));
    core.add_remote_input(1, GameInput::new(1, &[2, 0, 0, 0]));
    core.dispatch_events(&mut game);

    assert_eq!(game.events.len(), 2);
    assert!(core.poll_event().is_none());
}

#[test]
fn test_get_confirmed_inputs_zeroes_missing_records() {
    let mut core = new_core();
    core.add_remote_input(1, GameInput::new(0, &[5, 5, 5, 5]));

    let mut inputs = FrameInputs::new(2, 4);
    core.get_confirmed_inputs(0, &mut inputs);
    // Player 0 never confirmed anything for frame 0.
    assert_eq!(inputs.player(0), &[0, 0, 0, 0]);
    assert_eq!(inputs.player(1), &[5, 5, 5, 5]);
}

#[test]
fn test_set_last_confirmed_frame_loosens_barrier() {
    let mut core = new_core();
    let mut game = TestGame::new(64);
    let window = core.max_prediction_frames() as i32;

    for frame in 0..window {
        step(&mut core, &mut game, &[frame as u8, 0, 0, 0]);
    }

    // Confirmations arrived out-of-band: the barrier opens again.
    core.set_last_confirmed_frame(4);
    let accepted = core
        .add_local_input(&mut game, 0, GameInput::new(0, &[9, 0, 0, 0]))
        .unwrap();
    assert!(accepted);
}

#[test]
fn test_state_stats_empty_session() {
    let core = new_core();
    let stats = core.state_stats();
    assert_eq!(stats.delta_frames, 0);
    assert_eq!(stats.keyframes, 0);
    assert_eq!(stats.compress_pending_count, 0);
}

#[test]
fn test_frame_count_tracks_increments() {
    let mut core = new_core();
    let mut game = TestGame::new(64);
    assert_eq!(core.frame_count(), 0);
    assert!(!core.in_rollback());

    step(&mut core, &mut game, &[1, 0, 0, 0]);
    step(&mut core, &mut game, &[2, 0, 0, 0]);
    assert_eq!(core.frame_count(), 2);
}
