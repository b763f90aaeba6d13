//! Session configuration and tuning constants

use tracing::debug;

use crate::input::Frame;

/// Hard upper bound on the prediction window (how far the local
/// simulation may run ahead of the last confirmed frame).
pub const MAX_PREDICTION_FRAMES: usize = 8;

/// Every Nth saved frame is stored whole instead of delta-encoded, so
/// delta chains stay short and reconstruction is bounded.
pub const KEYFRAME_INTERVAL: Frame = 4;

/// Saved-state ring depth. Two slots beyond the prediction window keep
/// the base of any delta chain resident while every frame in the window
/// is still reconstructible.
pub const SAVED_STATE_CAPACITY: usize = MAX_PREDICTION_FRAMES + 2;

/// Depth of the polled event queue.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// LZ4 acceleration used when neither config nor environment supply one.
pub const DEFAULT_LZ4_ACCEL: i32 = 2;

/// Environment override for the LZ4 acceleration factor.
const ENV_LZ4_ACCEL: &str = "FRAMELOCK_SYNC_LZ4_ACCEL";
/// Environment override for the prediction window.
const ENV_PREDICTION_FRAMES: &str = "FRAMELOCK_SYNC_PREDICTION_FRAMES";

/// Settings for creating a sync session
///
/// Zero/negative values for `num_prediction_frames` and `lz4_accel` mean
/// "unset": the environment is consulted once at session creation, then
/// the built-in default applies.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of players in the session
    pub num_players: usize,
    /// Byte width of one player's input for one frame
    pub input_size: usize,
    /// Prediction window in frames (clamped to [`MAX_PREDICTION_FRAMES`])
    pub num_prediction_frames: usize,
    /// LZ4 acceleration factor (higher = faster, worse ratio)
    pub lz4_accel: i32,
    /// Compress saved states on a background thread
    pub async_compress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            num_players: 2,
            input_size: 4,
            num_prediction_frames: MAX_PREDICTION_FRAMES,
            lz4_accel: 0,
            async_compress: false,
        }
    }
}

impl SyncConfig {
    /// Config for a session with the given player count and input width.
    pub fn new(num_players: usize, input_size: usize) -> Self {
        Self {
            num_players,
            input_size,
            ..Default::default()
        }
    }

    pub(crate) fn resolve(&self) -> ResolvedConfig {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolution with an injectable lookup so tests don't race on the
    /// process environment.
    pub(crate) fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ResolvedConfig {
        fn parse_i32(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<i32> {
            lookup(key)?.parse::<i32>().ok()
        }

        let mut lz4_accel = self.lz4_accel;
        if lz4_accel <= 0 {
            lz4_accel = parse_i32(&lookup, ENV_LZ4_ACCEL).unwrap_or(0);
        }
        if lz4_accel <= 0 {
            lz4_accel = DEFAULT_LZ4_ACCEL;
        }

        let mut prediction = self.num_prediction_frames;
        if prediction == 0 {
            prediction = parse_i32(&lookup, ENV_PREDICTION_FRAMES)
                .filter(|&v| v > 0)
                .map(|v| v as usize)
                .unwrap_or(MAX_PREDICTION_FRAMES);
        }
        if prediction > MAX_PREDICTION_FRAMES {
            debug!(
                "clamping prediction window {} to {}",
                prediction, MAX_PREDICTION_FRAMES
            );
            prediction = MAX_PREDICTION_FRAMES;
        }

        ResolvedConfig {
            num_players: self.num_players,
            input_size: self.input_size,
            max_prediction_frames: prediction,
            lz4_accel,
            async_compress: self.async_compress,
        }
    }
}

/// Configuration after env lookup, clamping, and defaulting.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub num_players: usize,
    pub input_size: usize,
    pub max_prediction_frames: usize,
    pub lz4_accel: i32,
    pub async_compress: bool,
}
