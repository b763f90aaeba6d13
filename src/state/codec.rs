//! LZ4 block codec for saved-state payloads

use lz4_flex::block::{compress, decompress_into};
use tracing::trace;

/// Compress one payload (raw state or delta) into a fresh buffer.
///
/// `accel` mirrors native LZ4's acceleration factor and is carried
/// through the config surface and job records; the pure-Rust encoder
/// only implements the fast path at a fixed acceleration, so the factor
/// does not change the output here.
pub(crate) fn compress_block(input: &[u8], _accel: i32) -> Vec<u8> {
    compress(input)
}

/// Decompress a payload into `out` (which must already have the
/// expected length). Returns the decoded byte count, or `None` when the
/// stream is corrupt or does not fill `out` exactly.
pub(crate) fn decompress_block(input: &[u8], out: &mut [u8]) -> Option<usize> {
    match decompress_into(input, out) {
        Ok(decoded) if decoded == out.len() => Some(decoded),
        Ok(decoded) => {
            trace!("short LZ4 decode: {} of {} bytes", decoded, out.len());
            None
        }
        Err(err) => {
            trace!("LZ4 decode failed: {}", err);
            None
        }
    }
}
