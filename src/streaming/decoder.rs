//! Per-frame JSON decoding.

use serde::de::DeserializeOwned;

/// Outcome of decoding one SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Chunk(T),
    /// The payload was not valid JSON for `T`; nothing is produced for it.
    Skip,
}

/// Decode a payload into a chunk, or skip it.
///
/// A malformed frame is logged at warn level and never ends the stream.
pub fn decode_frame<T: DeserializeOwned>(payload: &str) -> Decoded<T> {
    match serde_json::from_str::<T>(payload) {
        Ok(chunk) => Decoded::Chunk(chunk),
        Err(e) => {
            tracing::warn!(error = %e, payload = %payload, "skipping malformed SSE frame");
            Decoded::Skip
        }
    }
}
