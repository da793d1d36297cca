//! Streaming response decoding.
//!
//! Pipeline, leaves first:
//! - [`sse`]: body bytes → lines → `data:` payloads, ending at `[DONE]`
//! - [`decoder`]: payload → typed chunk, or skip when malformed
//! - [`reducer`]: chunk → [`ChatMessage`] (stateful) or token (stateless)
//!
//! This module drives the pipeline as a pull-based stream. The consumer polls;
//! the only suspension point is the wait for the next line, which is raced
//! against the caller's cancellation token. The line source, and with it the
//! HTTP response, is dropped exactly once on whichever exit path is taken.

pub mod decoder;
pub mod reducer;
pub mod sse;

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::ClientError;
use crate::types::ChatMessage;

use self::decoder::{decode_frame, Decoded};
use self::reducer::{ChatDeltaReducer, ChunkProjector, CompletionTokenProjector};
use self::sse::{extract_frame, SseFrame};

pub use self::sse::{byte_lines, response_lines, LineStream};

/// Boxed stream of chat fragments returned by the client.
pub type ChatMessageStream = Pin<Box<dyn Stream<Item = Result<ChatMessage, ClientError>> + Send>>;

/// Boxed stream of completion tokens returned by the client.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

// ─── Public Entry Points ─────────────────────────────────────────────────────

/// Decode a chat completion body into messages.
///
/// `lines` must come from a response whose status has already been checked.
pub fn chat_message_stream<S>(
    lines: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<ChatMessage, ClientError>> + Send
where
    S: Stream<Item = Result<String, ClientError>> + Unpin + Send + 'static,
{
    drive(lines, ChatDeltaReducer::new(), cancel)
}

/// Decode a text completion body into non-empty tokens.
pub fn completion_token_stream<S>(
    lines: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<String, ClientError>> + Unpin + Send + 'static,
{
    drive(lines, CompletionTokenProjector, cancel)
}

fn drive<S, P>(
    lines: S,
    projector: P,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<P::Item, ClientError>> + Send
where
    S: Stream<Item = Result<String, ClientError>> + Unpin + Send + 'static,
    P: ChunkProjector + Send + 'static,
    P::Chunk: Send,
    P::Item: Send + 'static,
{
    let driver = StreamDriver {
        stream_id: Uuid::new_v4(),
        lines: Some(lines),
        projector,
        cancel,
        emitted: 0,
    };
    tracing::debug!(stream_id = %driver.stream_id, "stream opened");

    stream::unfold(driver, |mut driver| async move {
        let item = driver.next_item().await?;
        Some((item, driver))
    })
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// State of one stream. `lines` is `None` once the stream has finished.
struct StreamDriver<S, P> {
    stream_id: Uuid,
    lines: Option<S>,
    projector: P,
    cancel: CancellationToken,
    emitted: usize,
}

impl<S, P> StreamDriver<S, P>
where
    S: Stream<Item = Result<String, ClientError>> + Unpin,
    P: ChunkProjector,
{
    /// Pull lines until one projects to an item, or the stream ends.
    ///
    /// Errors and cancellation are yielded once; every later call returns
    /// `None`.
    async fn next_item(&mut self) -> Option<Result<P::Item, ClientError>> {
        loop {
            if self.lines.is_none() {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.release("cancelled");
                return Some(Err(ClientError::Cancelled));
            }

            let lines = self.lines.as_mut()?;
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                line = lines.next() => Some(line),
            };

            let line = match next {
                None => {
                    self.release("cancelled");
                    return Some(Err(ClientError::Cancelled));
                }
                Some(None) => {
                    self.release("body exhausted");
                    return None;
                }
                Some(Some(Err(e))) => {
                    tracing::warn!(
                        stream_id = %self.stream_id,
                        emitted = self.emitted,
                        error = %e,
                        "stream failed while reading"
                    );
                    self.release("transport error");
                    return Some(Err(e));
                }
                Some(Some(Ok(line))) => line,
            };

            let payload = match extract_frame(&line) {
                SseFrame::Ignored => continue,
                SseFrame::Done => {
                    self.release("done sentinel");
                    return None;
                }
                SseFrame::Payload(payload) => payload,
            };

            let chunk = match decode_frame::<P::Chunk>(payload) {
                Decoded::Chunk(chunk) => chunk,
                Decoded::Skip => continue,
            };

            if let Some(item) = self.projector.project(chunk) {
                self.emitted += 1;
                return Some(Ok(item));
            }
        }
    }
}

impl<S, P> StreamDriver<S, P> {
    /// Drop the line source. Idempotent.
    fn release(&mut self, reason: &'static str) {
        if let Some(lines) = self.lines.take() {
            drop(lines);
            tracing::debug!(
                stream_id = %self.stream_id,
                emitted = self.emitted,
                reason,
                "stream closed"
            );
        }
    }
}

impl<S, P> Drop for StreamDriver<S, P> {
    fn drop(&mut self) {
        self.release("dropped by consumer");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
