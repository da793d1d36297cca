//! Line source and SSE frame extraction.
//!
//! The server writes one `data: {json}` line per frame and a final
//! `data: [DONE]`. Only that subset of SSE is understood: `event:`/`id:` fields,
//! comments and multi-line data continuations are all treated as ignorable
//! lines.

use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use crate::errors::ClientError;

/// Prefix that marks a data frame. Matched literally, including the space.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A lazy, single-pass sequence of body lines.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

// ─── Line Source ─────────────────────────────────────────────────────────────

/// Turn a successful HTTP response body into a line stream.
///
/// The response is owned by the returned stream; dropping the stream closes
/// the connection.
pub fn response_lines(response: reqwest::Response) -> LineStream {
    byte_lines(response.bytes_stream())
}

/// Longest line accepted before the body is treated as broken.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Split a byte-chunk stream on `\n`, stripping a trailing `\r`.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences and lines split across network chunks decode intact. A read
/// error, or a line longer than [`MAX_LINE_BYTES`], is yielded once as
/// `TransportInterrupted` and ends the sequence; a partial line at that point
/// is discarded rather than decoded.
pub fn byte_lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    split_lines(bytes, MAX_LINE_BYTES)
}

/// Buffered bytes plus how far they have already been searched for `\n`.
struct LineSplitter<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    scanned: usize,
    exhausted: bool,
    max_line: usize,
}

impl<S> LineSplitter<S> {
    /// Pop the next complete line, searching only bytes not seen before.
    fn take_line(&mut self) -> Option<String> {
        let offset = self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == b'\n');
        let Some(offset) = offset else {
            self.scanned = self.buffer.len();
            return None;
        };

        let mut line: Vec<u8> = self.buffer.drain(..=self.scanned + offset).collect();
        self.scanned = 0;
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// End the sequence with an interruption.
    fn fail(&mut self, reason: String) -> ClientError {
        self.buffer.clear();
        self.scanned = 0;
        self.exhausted = true;
        ClientError::TransportInterrupted { reason }
    }
}

fn split_lines<S, B, E>(bytes: S, max_line: usize) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let splitter = LineSplitter {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        scanned: 0,
        exhausted: false,
        max_line,
    };

    Box::pin(stream::unfold(splitter, |mut splitter| async move {
        loop {
            if let Some(line) = splitter.take_line() {
                return Some((Ok(line), splitter));
            }

            if splitter.buffer.len() > splitter.max_line {
                let err = splitter.fail(format!(
                    "line exceeds {} bytes without a newline",
                    splitter.max_line
                ));
                return Some((Err(err), splitter));
            }

            if splitter.exhausted {
                if splitter.buffer.is_empty() {
                    return None;
                }
                // Body ended without a final newline.
                let text = String::from_utf8_lossy(&splitter.buffer)
                    .trim_end_matches('\r')
                    .to_string();
                splitter.buffer.clear();
                splitter.scanned = 0;
                return Some((Ok(text), splitter));
            }

            match splitter.bytes.next().await {
                Some(Ok(chunk)) => splitter.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    let err = splitter.fail(format!("stream read error: {e}"));
                    return Some((Err(err), splitter));
                }
                None => splitter.exhausted = true,
            }
        }
    }))
}

// ─── Frame Extractor ─────────────────────────────────────────────────────────

/// Classification of one body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseFrame<'a> {
    /// Blank line, comment, or a field other than `data`.
    Ignored,
    /// JSON payload with the `data: ` prefix removed.
    Payload(&'a str),
    /// The `[DONE]` sentinel.
    Done,
}

/// Classify a single line.
pub fn extract_frame(line: &str) -> SseFrame<'_> {
    if line.trim().is_empty() {
        return SseFrame::Ignored;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(DONE_SENTINEL) => SseFrame::Done,
        Some(payload) => SseFrame::Payload(payload),
        None => SseFrame::Ignored,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
