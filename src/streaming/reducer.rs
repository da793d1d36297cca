//! Chunk → output projection.
//!
//! The chat path is stateful (the speaker role is announced once and applies
//! to every later fragment); the completion path is not.

use serde::de::DeserializeOwned;

use crate::types::{ChatDeltaChunk, ChatMessage, CompletionChunk, DEFAULT_STREAM_ROLE};

/// Turns decoded chunks of one stream into user-visible items.
pub trait ChunkProjector {
    /// Payload shape this projector decodes.
    type Chunk: DeserializeOwned;
    /// What the stream yields.
    type Item;

    /// Project one chunk; `None` when it carries nothing to show.
    fn project(&mut self, chunk: Self::Chunk) -> Option<Self::Item>;
}

// ─── Chat Delta Reducer ──────────────────────────────────────────────────────

/// Per-stream role tracking for chat deltas.
///
/// `is_first_delta` only ever goes from `true` to `false`, and `current_role`
/// is overwritten but never cleared.
#[derive(Debug, Clone)]
pub struct ChatDeltaReducer {
    current_role: Option<String>,
    is_first_delta: bool,
}

impl ChatDeltaReducer {
    pub fn new() -> Self {
        Self {
            current_role: None,
            is_first_delta: true,
        }
    }

    /// The last role announced by the server.
    pub fn current_role(&self) -> Option<&str> {
        self.current_role.as_deref()
    }

    /// Whether no delta has been seen yet.
    pub fn is_first_delta(&self) -> bool {
        self.is_first_delta
    }

    /// Apply one chunk. Only `choices[0]` is considered.
    pub fn reduce(&mut self, chunk: ChatDeltaChunk) -> Option<ChatMessage> {
        let delta = chunk.choices.into_iter().next()?.delta?;
        let role = delta.role.filter(|r| !r.is_empty());
        let has_content = delta
            .content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());

        if self.is_first_delta {
            self.is_first_delta = false;
            if role.is_some() && !has_content {
                // Role announcement only.
                self.current_role = role;
                return None;
            }
        }

        if role.is_some() {
            self.current_role = role;
        }

        if !has_content {
            return None;
        }

        Some(ChatMessage {
            role: self
                .current_role
                .clone()
                .unwrap_or_else(|| DEFAULT_STREAM_ROLE.to_string()),
            content: delta.content.unwrap_or_default(),
        })
    }
}

impl Default for ChatDeltaReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkProjector for ChatDeltaReducer {
    type Chunk = ChatDeltaChunk;
    type Item = ChatMessage;

    fn project(&mut self, chunk: ChatDeltaChunk) -> Option<ChatMessage> {
        self.reduce(chunk)
    }
}

// ─── Completion Token Projector ──────────────────────────────────────────────

/// Extracts the text fragment of a completion chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionTokenProjector;

impl ChunkProjector for CompletionTokenProjector {
    type Chunk = CompletionChunk;
    type Item = String;

    fn project(&mut self, chunk: CompletionChunk) -> Option<String> {
        chunk
            .choices
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.is_empty())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
