//! Wire types for the OpenAI-compatible completion endpoints.
//!
//! Request types are serialized with `None` fields omitted; the server treats
//! a missing field as "use the loaded preset". Response and chunk types default
//! every field so that sparse payloads from older server builds still decode.

use serde::{Deserialize, Serialize};

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Token budget for completions when the caller does not set one.
pub const DEFAULT_COMPLETION_MAX_TOKENS: u32 = 80;

/// Token budget for chat completions when the caller does not set one.
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 100;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const DEFAULT_TOP_P: f32 = 0.9;

/// Role used for streamed content when the server never announced one.
pub const DEFAULT_STREAM_ROLE: &str = "assistant";

// ─── Messages ────────────────────────────────────────────────────────────────

/// A single chat message.
///
/// `role` is a free-form string: besides `system`/`user`/`assistant`, the
/// server may speak as a named character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

impl Default for ChatMessage {
    fn default() -> Self {
        Self::new(default_role(), "")
    }
}

/// How text-generation-webui applies its prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    /// Character-card chat.
    #[default]
    Chat,
    /// Plain instruction following with `instruction_template`.
    Instruct,
    /// Character chat wrapped in an instruction template.
    ChatInstruct,
}

// ─── Per-call Options ────────────────────────────────────────────────────────

/// Sampling parameters for a text completion call.
///
/// Unset fields fall back to the crate defaults when the request is built.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub model_name: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<i64>,
}

/// Parameters for a chat completion call.
#[derive(Debug, Clone)]
pub struct ChatCompletionOptions {
    pub model_name: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
    pub mode: ChatMode,
    /// Template name used in `instruct` and `chat-instruct` modes.
    pub instruction_template: Option<String>,
    /// Character card to speak as in `chat` modes.
    pub character: Option<String>,
}

impl Default for ChatCompletionOptions {
    fn default() -> Self {
        Self {
            model_name: None,
            max_tokens: Some(DEFAULT_CHAT_MAX_TOKENS),
            temperature: Some(DEFAULT_TEMPERATURE),
            top_p: Some(DEFAULT_TOP_P),
            stop_sequences: None,
            mode: ChatMode::Chat,
            instruction_template: None,
            character: None,
        }
    }
}

// ─── Request Types ───────────────────────────────────────────────────────────

/// Request body for `POST /v1/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub stream: bool,
}

impl CompletionRequest {
    /// Build a request, filling unset sampling parameters with the defaults.
    pub fn from_options(
        default_model: &str,
        prompt: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> Self {
        Self {
            model: options
                .model_name
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            prompt: prompt.to_string(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_COMPLETION_MAX_TOKENS),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: options.top_p.unwrap_or(DEFAULT_TOP_P),
            stop: options.stop_sequences.clone(),
            seed: options.seed,
            stream,
        }
    }
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
    pub mode: ChatMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
}

impl ChatCompletionRequest {
    pub fn from_options(
        default_model: &str,
        messages: Vec<ChatMessage>,
        options: &ChatCompletionOptions,
        stream: bool,
    ) -> Self {
        Self {
            model: options
                .model_name
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop_sequences.clone(),
            stream,
            mode: options.mode,
            instruction_template: options.instruction_template.clone(),
            character: options.character.clone(),
        }
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Response body of a non-streaming `POST /v1/completions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Response body of a non-streaming `POST /v1/chat/completions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_chat_object")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

fn default_chat_object() -> String {
    "chat.completion".to_string()
}

impl ChatCompletionResponse {
    /// The first choice's message, if the server returned any.
    pub fn first_message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// ─── Stream Chunk Types ──────────────────────────────────────────────────────

/// One decoded SSE payload of a streaming text completion.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<CompletionChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunkChoice {
    #[serde(default)]
    pub text: Option<String>,
}

/// One decoded SSE payload of a streaming chat completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatDeltaChunk {
    #[serde(default)]
    pub choices: Vec<ChatDeltaChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatDeltaChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Option<ChatDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental update within a chat chunk.
///
/// Both fields stay `Option` so that an absent role is distinguishable from an
/// empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
