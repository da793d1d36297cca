//! Client façade.
//!
//! `OobaboogaClient` owns one [`OpenAiCompatibleProvider`] built from a single
//! [`ClientOptions`] and forwards every call to it.

use tokio_util::sync::CancellationToken;

use super::config::ClientOptions;
use super::errors::ClientError;
use super::provider::OpenAiCompatibleProvider;
use super::streaming::{ChatMessageStream, TokenStream};
use super::types::{
    ChatCompletionOptions, ChatCompletionResponse, ChatMessage, CompletionOptions,
};

/// Client for a local text-generation-webui server.
pub struct OobaboogaClient {
    provider: OpenAiCompatibleProvider,
}

impl OobaboogaClient {
    /// Validate `options` and build the HTTP clients.
    ///
    /// Does NOT check connectivity; use [`is_available`](Self::is_available).
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        options.validate()?;
        tracing::debug!(base_url = %options.base_url, "creating client");
        Ok(Self {
            provider: OpenAiCompatibleProvider::from_options(options)?,
        })
    }

    /// Wrap an already configured provider.
    pub fn with_provider(provider: OpenAiCompatibleProvider) -> Self {
        Self { provider }
    }

    /// Provider name reported in errors.
    pub fn name(&self) -> &str {
        &self.provider.options().provider_name
    }

    pub fn supports_streaming(&self) -> bool {
        true
    }

    pub fn options(&self) -> &ClientOptions {
        self.provider.options()
    }

    pub fn create_chat_message(role: impl Into<String>, content: impl Into<String>) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    // ─── Text Completion ─────────────────────────────────────────────────

    pub async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ClientError> {
        self.provider.complete(prompt, options).await
    }

    pub async fn stream_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        cancel: CancellationToken,
    ) -> Result<TokenStream, ClientError> {
        self.provider.stream_completion(prompt, options, cancel).await
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    pub async fn chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResponse, ClientError> {
        self.provider.chat_complete(messages, options).await
    }

    pub async fn stream_chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatCompletionOptions,
        cancel: CancellationToken,
    ) -> Result<ChatMessageStream, ClientError> {
        self.provider
            .stream_chat_completion(messages, options, cancel)
            .await
    }

    // ─── Health Check ────────────────────────────────────────────────────

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }
}
