//! OpenAI-compatible provider.
//!
//! Issues the HTTP requests for the four completion operations and the health
//! check. Status codes are checked here, before any body line is decoded, so a
//! rejected streaming call fails at the call site rather than as a stream item.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::config::ClientOptions;
use super::errors::ClientError;
use super::http::{build_http_client, map_send_error, CONNECT_TIMEOUT};
use super::streaming::{
    chat_message_stream, completion_token_stream, response_lines, ChatMessageStream, TokenStream,
};
use super::types::{
    ChatCompletionOptions, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    CompletionOptions, CompletionRequest, CompletionResponse,
};

const COMPLETIONS_PATH: &str = "v1/completions";
const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
const MODELS_PATH: &str = "v1/models";

// ─── Provider ────────────────────────────────────────────────────────────────

/// Speaks the `/v1` API of a text-generation-webui server.
pub struct OpenAiCompatibleProvider {
    /// HTTP client for non-streaming requests.
    http: HttpClient,
    /// HTTP client for streaming requests (longer timeout).
    http_stream: HttpClient,
    options: ClientOptions,
}

impl OpenAiCompatibleProvider {
    /// Create a provider around existing HTTP clients.
    pub fn new(http: HttpClient, http_stream: HttpClient, options: ClientOptions) -> Self {
        Self {
            http,
            http_stream,
            options,
        }
    }

    /// Create a provider with HTTP clients built from `options`.
    pub fn from_options(options: ClientOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options, options.timeout())?;
        let http_stream = build_http_client(&options, options.stream_timeout())?;
        Ok(Self::new(http, http_stream, options))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // ─── Text Completion ─────────────────────────────────────────────────

    /// Complete `prompt` in one round trip. Returns the first choice's text,
    /// or an empty string when the server returns no choices.
    pub async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ClientError> {
        let body = CompletionRequest::from_options(&self.options.model_name, prompt, options, false);
        let response = self
            .post_json(&self.http, COMPLETIONS_PATH, &body, self.options.timeout())
            .await?;

        let text = read_body(response).await?;
        let parsed: Option<CompletionResponse> =
            serde_json::from_str(&text).map_err(|e| ClientError::ResponseParse {
                reason: format!("failed to parse completion response: {e}"),
            })?;

        Ok(parsed
            .and_then(|r| r.choices.into_iter().next())
            .map(|c| c.text)
            .unwrap_or_default())
    }

    /// Stream the completion of `prompt` token by token.
    pub async fn stream_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        cancel: CancellationToken,
    ) -> Result<TokenStream, ClientError> {
        let body = CompletionRequest::from_options(&self.options.model_name, prompt, options, true);
        tracing::debug!(
            model = %body.model,
            max_tokens = body.max_tokens,
            "streaming completion request"
        );

        let response = self
            .post_json_cancellable(
                &self.http_stream,
                COMPLETIONS_PATH,
                &body,
                self.options.stream_timeout(),
                &cancel,
            )
            .await?;
        warn_if_not_event_stream(&response);

        Ok(Box::pin(completion_token_stream(
            response_lines(response),
            cancel,
        )))
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a non-streaming chat completion request.
    pub async fn chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResponse, ClientError> {
        ensure_messages(&messages)?;
        let body =
            ChatCompletionRequest::from_options(&self.options.model_name, messages, options, false);
        let response = self
            .post_json(&self.http, CHAT_COMPLETIONS_PATH, &body, self.options.timeout())
            .await?;

        let text = read_body(response).await?;
        let parsed: Option<ChatCompletionResponse> =
            serde_json::from_str(&text).map_err(|e| ClientError::ResponseParse {
                reason: format!("failed to parse chat completion response: {e}"),
            })?;

        Ok(parsed.unwrap_or_default())
    }

    /// Stream a chat completion as a sequence of message fragments.
    ///
    /// Each yielded message carries the speaker role in effect for that
    /// fragment; contents concatenate to the full reply.
    pub async fn stream_chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatCompletionOptions,
        cancel: CancellationToken,
    ) -> Result<ChatMessageStream, ClientError> {
        ensure_messages(&messages)?;
        let body =
            ChatCompletionRequest::from_options(&self.options.model_name, messages, options, true);
        tracing::debug!(
            model = %body.model,
            message_count = body.messages.len(),
            mode = ?body.mode,
            "streaming chat request"
        );

        let response = self
            .post_json_cancellable(
                &self.http_stream,
                CHAT_COMPLETIONS_PATH,
                &body,
                self.options.stream_timeout(),
                &cancel,
            )
            .await?;
        warn_if_not_event_stream(&response);

        Ok(Box::pin(chat_message_stream(
            response_lines(response),
            cancel,
        )))
    }

    // ─── Health Check ────────────────────────────────────────────────────

    /// Whether `GET /v1/models` succeeds. Never errors.
    pub async fn is_available(&self) -> bool {
        let url = self.options.endpoint(MODELS_PATH);
        match self.http.get(&url).timeout(CONNECT_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "health check failed");
                false
            }
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    /// [`post_json`](Self::post_json), abandoned as soon as `cancel` fires.
    ///
    /// The wait for response headers can last up to the stream timeout, so a
    /// cancel during it must not surface later as `Timeout`.
    async fn post_json_cancellable<T: Serialize>(
        &self,
        client: &HttpClient,
        path: &str,
        body: &T,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(path, "request cancelled before response");
                Err(ClientError::Cancelled)
            }
            result = self.post_json(client, path, body, timeout) => result,
        }
    }

    /// POST a JSON body and return the response once its status is known to
    /// be a success. The body is not read.
    async fn post_json<T: Serialize>(
        &self,
        client: &HttpClient,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.options.endpoint(path);
        tracing::info!(url = %url, "sending request");

        let response = client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &url, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                url = %url,
                status = status.as_u16(),
                body = %body_text,
                "request rejected"
            );
            return Err(ClientError::TransportRejected {
                provider: self.options.provider_name.clone(),
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(response)
    }
}

fn ensure_messages(messages: &[ChatMessage]) -> Result<(), ClientError> {
    if messages.is_empty() {
        return Err(ClientError::InvalidRequest {
            reason: "messages cannot be empty".into(),
        });
    }
    Ok(())
}

async fn read_body(response: reqwest::Response) -> Result<String, ClientError> {
    response.text().await.map_err(|e| ClientError::ResponseParse {
        reason: format!("failed to read response body: {e}"),
    })
}

fn warn_if_not_event_stream(response: &reqwest::Response) {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("text/event-stream") {
        tracing::warn!(content_type = %content_type, "streaming response is not text/event-stream");
    }
}
