//! Client for the OpenAI-compatible API of a local text-generation-webui
//! ("Oobabooga") server.
//!
//! Supports text completion and chat completion, each either as one round trip
//! or as a stream. Streams decode the server's `data: {json}` SSE lines into
//! typed values, end at `data: [DONE]`, skip malformed frames, and stop on a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! ```no_run
//! use futures::StreamExt;
//! use oobabooga_client::{ChatCompletionOptions, ChatMessage, ClientOptions, OobaboogaClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), oobabooga_client::ClientError> {
//! let client = OobaboogaClient::new(ClientOptions::from_env()?)?;
//! let stream = client
//!     .stream_chat_completion(
//!         vec![ChatMessage::user("Hi")],
//!         &ChatCompletionOptions::default(),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! futures::pin_mut!(stream);
//! while let Some(message) = stream.next().await {
//!     print!("{}", message?.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod provider;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::OobaboogaClient;
pub use config::{find_config_path, load_options, ClientOptions};
pub use errors::ClientError;
pub use provider::OpenAiCompatibleProvider;
pub use types::{
    ChatCompletionOptions, ChatCompletionResponse, ChatMessage, ChatMode, CompletionOptions,
};

/// Install a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Intended for binaries;
/// calling it twice is a no-op.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
