//! Command-line front end for a local text-generation-webui server.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use oobabooga_client::{
    find_config_path, load_options, ChatCompletionOptions, ChatMessage, ChatMode, ClientError,
    ClientOptions, CompletionOptions, OobaboogaClient,
};

#[derive(Parser)]
#[command(name = "ooba")]
#[command(about = "Talk to a local text-generation-webui server")]
#[command(version)]
struct Cli {
    /// Path to oobabooga.yaml (defaults to searching upward from the cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the server base URL
    #[arg(long = "base-url", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Complete a raw prompt
    Complete {
        prompt: String,
        /// Print tokens as they arrive
        #[arg(long)]
        stream: bool,
        #[arg(long = "max-tokens")]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        /// Stop sequence (repeatable)
        #[arg(long = "stop")]
        stop: Vec<String>,
    },
    /// Send one chat message
    Chat {
        message: String,
        #[arg(long)]
        stream: bool,
        /// Optional system prompt sent before the message
        #[arg(long)]
        system: Option<String>,
        #[arg(long, value_enum, default_value_t = ModeArg::Chat)]
        mode: ModeArg,
        #[arg(long)]
        character: Option<String>,
        #[arg(long = "instruction-template")]
        instruction_template: Option<String>,
    },
    /// Check whether the server is reachable
    Health,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Chat,
    Instruct,
    ChatInstruct,
}

impl From<ModeArg> for ChatMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Chat => ChatMode::Chat,
            ModeArg::Instruct => ChatMode::Instruct,
            ModeArg::ChatInstruct => ChatMode::ChatInstruct,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    oobabooga_client::init_tracing("oobabooga_client=info,warn");

    let cli = Cli::parse();
    let options = resolve_options(cli.config.as_deref(), cli.base_url)?;
    let client = OobaboogaClient::new(options).context("failed to create client")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Complete {
            prompt,
            stream,
            max_tokens,
            temperature,
            stop,
        } => {
            let options = CompletionOptions {
                max_tokens,
                temperature,
                stop_sequences: Some(stop).filter(|s| !s.is_empty()),
                ..Default::default()
            };
            if stream {
                match client.stream_completion(&prompt, &options, cancel).await {
                    Ok(tokens) => print_stream(tokens).await?,
                    Err(ClientError::Cancelled) => tracing::info!("interrupted"),
                    Err(e) => return Err(e.into()),
                }
            } else if let Some(text) =
                until_interrupted(&cancel, client.complete(&prompt, &options)).await
            {
                println!("{}", text?);
            }
        }
        Command::Chat {
            message,
            stream,
            system,
            mode,
            character,
            instruction_template,
        } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::system(system));
            }
            messages.push(ChatMessage::user(message));

            let options = ChatCompletionOptions {
                mode: mode.into(),
                character,
                instruction_template,
                ..Default::default()
            };
            if stream {
                match client.stream_chat_completion(messages, &options, cancel).await {
                    Ok(fragments) => print_stream(fragments.map(|r| r.map(|m| m.content))).await?,
                    Err(ClientError::Cancelled) => tracing::info!("interrupted"),
                    Err(e) => return Err(e.into()),
                }
            } else if let Some(response) =
                until_interrupted(&cancel, client.chat_complete(messages, &options)).await
            {
                let response = response?;
                let reply = response
                    .first_message()
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                println!("{reply}");
            }
        }
        Command::Health => {
            let base_url = client.options().base_url.clone();
            match until_interrupted(&cancel, client.is_available()).await {
                Some(true) => println!("{base_url}: available"),
                Some(false) => {
                    println!("{base_url}: unavailable");
                    std::process::exit(1);
                }
                None => {}
            }
        }
    }

    Ok(())
}

/// Explicit `--config`, else a discovered `oobabooga.yaml`, else the
/// environment; `--base-url` wins over all of them.
fn resolve_options(
    config: Option<&std::path::Path>,
    base_url: Option<String>,
) -> anyhow::Result<ClientOptions> {
    let mut options = match config {
        Some(path) => load_options(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            match find_config_path(&cwd) {
                Ok(path) => load_options(&path)?.with_env_overrides()?,
                Err(_) => ClientOptions::from_env()?,
            }
        }
    };
    if let Some(url) = base_url {
        options.base_url = url;
    }
    Ok(options)
}

/// Run `request` unless Ctrl-C fires first; `None` means interrupted.
async fn until_interrupted<F: Future>(
    cancel: &CancellationToken,
    request: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("interrupted");
            None
        }
        output = request => Some(output),
    }
}

/// Print fragments as they arrive. Ctrl-C ends the stream without an error.
async fn print_stream<S>(stream: S) -> anyhow::Result<()>
where
    S: Stream<Item = Result<String, ClientError>>,
{
    futures::pin_mut!(stream);
    let mut stdout = std::io::stdout();
    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Err(ClientError::Cancelled) => {
                tracing::info!("interrupted");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    writeln!(stdout)?;
    Ok(())
}
