//! Relay CLI - Stream One Chat Turn to the Terminal
//!
//! Sends a prompt to the configured chat backend and prints the reply as it
//! streams in. Logs go to stderr so stdout carries only the reply.
//!
//! # Usage
//!
//! ```bash
//! # Ask with defaults (~/.config/relay/client.toml, then built-in defaults)
//! relay "Why is the sky blue?"
//!
//! # Different backend and model, with a system prompt
//! relay --endpoint http://gpu-box:11434 --model mistral --system "Be brief" hello
//!
//! # Fail instead of replaying the offline message
//! relay --fallback error hello
//!
//! # Verbose logging
//! RUST_LOG=debug relay hello
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): aborts the session; nothing more is printed

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use relay_core::{
    load_config, load_config_from_path, ChatBackend, ChatClient, ChatMessage, ClientConfig,
    ConfigOverrides, FallbackPolicy, ParserMode, SendOptions, SessionOutcome, StreamChunk,
};

/// Exit status after Ctrl-C, following the shell convention for SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// Relay - stream a chat reply from an HTTP backend
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prompt text; multiple words are joined with spaces
    #[arg(required = true, value_name = "PROMPT")]
    prompt: Vec<String>,

    /// System message sent before the prompt
    #[arg(short = 's', long, value_name = "TEXT")]
    system: Option<String>,

    /// Backend base URL
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Model name forwarded to the backend
    #[arg(short = 'm', long, value_name = "NAME")]
    model: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "RELAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// What to do when the backend is unreachable (simulate, error)
    #[arg(short = 'f', long, value_name = "POLICY")]
    fallback: Option<FallbackPolicy>,

    /// Discard lines without a `data:` prefix
    #[arg(long)]
    strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "RELAY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    /// CLI values that take priority over file and environment
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref endpoint) = self.endpoint {
            overrides = overrides.with_endpoint(endpoint.clone());
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(policy) = self.fallback {
            overrides = overrides.with_fallback_policy(policy);
        }
        if self.strict {
            overrides = overrides.with_parser_mode(ParserMode::Strict);
        }
        overrides
    }

    /// Conversation to send, system message first
    fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(self.prompt.join(" ")));
        messages
    }
}

/// Initialize logging with the specified level
///
/// Logs are written to stderr.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("relay={level},relay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file and environment, then apply CLI overrides
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone()))
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => load_config().context("Failed to load configuration")?,
    };

    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        endpoint = %config.backend.chat_url(),
        "Configuration resolved"
    );
    Ok(config)
}

/// How the printed stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Done,
    Failed,
}

impl From<StreamEnd> for ExitCode {
    fn from(end: StreamEnd) -> Self {
        match end {
            StreamEnd::Done => ExitCode::SUCCESS,
            StreamEnd::Failed => ExitCode::FAILURE,
        }
    }
}

/// Write one chunk; returns how the stream ended once it is over
async fn write_chunk<W, E>(
    out: &mut W,
    err: &mut E,
    chunk: StreamChunk,
) -> Result<Option<StreamEnd>>
where
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    match chunk {
        StreamChunk::Text { data } => {
            out.write_all(data.as_bytes()).await?;
            out.flush().await?;
            Ok(None)
        }
        StreamChunk::Done => {
            out.write_all(b"\n").await?;
            out.flush().await?;
            Ok(Some(StreamEnd::Done))
        }
        StreamChunk::Error { message } => {
            out.write_all(b"\n").await?;
            out.flush().await?;
            err.write_all(format!("relay: {message}\n").as_bytes()).await?;
            err.flush().await?;
            Ok(Some(StreamEnd::Failed))
        }
    }
}

/// Stream the reply to stdout until it ends or Ctrl-C arrives
async fn run(client: &ChatClient, messages: Vec<ChatMessage>) -> Result<ExitCode> {
    let (mut rx, handle) = client.send_streaming(messages, SendOptions::new());
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                info!(session_id = %handle.id(), "Interrupted, aborting session");
                handle.abort();
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            chunk = rx.recv() => {
                let Some(chunk) = chunk else {
                    let outcome = handle.join().await?;
                    warn!(?outcome, "Stream closed without a terminal chunk");
                    return Ok(ExitCode::FAILURE);
                };
                if let Some(end) = write_chunk(&mut stdout, &mut stderr, chunk).await? {
                    if end == StreamEnd::Failed {
                        error!("Backend stream failed");
                    }
                    if let Ok(SessionOutcome::Degraded) = handle.join().await {
                        warn!("Backend unreachable, printed the offline message");
                    }
                    return Ok(end.into());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args.log_level);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    let client = ChatClient::from_config(config).context("Failed to create chat client")?;
    info!(backend = client.name(), "Client ready");

    run(&client, args.messages()).await
}
