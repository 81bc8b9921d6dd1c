mod bot;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    parley_config::ParleyConfig,
    parley_intent::{Dispatched, Dispatcher, Message},
    serde_json::Value,
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::{debug, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parley", about = "Parley: rule-based conversational dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides `logging.level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery of ./parley.toml and ~/.config/parley/).
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the sample bot over stdin (default when no subcommand is provided).
    Chat {
        /// Sender id attached to every message.
        #[arg(long, default_value = "you")]
        user: String,
    },
    /// Print the effective configuration as TOML.
    Config,
}

/// Initialise tracing. Logs go to stderr so they don't interleave with replies.
fn init_telemetry(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => parley_config::load_config(path)?,
        None => parley_config::discover_and_load(),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_telemetry(&level, cli.json_logs || config.logging.json);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    match cli.command {
        None => run_chat(&config, "you").await,
        Some(Commands::Chat { user }) => run_chat(&config, &user).await,
        Some(Commands::Config) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// Read one message per stdin line and print the bot's replies.
async fn run_chat(config: &ParleyConfig, user: &str) -> anyhow::Result<()> {
    let store = bot::store();
    let dispatcher = Dispatcher::from_config(bot::contexts(), &config.dispatch);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Say hello. Ctrl-D quits.");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message = Message::text("console", user, line);
        match dispatcher.run(&store, &message).await {
            Ok(Dispatched::Handled(handled)) => {
                if let Some(text) = handled.result.as_ref().and_then(reply_text) {
                    println!("bot> {text}");
                }
            },
            Ok(Dispatched::Unhandled(reason)) => {
                debug!(message_id = %message.id, ?reason, "message dropped");
            },
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "dispatch failed");
                eprintln!("error: {e}");
            },
        }
        store.dispatch(bot::BotAction::Turn);
    }
    Ok(())
}

fn reply_text(value: &Value) -> Option<&str> {
    value.get("text").and_then(Value::as_str)
}
