//! CLI entrypoint and subcommand orchestration.

mod config;
mod daemon;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};

#[cfg(not(test))]
use std::sync::Arc;

#[cfg(not(test))]
use bus::MessageBus;
#[cfg(not(test))]
use channels::{ChannelAdapter, TelegramChannel, TelegramChannelConfig, WhisperTranscriber};
#[cfg(not(test))]
use config::Config;
#[cfg(not(test))]
use proto::OutboundEvent;
#[cfg(not(test))]
use session::SessionStore;
#[cfg(not(test))]
use tracing::{error, info, warn};
#[cfg(not(test))]
use tracing_subscriber::EnvFilter;

/// Top-level command-line arguments for the chatbridge application.
#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(about = "Chat platform to message bus bridge", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands available in the application.
#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (all enabled channels)
    Start,

    /// Manage the Telegram channel (status, setup guide, enable)
    Telegram {
        #[command(subcommand)]
        command: TelegramCommands,
    },

    /// Inspect stored conversation sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

/// `telegram` sub-subcommands.
#[derive(Subcommand)]
enum TelegramCommands {
    /// Show current Telegram channel configuration and readiness
    Status,
    /// Print step-by-step guide to create a bot via @BotFather
    Setup,
    /// Save bot token to config and enable the Telegram channel
    Start {
        /// Bot token from @BotFather (e.g. 123456:ABC...)
        #[arg(long)]
        token: Option<String>,
    },
}

/// `sessions` sub-subcommands.
#[derive(Subcommand)]
enum SessionCommands {
    /// List stored sessions, most recently updated first
    List,
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Failed to load config ({e}), using defaults");
        Config::default()
    });

    match cli.command {
        Commands::Start => cmd_start(config).await,
        Commands::Telegram { command } => match command {
            TelegramCommands::Status => cmd_telegram_status(&config),
            TelegramCommands::Setup => cmd_telegram_setup(),
            TelegramCommands::Start { token } => cmd_telegram_start(config, token),
        },
        Commands::Sessions { command } => match command {
            SessionCommands::List => cmd_sessions_list(&config),
        },
    }
}

#[cfg(not(test))]
/// Starts daemon mode with enabled channel adapters.
async fn cmd_start(config: Config) -> anyhow::Result<()> {
    info!("Starting chatbridge daemon");
    config.validate()?;

    let (bus, mut inbound_rx) = MessageBus::new(config.bus.capacity);
    let bus = Arc::new(bus);
    let store = Arc::new(SessionStore::new(
        &config.session.dir,
        config.session.cache_size,
    ));

    // Telegram channel
    let mut telegram: Option<Arc<TelegramChannel>> = None;
    let mut telegram_task = None;
    if config.channels.telegram.enabled {
        let mut channel_config = TelegramChannelConfig::new(
            config.channels.telegram.token.clone(),
            &config.media.dir,
        );
        channel_config.proxy = config.channels.telegram.proxy.clone();
        channel_config.poll_timeout_secs = config.channels.telegram.poll_timeout_secs;

        let mut channel = TelegramChannel::new(channel_config);
        if !config.transcription.api_key.is_empty() {
            let transcriber = WhisperTranscriber::new(config.transcription.api_key.clone())
                .with_base_url(config.transcription.base_url.clone())
                .with_model(config.transcription.model.clone());
            channel = channel.with_transcriber(Arc::new(transcriber));
            info!("Transcription enabled ({})", config.transcription.model);
        }
        let channel = Arc::new(channel);

        // Outbound pump: bus -> adapter
        let mut outbound_rx = bus.subscribe(channel.name());
        let pump_channel = Arc::clone(&channel);
        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                if let Err(e) = pump_channel.send(event).await {
                    error!("Telegram send failed: {e}");
                }
            }
        });

        // Inbound side: adapter -> bus
        let run_channel = Arc::clone(&channel);
        let inbound_tx = bus.inbound_sender();
        telegram_task = Some(tokio::spawn(async move {
            if let Err(e) = run_channel.run(inbound_tx).await {
                error!("Telegram channel error: {e}");
            }
        }));

        telegram = Some(channel);
    } else {
        warn!("No channels enabled; daemon will idle");
    }

    // Upstream consumer: persist history and optionally echo replies.
    let consumer_bus = Arc::clone(&bus);
    let consumer_store = Arc::clone(&store);
    let echo = config.bus.echo;
    tokio::spawn(async move {
        while let Some(event) = inbound_rx.recv().await {
            if let Err(e) = consumer_store.append(&event.channel_id, "user", &event.content) {
                warn!("Failed to persist message for {}: {e}", event.channel_id);
            }
            if echo {
                let reply = OutboundEvent::new(event.channel_id.clone(), event.content.clone());
                if let Err(e) = consumer_bus.send_outbound(reply).await {
                    warn!("Echo reply failed for {}: {e}", event.channel_id);
                }
            }
        }
    });

    // Removed on drop, including the error path.
    let _pid = daemon::write_pid(daemon::default_pid_path()).await?;

    daemon::wait_for_shutdown().await;

    if let Some(channel) = telegram {
        channel.stop().await;
    }
    if let Some(task) = telegram_task {
        let _ = task.await;
    }
    if let Err(e) = store.flush() {
        warn!("Failed to flush session store: {e}");
    }
    info!("chatbridge stopped");
    Ok(())
}

// ─── Telegram CLI commands ───────────────────────────────────────────────────

/// Validates that a Telegram bot token matches the expected `NUMBERS:STRING` format.
fn is_valid_telegram_token(token: &str) -> bool {
    let mut parts = token.splitn(2, ':');
    let numeric = parts
        .next()
        .map(|p| p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty());
    let rest = parts.next().map(|p| !p.is_empty());
    matches!((numeric, rest), (Some(true), Some(true)))
}

#[cfg(not(test))]
/// `chatbridge telegram status` — prints current Telegram channel configuration.
fn cmd_telegram_status(config: &Config) -> anyhow::Result<()> {
    println!("Telegram Status");
    println!("===============");
    println!();

    let enabled = config.channels.telegram.enabled;
    let token_set = !config.channels.telegram.token.is_empty();

    println!("  Enabled : {}", if enabled { "Yes" } else { "No" });
    println!(
        "  Token   : {}",
        if token_set { "(set)" } else { "(not set)" }
    );
    println!();

    match (enabled, token_set) {
        (true, true) => println!("  Status  : Ready — run `chatbridge start` to activate."),
        (false, true) => {
            println!("  Status  : Token set but channel is disabled.");
            println!("           Enable it in config.toml or run `chatbridge telegram start`.");
        }
        (_, false) => {
            println!("  Status  : Not configured.");
            println!("           Run `chatbridge telegram setup` for setup instructions.");
        }
    }
    Ok(())
}

/// `chatbridge telegram setup` — prints a step-by-step bot creation guide.
#[cfg(not(test))]
fn cmd_telegram_setup() -> anyhow::Result<()> {
    println!("Telegram Setup Guide");
    println!("====================");
    println!();
    println!("1. Open Telegram and search for @BotFather");
    println!("2. Send /newbot and follow the prompts");
    println!("3. Copy the bot token (format: 123456:ABC...)");
    println!();
    println!("Then run:");
    println!("  chatbridge telegram start --token YOUR_TOKEN");
    println!();
    println!("Or add it manually to config.toml:");
    println!("  [channels.telegram]");
    println!("  enabled = true");
    println!("  token   = \"123456:ABC...\"");
    println!();
    println!("Or use an environment variable (daemon mode):");
    println!("  TELEGRAM_BOT_TOKEN=123456:ABC... chatbridge start");
    Ok(())
}

/// `chatbridge telegram start [--token TOKEN]` — saves token and enables Telegram.
#[cfg(not(test))]
fn cmd_telegram_start(mut config: Config, token: Option<String>) -> anyhow::Result<()> {
    // Resolve token: flag > env var > already in config
    let resolved = token
        .or_else(|| std::env::var("TELEGRAM_BOT_TOKEN").ok())
        .or_else(|| {
            if config.channels.telegram.token.is_empty() {
                None
            } else {
                Some(config.channels.telegram.token.clone())
            }
        });

    let token = match resolved {
        Some(t) => t,
        None => {
            eprintln!("Error: no bot token provided.");
            eprintln!();
            eprintln!("Supply one with --token or TELEGRAM_BOT_TOKEN, or run:");
            eprintln!("  chatbridge telegram setup");
            anyhow::bail!("missing Telegram bot token");
        }
    };

    if !is_valid_telegram_token(&token) {
        anyhow::bail!(
            "Invalid token format '{}'. Expected NUMBERS:STRING (e.g. 123456:ABC...)",
            token
        );
    }

    config.channels.telegram.token = token;
    config.channels.telegram.enabled = true;

    config
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to save config: {e}"))?;

    println!("Telegram channel enabled.");
    println!("Token saved to config.toml.");
    println!();
    println!("Run `chatbridge start` to activate all channels.");
    Ok(())
}

#[cfg(not(test))]
/// `chatbridge sessions list` — prints stored sessions, newest first.
fn cmd_sessions_list(config: &Config) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.session.dir, config.session.cache_size);
    let sessions = store.list();
    if sessions.is_empty() {
        println!("No stored sessions in {}", config.session.dir);
        return Ok(());
    }
    println!("Sessions ({}):", sessions.len());
    for info in sessions {
        println!(
            "  {}  updated {}",
            info.key,
            info.updated_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn is_valid_telegram_token_accepts_valid() {
        assert!(is_valid_telegram_token("123456:ABCdef"));
        assert!(is_valid_telegram_token("9999999:xYz_123-ABC"));
    }

    #[test]
    fn is_valid_telegram_token_rejects_invalid() {
        assert!(!is_valid_telegram_token("notokens"));
        assert!(!is_valid_telegram_token("abc:def")); // non-numeric prefix
        assert!(!is_valid_telegram_token("123456:")); // empty suffix
        assert!(!is_valid_telegram_token(":ABCdef")); // empty prefix
        assert!(!is_valid_telegram_token(""));
    }

    #[test]
    fn telegram_status_logic_not_configured() {
        let config = Config::default();
        assert!(!config.channels.telegram.enabled);
        assert!(config.channels.telegram.token.is_empty());
    }

    #[test]
    fn telegram_status_logic_enabled_with_token() {
        let mut config = Config::default();
        config.channels.telegram.enabled = true;
        config.channels.telegram.token = "123456:ABC".to_string();
        config.validate().expect("config is complete");
    }
}
