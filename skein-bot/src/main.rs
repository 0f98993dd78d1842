//! Skein CLI - run a bot on IRC
//!
//! A command-line interface for running and configuring the Skein bot.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use clap::{Args, Parser, Subcommand};
use skein_bot::config::{load_config_from, require_config};
use skein_bot::error::{BotError, Result};
use skein_bot::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Skein - a chat bot speaking IRC
#[derive(Parser)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "SKEIN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Init(InitArgs),

    /// Connect and run the bot
    Run(RunArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the init command
#[derive(Args)]
struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

/// Arguments for the run command
#[derive(Args)]
struct RunArgs {
    /// IRC server, `host` or `host:port` (overrides config)
    #[arg(long, env = "SKEIN_HOST")]
    host: Option<String>,

    /// Nickname (overrides config)
    #[arg(short, long, env = "SKEIN_NICK")]
    nick: Option<String>,

    /// Channel to join; repeat for more (replaces configured channels)
    #[arg(long = "channel")]
    channels: Vec<String>,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "skein_bot={level},skein={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init(args) => cmd_init(args).await,
        Commands::Run(args) => cmd_run(args, cli.config).await,
        Commands::Config(args) => cmd_config(args, cli.config).await,
    }
}

/// Load the explicit config file, or the default one when it exists.
async fn load(config_path: Option<PathBuf>) -> Result<BotConfig> {
    match config_path {
        Some(path) => Ok(require_config(&path).await?),
        None => {
            let path = skein_bot::config::config_path();
            if path.exists() {
                Ok(load_config_from(&path).await?)
            } else {
                Ok(BotConfig::default())
            }
        }
    }
}

/// Initialize configuration.
async fn cmd_init(args: InitArgs) -> Result<()> {
    let config_file = config_path();

    if config_file.exists() && !args.force {
        println!("Configuration already exists at: {}", config_file.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    init_config()
        .await
        .context("failed to initialize config")?;

    println!("Configuration created: {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. set irc.host and irc.channels in the file above");
    println!("  2. skein run");

    Ok(())
}

/// Connect and serve until Ctrl+C.
async fn cmd_run(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load(config_path).await?;

    if let Some(host) = args.host {
        config.irc.host = host;
    }
    if let Some(nick) = args.nick {
        config.irc.nick = nick;
    }
    if !args.channels.is_empty() {
        config.irc.channels = args.channels;
    }

    let issues = config.validate();
    for issue in &issues {
        match issue.level {
            IssueLevel::Error => tracing::error!("{issue}"),
            IssueLevel::Warning => tracing::warn!("{issue}"),
        }
    }
    if issues.iter().any(|i| i.level == IssueLevel::Error) {
        return Err(BotError::config("configuration has errors"));
    }

    let service: BoxedService = Arc::new(IrcService::new(config.irc));
    let mut messages = service
        .open()
        .await
        .context("failed to open irc service")?;

    println!("Running as {}. Press Ctrl+C to stop.\n", service.user_name());

    loop {
        tokio::select! {
            msg = messages.recv() => {
                let Some(msg) = msg else {
                    return Err(BotError::internal("irc service stopped"));
                };
                handle_message(service.as_ref(), &msg).await;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                return Ok(());
            }
        }
    }
}

/// Log a message and answer commands addressed to the bot.
async fn handle_message(service: &dyn Service, msg: &Message) {
    if service.is_me(msg) {
        return;
    }
    tracing::info!(
        channel = %msg.channel(),
        user = %msg.user_name(),
        "{}",
        msg.message()
    );

    let Some(reply) = reply_to(service.command_prefix(), msg.message()) else {
        return;
    };
    let sent = if service.is_private(msg) {
        service.private_message(msg.user_id(), reply).await
    } else {
        service.send_message(msg.channel(), reply).await
    };
    if let Err(e) = sent {
        tracing::warn!(error = %e, "failed to reply");
    }
}

/// Reply for a bot command, if `text` is one.
fn reply_to(prefix: &str, text: &str) -> Option<&'static str> {
    match text.strip_prefix(prefix)?.trim() {
        "ping" => Some("pong"),
        _ => None,
    }
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config_file = config_path.unwrap_or_else(skein_bot::config::config_path);

    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            if config_file.exists() {
                let config = load_config_from(&config_file).await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Configuration file does not exist.");
                println!("Run 'skein init' to create one.");
            }
        }
        ConfigCommands::Validate => {
            let config = require_config(&config_file).await?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if config.has_errors() {
                return Err(BotError::config("configuration has errors"));
            }
            println!("Configuration is valid");
        }
    }

    Ok(())
}
