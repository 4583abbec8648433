//! Toshin CLI
//!
//! Command-line interface for the Toshin command bot

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toshin_config::Config;
use toshin_console::{render_message_reply, ConsoleAdapter};
use toshin_core::request::separator_for;
use toshin_core::{
    standard_registry, to_message_reply, BotRuntime, ChannelAdapter, CommandContext,
    CommandDescriptor, ContentResolver, RequestSettings,
};
use toshin_ipc::EventBus;
use tracing::info;

use logging::{init_logging, LogManager};

#[derive(Parser)]
#[command(name = "toshin")]
#[command(about = "Toshin - chat command bot with emote content tables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level, overrides core.log_level
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot against the console transport
    Run {
        /// Username the console speaks as
        #[arg(short, long, default_value = "console")]
        user: String,
    },
    /// Validate config, emote and sticker tables
    Check,
    /// Resolve one emote offline and print the reply
    Resolve {
        command: String,
        params: Vec<String>,
        /// Display name substituted for the invoking user
        #[arg(short, long, default_value = "console")]
        name: String,
    },
    /// Print the command catalog
    Commands {
        /// Print registration batches as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log management
    Logs {
        #[command(subcommand)]
        action: LogCommands,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// List log files
    List,
    /// Remove old log files
    Clean {
        /// Remove files older than this many days
        #[arg(short, long, default_value = "7")]
        days: u64,
    },
    /// Print the current log file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { user } => {
            let (config, base) = load_config(cli.config)?;
            let level = cli
                .log_level
                .unwrap_or_else(|| config.log_level().to_string());
            let _guard = init_logging(&config.data_dir().join("logs"), &level)?;

            let context = CommandContext::load(&config, &base)
                .context("Failed to load content tables")?;
            let registry = standard_registry(&context)?;
            let batches = registry.registration_batches()?;
            info!(
                guild = batches.guild.len(),
                global = batches.global.len(),
                "command catalog ready"
            );

            let console = Arc::new(ConsoleAdapter::new(&user, config.bot.guild_id));
            let runtime = BotRuntime::new(&config, registry, console.clone());

            let event_bus = EventBus::new();
            let inbound_rx = event_bus.subscribe();
            let processor = tokio::spawn(async move { runtime.run(inbound_rx).await });

            // Dropping the bus with the adapter future closes the runtime loop.
            tokio::select! {
                result = console.start(event_bus) => result?,
                _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
            }

            processor.await??;
        }
        Commands::Check => {
            let (config, base) = load_config(cli.config)?;
            println!("Config OK");

            let context = CommandContext::load(&config, &base)?;
            context.emotes.validate()?;
            println!("Emotes OK: {} command(s)", context.emotes.len());
            if let Some(stickers) = &context.stickers {
                stickers.validate()?;
                println!("Stickers OK: {} pack(s)", stickers.len());
            }

            let registry = standard_registry(&context)?;
            let batches = registry.registration_batches()?;
            println!(
                "Catalog OK: {} guild command(s), {} global command(s)",
                batches.guild.len(),
                batches.global.len()
            );
        }
        Commands::Resolve {
            command,
            params,
            name,
        } => {
            let (config, base) = load_config(cli.config)?;
            let context = CommandContext::load(&config, &base)?;
            let resolver =
                ContentResolver::new(context.emotes.clone(), context.allowed_params.clone());

            let param_string = params.join(&separator_for(&command).to_string());
            let resolved = context
                .rng
                .with(|rng| resolver.resolve(&command, &param_string, &name, rng))?;

            let Some(resolved) = resolved else {
                anyhow::bail!("No emote resolved for '{}'", command);
            };
            let style = RequestSettings::from(&config.bot).style;
            let reply = to_message_reply(&resolved.into_reply(&config.bot.emoji), &style);
            println!("{}", render_message_reply(&reply));
        }
        Commands::Commands { json } => {
            let (config, base) = load_config(cli.config)?;
            let context = CommandContext::load(&config, &base)?;
            let registry = standard_registry(&context)?;
            let batches = registry.registration_batches()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&batches)?);
            } else {
                println!("Guild commands ({}):", batches.guild.len());
                for descriptor in &batches.guild {
                    println!("  {}", describe_line(descriptor));
                }
                println!("Global commands ({}):", batches.global.len());
                for descriptor in &batches.global {
                    println!("  {}", describe_line(descriptor));
                }
            }
        }
        Commands::Logs { action } => {
            let (config, _) = load_config(cli.config)?;
            let manager = LogManager::new(config.data_dir().join("logs"));

            match action {
                LogCommands::List => {
                    let files = manager.log_files()?;
                    if files.is_empty() {
                        println!("No log files in {}", manager.log_dir().display());
                    } else {
                        println!("Log files ({}):", files.len());
                        for file in &files {
                            let metadata = std::fs::metadata(file)?;
                            let modified: chrono::DateTime<chrono::Local> =
                                metadata.modified()?.into();
                            println!(
                                "  {} ({}, modified {})",
                                file.display(),
                                LogManager::format_size(metadata.len()),
                                modified.format("%Y-%m-%d %H:%M")
                            );
                        }
                        println!(
                            "Total: {}",
                            LogManager::format_size(manager.total_size()?)
                        );
                    }
                }
                LogCommands::Clean { days } => {
                    let deleted = manager.cleanup_older_than(days)?;
                    println!("Removed {} log file(s) older than {} day(s)", deleted, days);
                }
                LogCommands::Path => {
                    println!("{}", manager.current_log_path().display());
                }
            }
        }
    }

    Ok(())
}

fn describe_line(descriptor: &CommandDescriptor) -> String {
    match &descriptor.parameter {
        Some(parameter) if parameter.required => format!(
            "{} <{}> - {}",
            descriptor.name, parameter.name, descriptor.description
        ),
        Some(parameter) => format!(
            "{} [{}] - {}",
            descriptor.name, parameter.name, descriptor.description
        ),
        None => format!("{} - {}", descriptor.name, descriptor.description),
    }
}

/// Load the config and the directory its relative paths resolve against.
///
/// An explicit path must exist. Without one, the default location is used
/// when present and built-in defaults relative to the working directory
/// otherwise.
fn load_config(path: Option<String>) -> Result<(Config, PathBuf)> {
    if let Some(path) = path {
        let config = Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?;
        return Ok((config, config_base(Path::new(&path))?));
    }

    if let Some(default) = Config::default_path().filter(|p| p.exists()) {
        let config = Config::load(&default)
            .with_context(|| format!("Failed to load config from {}", default.display()))?;
        let base = config_base(&default)?;
        return Ok((config, base));
    }

    Ok((Config::default(), std::env::current_dir()?))
}

fn config_base(path: &Path) -> Result<PathBuf> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Ok(std::env::current_dir()?),
    }
}
