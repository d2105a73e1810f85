use anyhow::{Context, Result};
use atty::Stream;
use clap::{Parser, Subcommand};
use colored::Colorize;
use logtriage_core::{ConfigManager, LogTriageConfig};
use logtriage_mcp_server::LogTriageServer;
use rmcp::ServiceExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

const LOG_FILE_NAME: &str = "logtriage.log";

#[derive(Parser)]
#[command(
    name = "logtriage",
    version,
    author,
    about = "LogTriage - Jenkins build log triage as an MCP server",
    long_about = "LogTriage fetches, summarizes and analyzes Jenkins console logs and explains build failures to MCP clients over stdio."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Serve the MCP tools over stdio")]
    Serve,

    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(short, long, help = "Overwrite an existing file")]
        force: bool,
    },

    #[command(about = "Show the effective configuration")]
    Show {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_config(cli.config.as_deref())?;
            handle_serve(config, cli.verbose).await?;
        }
        Commands::Config { action } => {
            init_console_logging(cli.verbose);
            handle_config(action, cli.config.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ConfigManager> {
    match path {
        Some(path) => ConfigManager::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ConfigManager::load().context("Failed to load configuration"),
    }
}

/// `RUST_LOG` wins over the configured level; `--verbose` forces debug.
fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_console_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(default_level, verbose))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn handle_serve(config_mgr: ConfigManager, verbose: bool) -> Result<()> {
    let config: LogTriageConfig = config_mgr.config().clone();

    // stdout carries the protocol, so logs go to a file.
    let log_dir = config.logging.resolved_log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter(&config.logging.level, verbose))
        .with_ansi(false)
        .with_target(false)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    // Keep the writer alive for the whole process.
    std::mem::forget(_guard);

    // Loading ran before any subscriber existed.
    config_mgr.log_summary();

    let server = LogTriageServer::from_config(&config).context("Failed to create server")?;
    if server
        .rate_limiter()
        .spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs))
        .is_some()
    {
        info!(
            "Rate limiting {}/min (burst {}) per caller",
            config.rate_limit.per_minute, config.rate_limit.burst
        );
    }
    if server.cache().is_enabled() {
        info!(
            "Response cache on: {} entries, ttl {}s",
            config.cache.max_entries, config.cache.ttl_secs
        );
    }

    if atty::is(Stream::Stderr) {
        eprintln!(
            "{} logging to {}",
            "LogTriage MCP server ready;".green().bold(),
            log_dir.join(LOG_FILE_NAME).display()
        );
    }

    let service: rmcp::service::RunningService<rmcp::RoleServer, LogTriageServer> = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| {
            if atty::is(Stream::Stderr) {
                eprintln!("{} {}", "Failed to start MCP server:".red().bold(), e);
            }
            anyhow::anyhow!("MCP server startup failed: {}", e)
        })?;

    info!("MCP server started on stdio");

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("MCP server stopped");
    Ok(())
}

fn handle_config(action: ConfigAction, explicit_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let config_path = match explicit_path {
                Some(path) => path.to_path_buf(),
                None => ConfigManager::user_config_path()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?,
            };

            println!("{}", "Initializing LogTriage configuration...".green().bold());
            println!();

            if config_path.exists() && !force {
                println!(
                    "{} {}",
                    "Configuration file already exists:".yellow(),
                    config_path.display()
                );
                println!("   Use --force to overwrite");
                return Ok(());
            }

            ConfigManager::create_default_config(&config_path)
                .with_context(|| format!("Failed to create {}", config_path.display()))?;
            println!("✓ Created config file: {}", config_path.display());
            println!();
            println!("Next steps:");
            println!("  1. Set jenkins.url (or JENKINS_URL)");
            println!("  2. Set JENKINS_USER and JENKINS_API_TOKEN in the environment or a .env file");
            println!("  3. Run 'logtriage config show' to check the result");
        }
        ConfigAction::Show { json } => {
            let config_mgr = load_config(explicit_path)?;
            let config = config_mgr.config();

            if json {
                let mut value = serde_json::to_value(config)?;
                if config.jenkins.api_token.is_some() {
                    value["jenkins"]["api_token"] = serde_json::json!("********");
                }
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("{}", "Current Configuration:".blue().bold());
            match config_mgr.config_path() {
                Some(path) => println!("  Loaded from: {}", path.display()),
                None => println!("  Loaded from: {}", "defaults and environment".yellow()),
            }
            println!();
            print!("{}", config_mgr.render_masked()?);
        }
    }

    Ok(())
}
