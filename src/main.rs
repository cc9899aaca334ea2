// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sift: AI-prioritised inbox and SMS digests

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use sift::classifier::{Classifier, SmsPriority, Tier};
use sift::config::AppConfig;
use sift::digest::{self, Digest};
use sift::gemini::{GeminiClient, TextModel};
use sift::rate_limit::RateLimiter;
use sift::sources::sms::SmsExport;
use sift::{Result, SiftError};

/// Sift CLI - inbox and SMS digests
#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Summarize and prioritize your inbox and SMS backups", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web UI
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List Gemini models that can generate text
    Models,

    /// Classify an SMS backup file and print the digest
    Sms {
        /// SMS Backup & Restore XML export
        file: PathBuf,

        /// Maximum messages to classify (overrides config)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("Sift v{}", env!("CARGO_PKG_VERSION"));
    }

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Serve { host, port }) => run_serve(config, host, port).await,
        Some(Commands::Models) => run_models(config).await,
        Some(Commands::Sms { file, limit }) => run_sms(config, &file, limit, &cli.format).await,
        Some(Commands::Config { action }) => run_config_command(config, action),
        None => run_serve(config, None, None).await,
    }
}

async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }
    sift::web::start_server(config).await
}

fn require_model(config: &AppConfig) -> Result<GeminiClient> {
    GeminiClient::from_config(&config.model)?.ok_or_else(|| {
        SiftError::ModelUnavailable(format!("set {} to use the Gemini API", config.model.api_key_env))
    })
}

async fn run_models(config: AppConfig) -> Result<()> {
    let client = require_model(&config)?;
    let models = client.list_models().await?;

    println!("Models supporting generateContent:");
    for model in &models {
        let marker = if model == client.name() { "→" } else { " " };
        println!("  {} {}", marker, model);
    }
    if !models.iter().any(|m| m == client.name()) {
        println!("\nConfigured model {} was not listed", client.name());
    }

    Ok(())
}

async fn run_sms(config: AppConfig, file: &Path, limit: Option<usize>, format: &str) -> Result<()> {
    let data = std::fs::read(file)?;
    let model = require_model(&config)?;
    let limiter = RateLimiter::from_config(&config.rate_limit);
    let classifier = Classifier::new(&model, &limiter, &config.prompts.sms);

    let source = SmsExport::new(data, limit.unwrap_or(config.sms.limit));
    let digest = digest::build::<SmsPriority>(&source, &classifier).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&digest)?),
        _ => print_digest(&digest),
    }

    Ok(())
}

fn print_digest<T: Tier>(digest: &Digest<T>) {
    println!("Generated {}", digest.generated_at().format("%Y-%m-%d %H:%M"));
    for (tier, items) in digest.tiers() {
        println!("\n{} ({})", tier.label(), items.len());
        if items.is_empty() {
            println!("  (none)");
        }
        for item in items {
            let marker = if item.failed { "!" } else { "-" };
            println!("  {} {}: {}", marker, item.from, item.summary);
            if let Some(excerpt) = &item.excerpt {
                println!("      {}", excerpt);
            }
        }
    }
}

fn run_config_command(config: AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["sift"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.format, "text");
    }

    #[test]
    fn test_cli_serve_overrides() {
        let cli = Cli::try_parse_from(["sift", "serve", "--host", "0.0.0.0", "--port", "8080"]).unwrap();
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(8080));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_sms_command() {
        let cli = Cli::try_parse_from(["sift", "sms", "backup.xml", "--limit", "5", "--format", "json"]).unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Some(Commands::Sms { file, limit }) => {
                assert_eq!(file, PathBuf::from("backup.xml"));
                assert_eq!(limit, Some(5));
            }
            _ => panic!("Expected Sms command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["sift", "--format", "xml", "models"]).is_err());
    }

    #[test]
    fn test_config_generate_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("config.json");
        run_config_command(AppConfig::default(), ConfigCommands::Generate { output: output.clone() }).unwrap();

        let loaded = AppConfig::load(&output).unwrap();
        assert_eq!(loaded.web.port, 5000);
    }
}
