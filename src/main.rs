mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use wpdev_cli::core::config::CONFIG_KEYS;
use wpdev_cli::core::docker::{ContainerProbe, DockerManager};
use wpdev_cli::core::{
    open_store, BackupManager, Config, ConfigManager, DataStore, Orchestrator, Outcome,
    ReadinessPoller,
};
use wpdev_cli::utils::{format_bytes, format_local};

const DEFAULT_ENV_FILE: &str = ".env";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Sync => handle_sync(&config, cli.json).await?,
        Commands::Wait => handle_wait(&config).await?,
        Commands::Export => handle_export(&config, cli.json).await?,
        Commands::Restore { ref file } => handle_restore(&config, file.as_deref(), cli.json).await?,
        Commands::List => handle_list(&config, cli.json)?,
        Commands::Config => handle_config(&config, cli.json)?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable with --json
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wpdev_cli={}", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let (env_file, required) = match &cli.env_file {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_ENV_FILE), false),
    };

    let manager = ConfigManager::load(&env_file, required)?;
    if let Some(path) = manager.env_file() {
        tracing::debug!(path = %path.display(), "loaded env file");
    }
    for key in CONFIG_KEYS {
        if let Some(source) = manager.source(key) {
            tracing::debug!(key = %key, source = ?source, "config value set");
        }
    }

    let mut config = manager.to_config().context("Invalid configuration")?;
    cli.overrides.apply(&mut config);
    Ok(config)
}

/// Wait for the database container, when one is configured.
///
/// Returns the poller for the store wait, which gets what is left of the
/// shared timeout budget (at least one interval).
async fn wait_container(config: &Config) -> Result<ReadinessPoller> {
    config.ensure_valid()?;
    let poller = ReadinessPoller::from_config(&config.poll)?;

    let Some(container) = &config.db.container else {
        return Ok(poller);
    };

    let docker = DockerManager::new()?;
    let readiness = poller
        .wait_for(&ContainerProbe::new(docker, container.clone()))
        .await?;

    let remaining = poller.timeout().saturating_sub(readiness.elapsed);
    Ok(ReadinessPoller::new(
        poller.interval(),
        remaining.max(poller.interval()),
    )?)
}

/// Wait for the container and then for the store itself
async fn wait_ready(config: &Config, store: &dyn DataStore) -> Result<()> {
    let poller = wait_container(config).await?;
    Orchestrator::new(store, config).wait_ready(&poller).await?;
    Ok(())
}

async fn handle_sync(config: &Config, json: bool) -> Result<()> {
    let store = open_store(&config.db);
    let poller = wait_container(config).await?;

    let outcome = Orchestrator::new(store.as_ref(), config)
        .run(&poller)
        .await?;
    print_outcome(&outcome, json)
}

async fn handle_wait(config: &Config) -> Result<()> {
    let store = open_store(&config.db);
    wait_ready(config, store.as_ref()).await?;
    println!("{} {} is ready", "✓".green(), store.describe());
    Ok(())
}

async fn handle_export(config: &Config, json: bool) -> Result<()> {
    let store = open_store(&config.db);
    wait_ready(config, store.as_ref()).await?;

    let outcome = Orchestrator::new(store.as_ref(), config).export().await?;
    print_outcome(&outcome, json)
}

async fn handle_restore(config: &Config, file: Option<&Path>, json: bool) -> Result<()> {
    let store = open_store(&config.db);
    wait_ready(config, store.as_ref()).await?;

    let outcome = Orchestrator::new(store.as_ref(), config)
        .restore(file)
        .await?;
    print_outcome(&outcome, json)
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome {
        Outcome::Restored { artifact } => println!(
            "{} Restored {} ({})",
            "✓".green(),
            artifact.path.display(),
            format_bytes(artifact.size_bytes)
        ),
        Outcome::Exported { artifact } => println!(
            "{} Backup written to {} ({})",
            "✓".green(),
            artifact.path.display(),
            format_bytes(artifact.size_bytes)
        ),
        Outcome::StartedEmpty { backup_dir } => println!(
            "{} No backup available in {}, starting with an empty database",
            "•".yellow(),
            backup_dir.display()
        ),
    }

    Ok(())
}

fn handle_list(config: &Config, json: bool) -> Result<()> {
    let dir = &config.backup_dir;
    let artifacts = BackupManager::new(dir).list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("No backups in {}", dir.display());
        return Ok(());
    }

    println!("Backups in {}\n", dir.display());
    println!("{:<40} {:<20} {:>12}", "File", "Modified", "Size");
    println!("{}", "-".repeat(74));

    for (i, artifact) in artifacts.iter().enumerate() {
        let line = format!(
            "{:<40} {:<20} {:>12}",
            artifact.file_name,
            format_local(&artifact.modified),
            format_bytes(artifact.size_bytes)
        );
        if i == 0 {
            println!("{} {}", line.bold(), "(latest)".green());
        } else {
            println!("{}", line);
        }
    }

    Ok(())
}

fn handle_config(config: &Config, json: bool) -> Result<()> {
    let errors = config.validate();

    if json {
        let value = serde_json::json!({
            "config": config,
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Configuration:\n");
        for (key, value) in config.display_rows() {
            println!("{:<16} {}", key, value);
        }
        println!();

        if errors.is_empty() {
            println!("{} Configuration is valid", "✓".green());
        } else {
            println!("{} Configuration errors:", "✗".red());
            for error in &errors {
                println!("  - {}", error);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} configuration error(s)", errors.len())
    }
}
