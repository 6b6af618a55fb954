/// CLI argument parsing

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use wpdev_cli::core::config::{parse_duration, Backend, Config, ProbePolicy};

pub const VERSION_WITH_BUILD: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built: ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "wpdev-cli")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Env file with configuration (defaults to ./.env when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Command line overrides, applied on top of the env file and environment
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Backup directory [env: BACKUP_DIR]
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Sentinel table whose row count decides restore vs export [env: SENTINEL_TABLE]
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Poll interval, e.g. 2 or 500ms [env: POLL_INTERVAL]
    #[arg(long, global = true, value_parser = duration_arg)]
    pub interval: Option<Duration>,

    /// Readiness timeout, e.g. 60 or 2m [env: POLL_TIMEOUT]
    #[arg(long, global = true, value_parser = duration_arg)]
    pub timeout: Option<Duration>,

    /// Treat a failed row count as an empty store
    #[arg(long, global = true)]
    pub fail_open: bool,

    /// Run database clients inside this container [env: DB_CONTAINER]
    #[arg(long, global = true)]
    pub container: Option<String>,

    /// Database client [env: DB_BACKEND]
    #[arg(long, global = true, value_enum)]
    pub backend: Option<Backend>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.backup_dir {
            config.backup_dir = dir.clone();
        }
        if let Some(table) = &self.table {
            config.sentinel_table = table.clone();
        }
        if let Some(interval) = self.interval {
            config.poll.interval = interval;
        }
        if let Some(timeout) = self.timeout {
            config.poll.timeout = timeout;
        }
        if self.fail_open {
            config.probe_policy = ProbePolicy::FailOpen;
        }
        if let Some(container) = &self.container {
            config.db.container = Some(container.clone());
        }
        if let Some(backend) = self.backend {
            config.db.backend = backend;
        }
    }
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wait for the database, then restore the latest backup if it is empty or back it up if not
    Sync,

    /// Wait until the database accepts connections
    Wait,

    /// Wait for the database, then write a new backup
    Export,

    /// Wait for the database, then import a backup
    Restore {
        /// Backup file (path, or name inside the backup directory); latest if omitted
        file: Option<PathBuf>,
    },

    /// List backups, newest first
    List,

    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "wpdev-cli",
            "--backup-dir",
            "/tmp/b",
            "sync",
            "--timeout",
            "2m",
            "--fail-open",
            "--backend",
            "wp-cli",
        ]);
        assert!(matches!(cli.command, Commands::Sync));

        let mut config = Config::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.backup_dir, PathBuf::from("/tmp/b"));
        assert_eq!(config.poll.timeout, Duration::from_secs(120));
        assert_eq!(config.probe_policy, ProbePolicy::FailOpen);
        assert_eq!(config.db.backend, Backend::WpCli);
        assert_eq!(config.sentinel_table, "wp_posts");
    }

    #[test]
    fn test_restore_file_argument() {
        let cli = Cli::parse_from(["wpdev-cli", "restore", "db-backup-2024-05-17-143000.sql"]);
        match cli.command {
            Commands::Restore { file } => assert_eq!(
                file,
                Some(PathBuf::from("db-backup-2024-05-17-143000.sql"))
            ),
            _ => panic!("expected restore"),
        }
    }
}
