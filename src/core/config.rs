/// Configuration loading for the backup orchestrator
///
/// Values are layered: built-in defaults, then the `.env` file, then the
/// process environment. Command line overrides are applied to the resulting
/// `Config` by the CLI layer. The orchestrator only ever sees the final record.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::core::error::OrchestratorError;
use crate::utils::mask_sensitive;

pub const DEFAULT_BACKUP_DIR: &str = "./backups";
pub const DEFAULT_SENTINEL_TABLE: &str = "wp_posts";
pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_DB_NAME: &str = "wordpress";
pub const DEFAULT_DB_USER: &str = "root";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Keys read from the `.env` file and the environment
pub const CONFIG_KEYS: &[&str] = &[
    "BACKUP_DIR",
    "SENTINEL_TABLE",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_CONTAINER",
    "DB_BACKEND",
    "WP_PATH",
    "POLL_INTERVAL",
    "POLL_TIMEOUT",
    "PROBE_POLICY",
];

/// Client used to talk to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// mysql / mysqldump / mysqladmin
    Mysql,
    /// wp db (wp-cli)
    WpCli,
}

/// What to do when the sentinel row count cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProbePolicy {
    /// Abort with a probe failure
    Strict,
    /// Treat the store as empty and go down the restore path
    FailOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub container: Option<String>,
    pub backend: Backend,
    pub wp_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollConfig {
    #[serde(with = "humantime_serde_compat")]
    pub interval: Duration,
    #[serde(with = "humantime_serde_compat")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub backup_dir: PathBuf,
    pub sentinel_table: String,
    pub db: DbConfig,
    pub poll: PollConfig,
    pub probe_policy: ProbePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            sentinel_table: DEFAULT_SENTINEL_TABLE.to_string(),
            db: DbConfig {
                host: DEFAULT_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                name: DEFAULT_DB_NAME.to_string(),
                user: DEFAULT_DB_USER.to_string(),
                password: String::new(),
                container: None,
                backend: Backend::Mysql,
                wp_path: None,
            },
            poll: PollConfig {
                interval: DEFAULT_POLL_INTERVAL,
                timeout: DEFAULT_POLL_TIMEOUT,
            },
            probe_policy: ProbePolicy::Strict,
        }
    }
}

impl Config {
    /// Validate configuration, returning every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.poll.interval.is_zero() {
            errors.push("POLL_INTERVAL must be positive".to_string());
        }
        if self.poll.timeout.is_zero() {
            errors.push("POLL_TIMEOUT must be positive".to_string());
        }
        if self.poll.interval > self.poll.timeout {
            errors.push(format!(
                "POLL_INTERVAL ({}) exceeds POLL_TIMEOUT ({})",
                humantime::format_duration(self.poll.interval),
                humantime::format_duration(self.poll.timeout)
            ));
        }

        if self.sentinel_table.is_empty() {
            errors.push("SENTINEL_TABLE is not set".to_string());
        } else if !is_valid_table_name(&self.sentinel_table) {
            errors.push(format!("Invalid table name: {}", self.sentinel_table));
        }

        if self.db.port == 0 {
            errors.push("DB_PORT must be between 1 and 65535".to_string());
        }
        if self.db.name.is_empty() {
            errors.push("DB_NAME is not set".to_string());
        }
        if self.backup_dir.as_os_str().is_empty() {
            errors.push("BACKUP_DIR is not set".to_string());
        }

        errors
    }

    pub fn ensure_valid(&self) -> Result<(), OrchestratorError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidConfig(errors.join("; ")))
        }
    }

    /// Key/value rows for display, secrets masked
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        let password = if self.db.password.is_empty() {
            "<not set>".to_string()
        } else {
            mask_sensitive(&self.db.password, 1)
        };

        vec![
            ("BACKUP_DIR", self.backup_dir.display().to_string()),
            ("SENTINEL_TABLE", self.sentinel_table.clone()),
            ("DB_HOST", self.db.host.clone()),
            ("DB_PORT", self.db.port.to_string()),
            ("DB_NAME", self.db.name.clone()),
            ("DB_USER", self.db.user.clone()),
            ("DB_PASSWORD", password),
            (
                "DB_CONTAINER",
                self.db.container.clone().unwrap_or_else(|| "<host>".to_string()),
            ),
            ("DB_BACKEND", enum_name(self.db.backend)),
            (
                "WP_PATH",
                self.db.wp_path.clone().unwrap_or_else(|| "<not set>".to_string()),
            ),
            ("POLL_INTERVAL", humantime::format_duration(self.poll.interval).to_string()),
            ("POLL_TIMEOUT", humantime::format_duration(self.poll.timeout).to_string()),
            ("PROBE_POLICY", enum_name(self.probe_policy)),
        ]
    }
}

fn enum_name<T: ValueEnum>(value: T) -> String {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default()
}

/// Table identifier: `table` or `schema.table`, unquoted MySQL identifier characters
pub fn is_valid_table_name(name: &str) -> bool {
    static TABLE_RE: OnceLock<Regex> = OnceLock::new();
    let re = TABLE_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_$]+(\.[A-Za-z0-9_$]+)?$").expect("static regex")
    });
    re.is_match(name)
}

/// Parse a duration: bare integers are seconds, anything else goes through humantime
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|e| anyhow!("invalid duration '{}': {}", value, e))
}

/// Where a configuration value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    EnvFile,
    Environment,
}

#[derive(Debug, Clone)]
pub struct ConfigValue {
    pub value: String,
    pub source: ConfigSource,
}

/// Layered key/value view over the `.env` file and the environment
pub struct ConfigManager {
    env_file: Option<PathBuf>,
    values: HashMap<String, ConfigValue>,
}

impl ConfigManager {
    /// Load the `.env` file (if present) and overlay the process environment.
    ///
    /// A missing file is only an error when `required` is set, i.e. when the
    /// user named it explicitly.
    pub fn load<P: AsRef<Path>>(env_file: P, required: bool) -> Result<Self> {
        Self::load_with_env(env_file, required, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<P, F>(env_file: P, required: bool, env: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = env_file.as_ref();
        let mut values = HashMap::new();

        let env_file = if path.exists() {
            let entries = dotenv::from_path_iter(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            for entry in entries {
                let (key, value) =
                    entry.with_context(|| format!("Failed to parse {}", path.display()))?;
                values.insert(
                    key,
                    ConfigValue {
                        value,
                        source: ConfigSource::EnvFile,
                    },
                );
            }
            Some(path.to_path_buf())
        } else if required {
            return Err(anyhow!("env file not found at {}", path.display()));
        } else {
            None
        };

        for key in CONFIG_KEYS {
            if let Some(value) = env(key) {
                values.insert(
                    key.to_string(),
                    ConfigValue {
                        value,
                        source: ConfigSource::Environment,
                    },
                );
            }
        }

        Ok(Self { env_file, values })
    }

    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_deref()
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.value.as_str())
    }

    pub fn source(&self, key: &str) -> Option<ConfigSource> {
        self.values.get(key).map(|v| v.source)
    }

    /// Non-empty value, treating `KEY=` as unset
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Build the orchestrator configuration, applying defaults for missing keys
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config::default();

        if let Some(dir) = self.non_empty("BACKUP_DIR") {
            config.backup_dir = PathBuf::from(dir);
        }
        if let Some(table) = self.non_empty("SENTINEL_TABLE") {
            config.sentinel_table = table.to_string();
        }
        if let Some(host) = self.non_empty("DB_HOST") {
            config.db.host = host.to_string();
        }
        if let Some(port) = self.non_empty("DB_PORT") {
            config.db.port = port
                .parse()
                .with_context(|| format!("DB_PORT is not a valid port: {}", port))?;
        }
        if let Some(name) = self.non_empty("DB_NAME") {
            config.db.name = name.to_string();
        }
        if let Some(user) = self.non_empty("DB_USER") {
            config.db.user = user.to_string();
        }
        if let Some(password) = self.get("DB_PASSWORD") {
            config.db.password = password.to_string();
        }
        config.db.container = self.non_empty("DB_CONTAINER").map(str::to_string);
        if let Some(backend) = self.non_empty("DB_BACKEND") {
            config.db.backend = Backend::from_str(backend, true)
                .map_err(|e| anyhow!("DB_BACKEND: {}", e))?;
        }
        config.db.wp_path = self.non_empty("WP_PATH").map(str::to_string);
        if let Some(interval) = self.non_empty("POLL_INTERVAL") {
            config.poll.interval = parse_duration(interval).context("POLL_INTERVAL")?;
        }
        if let Some(timeout) = self.non_empty("POLL_TIMEOUT") {
            config.poll.timeout = parse_duration(timeout).context("POLL_TIMEOUT")?;
        }
        if let Some(policy) = self.non_empty("PROBE_POLICY") {
            config.probe_policy = ProbePolicy::from_str(policy, true)
                .map_err(|e| anyhow!("PROBE_POLICY: {}", e))?;
        }

        Ok(config)
    }
}

/// Serialize durations in humantime form for `config --json`
mod humantime_serde_compat {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }
}
