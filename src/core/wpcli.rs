/// Data store over `wp db` (wp-cli)
///
/// wp-cli reads the database credentials from wp-config.php, so only the
/// WordPress path is needed. Dumps are streamed through stdin/stdout (`-`),
/// which keeps backup files on the host even when wp runs in a container.

use async_trait::async_trait;
use std::path::Path;

use crate::core::config::DbConfig;
use crate::core::exec::{CommandRunner, Invocation};
use crate::core::mysql::quote_table;
use crate::core::store::{parse_count, DataStore, StoreError};

#[derive(Debug, Clone)]
pub struct WpCliStore {
    runner: CommandRunner,
    wp_path: Option<String>,
}

impl WpCliStore {
    pub fn new(runner: CommandRunner, config: &DbConfig) -> Self {
        Self {
            runner,
            wp_path: config.wp_path.clone(),
        }
    }

    fn wp(&self, subcommand: &[&str]) -> Invocation {
        let mut inv = Invocation::new("wp").args(subcommand.iter().copied());
        if let Some(path) = &self.wp_path {
            inv = inv.arg(format!("--path={}", path));
        }
        // WordPress images run wp-cli as root
        if self.runner.container().is_some() {
            inv = inv.arg("--allow-root");
        }
        inv
    }

    pub fn count_invocation(&self, table: &str) -> Invocation {
        let query = format!("SELECT COUNT(*) FROM {}", quote_table(table));
        self.wp(&["db", "query", query.as_str(), "--skip-column-names"])
    }
}

#[async_trait]
impl DataStore for WpCliStore {
    fn describe(&self) -> String {
        let path = self.wp_path.as_deref().unwrap_or(".");
        match self.runner.container() {
            Some(container) => format!("wp db at {} (in {})", path, container),
            None => format!("wp db at {}", path),
        }
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        match self.runner.output(&self.wp(&["db", "query", "SELECT 1"])).await {
            Ok(_) => Ok(true),
            Err(StoreError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        let output = self.runner.output(&self.count_invocation(table)).await?;
        parse_count("wp", &output)
    }

    async fn export(&self, path: &Path) -> Result<(), StoreError> {
        self.runner
            .output_to_file(&self.wp(&["db", "export", "-"]), path)
            .await
    }

    async fn import(&self, path: &Path) -> Result<(), StoreError> {
        self.runner
            .input_from_file(&self.wp(&["db", "import", "-"]), path)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    #[test]
    fn test_count_invocation_on_host() {
        let mut config = Config::default();
        config.db.wp_path = Some("/var/www/html".to_string());
        let store = WpCliStore::new(CommandRunner::host(), &config.db);

        let inv = store.count_invocation("wp_options");
        assert_eq!(inv.program, "wp");
        assert_eq!(
            inv.args,
            vec![
                "db",
                "query",
                "SELECT COUNT(*) FROM `wp_options`",
                "--skip-column-names",
                "--path=/var/www/html",
            ]
        );
    }

    #[test]
    fn test_container_adds_allow_root() {
        let config = Config::default();
        let store = WpCliStore::new(CommandRunner::in_container("wp-app"), &config.db);
        let inv = store.count_invocation("wp_posts");
        assert_eq!(inv.args.last().map(String::as_str), Some("--allow-root"));
        assert_eq!(store.describe(), "wp db at . (in wp-app)");
    }
}
