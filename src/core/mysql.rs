/// MySQL/MariaDB data store over the stock client tools
///
/// `mysqladmin ping` for readiness, `mysql -N -B -e` for the sentinel count,
/// `mysqldump` for exports and `mysql` fed from a file for imports.

use async_trait::async_trait;
use std::path::Path;

use crate::core::config::DbConfig;
use crate::core::exec::{CommandRunner, Invocation};
use crate::core::store::{parse_count, DataStore, StoreError};

#[derive(Debug, Clone)]
pub struct MysqlStore {
    runner: CommandRunner,
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
}

impl MysqlStore {
    pub fn new(runner: CommandRunner, config: &DbConfig) -> Self {
        Self {
            runner,
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.name.clone(),
        }
    }

    /// Client invocation with connection flags; the password travels in `MYSQL_PWD`
    fn client(&self, program: &str) -> Invocation {
        let inv = Invocation::new(program)
            .arg(format!("--host={}", self.host))
            .arg(format!("--port={}", self.port))
            .arg(format!("--user={}", self.user));

        if self.password.is_empty() {
            inv
        } else {
            inv.env("MYSQL_PWD", &self.password)
        }
    }

    pub fn ping_invocation(&self) -> Invocation {
        self.client("mysqladmin").args(["ping", "--silent"])
    }

    pub fn count_invocation(&self, table: &str) -> Invocation {
        self.client("mysql")
            .args(["--batch", "--skip-column-names", "-e"])
            .arg(format!("SELECT COUNT(*) FROM {}", quote_table(table)))
            .arg(&self.database)
    }

    pub fn export_invocation(&self) -> Invocation {
        self.client("mysqldump")
            .args([
                "--single-transaction",
                "--routines",
                "--triggers",
                "--add-drop-table",
            ])
            .arg(&self.database)
    }

    pub fn import_invocation(&self) -> Invocation {
        self.client("mysql").arg(&self.database)
    }
}

/// Backtick-quote `table` or `schema.table`; names are validated upstream
pub fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

#[async_trait]
impl DataStore for MysqlStore {
    fn describe(&self) -> String {
        let base = format!(
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        );
        match self.runner.container() {
            Some(container) => format!("{} (in {})", base, container),
            None => base,
        }
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        match self.runner.output(&self.ping_invocation()).await {
            Ok(_) => Ok(true),
            Err(StoreError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        let inv = self.count_invocation(table);
        let output = self.runner.output(&inv).await?;
        parse_count(&inv.program, &output)
    }

    async fn export(&self, path: &Path) -> Result<(), StoreError> {
        self.runner
            .output_to_file(&self.export_invocation(), path)
            .await
    }

    async fn import(&self, path: &Path) -> Result<(), StoreError> {
        self.runner
            .input_from_file(&self.import_invocation(), path)
            .await
    }
}
