/// Database backup and restore
///
/// A run decides between three outcomes from a single read of the sentinel
/// table's row count:
/// - empty store, backup available: import the most recently modified `.sql`
/// - empty store, no backup: nothing to do, the store starts empty
/// - store has data: export it to a new `db-backup-<timestamp>.sql`
///
/// Artifacts are never overwritten. Exports are written to `<name>.partial`
/// and renamed once the dump completes, so an interrupted export cannot be
/// picked up as the latest backup.

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::core::config::{Config, ProbePolicy};
use crate::core::error::{OrchestratorError, Result};
use crate::core::poller::{Readiness, ReadinessPoller, StoreProbe};
use crate::core::store::DataStore;

pub const ARTIFACT_PREFIX: &str = "db-backup-";
pub const ARTIFACT_EXTENSION: &str = "sql";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";
const PARTIAL_SUFFIX: &str = ".partial";

/// `db-backup-YYYY-MM-DD-HHMMSS.sql`
pub fn artifact_name(now: NaiveDateTime) -> String {
    format!(
        "{}{}.{}",
        ARTIFACT_PREFIX,
        now.format(TIMESTAMP_FORMAT),
        ARTIFACT_EXTENSION
    )
}

/// Timestamp embedded in a canonical artifact name
pub fn parse_artifact_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| {
        Regex::new(r"^db-backup-(\d{4}-\d{2}-\d{2}-\d{6})\.sql$").expect("static regex")
    });
    let caps = re.captures(file_name)?;
    NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Local>,
    /// From the file name; `None` for `.sql` files not named by this tool
    pub timestamp: Option<NaiveDateTime>,
}

impl BackupArtifact {
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| OrchestratorError::io(path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| OrchestratorError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            timestamp: parse_artifact_timestamp(&file_name),
            file_name,
            size_bytes: metadata.len(),
            modified: DateTime::<Local>::from(modified),
        })
    }
}

/// Result of a backup-or-restore run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Restored { artifact: BackupArtifact },
    Exported { artifact: BackupArtifact },
    StartedEmpty { backup_dir: PathBuf },
}

/// Read/append access to the backup directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All `.sql` artifacts, most recently modified first.
    ///
    /// A missing directory is an empty backup set.
    pub fn list(&self) -> Result<Vec<BackupArtifact>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OrchestratorError::io(&self.dir, e)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| OrchestratorError::io(&self.dir, e))?;
            let path = entry.path();
            let is_sql = path
                .extension()
                .map(|ext| ext == ARTIFACT_EXTENSION)
                .unwrap_or(false);
            if !is_sql || !path.is_file() {
                continue;
            }
            artifacts.push(BackupArtifact::from_path(&path)?);
        }

        artifacts.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(artifacts)
    }

    /// Most recently modified artifact
    pub fn latest(&self) -> Result<Option<BackupArtifact>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Resolve a user-supplied restore file, as given or relative to the backup directory
    pub fn resolve(&self, file: &Path) -> Result<BackupArtifact> {
        if file.is_file() {
            return BackupArtifact::from_path(file);
        }
        let in_dir = self.dir.join(file);
        if in_dir.is_file() {
            return BackupArtifact::from_path(&in_dir);
        }
        Err(OrchestratorError::io(
            file,
            io::Error::new(io::ErrorKind::NotFound, "backup file not found"),
        ))
    }

    /// Export `store` into a new artifact named after `now`
    pub async fn export_new(
        &self,
        store: &dyn DataStore,
        now: NaiveDateTime,
    ) -> Result<BackupArtifact> {
        fs::create_dir_all(&self.dir).map_err(|e| OrchestratorError::io(&self.dir, e))?;

        let name = artifact_name(now);
        let target = self.dir.join(&name);
        if target.exists() {
            return Err(OrchestratorError::ArtifactExists { path: target });
        }

        let partial = self.dir.join(format!("{}{}", name, PARTIAL_SUFFIX));
        info!(path = %target.display(), "exporting database");

        if let Err(e) = store.export(&partial).await {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        // Another run may have taken the name while the dump was running
        if target.exists() {
            let _ = fs::remove_file(&partial);
            return Err(OrchestratorError::ArtifactExists { path: target });
        }
        finalize(&partial, &target)?;

        BackupArtifact::from_path(&target)
    }
}

/// Move a completed dump into place; the partial file never outlives a failure
fn finalize(partial: &Path, target: &Path) -> Result<()> {
    fs::rename(partial, target).map_err(|e| {
        let _ = fs::remove_file(partial);
        OrchestratorError::io(target, e)
    })
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Backup-or-restore orchestrator for one data store
pub struct Orchestrator<'a> {
    store: &'a dyn DataStore,
    backups: BackupManager,
    sentinel_table: String,
    policy: ProbePolicy,
    clock: Clock,
}

impl<'a> Orchestrator<'a> {
    pub fn new(store: &'a dyn DataStore, config: &Config) -> Self {
        Self {
            store,
            backups: BackupManager::new(&config.backup_dir),
            sentinel_table: config.sentinel_table.clone(),
            policy: config.probe_policy,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the clock used to name artifacts
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Block until the store answers pings
    pub async fn wait_ready(&self, poller: &ReadinessPoller) -> Result<Readiness> {
        poller.wait_for(&StoreProbe::new(self.store)).await
    }

    /// Wait for readiness, then backup-or-restore
    pub async fn run(&self, poller: &ReadinessPoller) -> Result<Outcome> {
        self.wait_ready(poller).await?;
        self.sync().await
    }

    /// Restore the latest backup into an empty store, or back up a populated one
    pub async fn sync(&self) -> Result<Outcome> {
        let rows = match self.store.row_count(&self.sentinel_table).await {
            Ok(rows) => rows,
            Err(source) if source.is_missing_table() => {
                info!(table = %self.sentinel_table, "sentinel table missing, treating store as empty");
                0
            }
            Err(source) => match self.policy {
                ProbePolicy::Strict => {
                    return Err(OrchestratorError::ProbeFailed {
                        table: self.sentinel_table.clone(),
                        source,
                    })
                }
                ProbePolicy::FailOpen => {
                    warn!(
                        table = %self.sentinel_table,
                        error = %source,
                        "row count failed, treating store as empty"
                    );
                    0
                }
            },
        };

        info!(table = %self.sentinel_table, rows, store = %self.store.describe(), "sentinel row count");

        if rows > 0 {
            return self.export().await;
        }

        match self.backups.latest()? {
            Some(artifact) => self.import(artifact).await,
            None => {
                info!(dir = %self.backups.dir().display(), "no backup available, starting empty");
                Ok(Outcome::StartedEmpty {
                    backup_dir: self.backups.dir().to_path_buf(),
                })
            }
        }
    }

    /// Export unconditionally
    pub async fn export(&self) -> Result<Outcome> {
        let artifact = self.backups.export_new(self.store, (self.clock)()).await?;
        info!(path = %artifact.path.display(), size = artifact.size_bytes, "backup written");
        Ok(Outcome::Exported { artifact })
    }

    /// Restore `file`, or the latest artifact when no file is given
    pub async fn restore(&self, file: Option<&Path>) -> Result<Outcome> {
        let artifact = match file {
            Some(file) => self.backups.resolve(file)?,
            None => self
                .backups
                .latest()?
                .ok_or_else(|| OrchestratorError::NoBackupAvailable {
                    dir: self.backups.dir().to_path_buf(),
                })?,
        };
        self.import(artifact).await
    }

    async fn import(&self, artifact: BackupArtifact) -> Result<Outcome> {
        info!(path = %artifact.path.display(), store = %self.store.describe(), "restoring backup");
        self.store.import(&artifact.path).await?;
        Ok(Outcome::Restored { artifact })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exec::{CommandRunner, Invocation};
    use crate::core::store::{parse_count, MockDataStore, StoreError};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn config(dir: &Path, policy: ProbePolicy) -> Config {
        let mut config = Config::default();
        config.backup_dir = dir.to_path_buf();
        config.probe_policy = policy;
        config
    }

    fn mock_store() -> MockDataStore {
        let mut store = MockDataStore::new();
        store.expect_describe().return_const("mock-db".to_string());
        store
    }

    fn write_with_mtime(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("-- {}\n", name)).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    fn sql_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name(at(9, 5, 3)), "db-backup-2024-05-17-090503.sql");
        assert_eq!(
            parse_artifact_timestamp("db-backup-2024-05-17-090503.sql"),
            Some(at(9, 5, 3))
        );
        assert_eq!(parse_artifact_timestamp("manual-dump.sql"), None);
        assert_eq!(parse_artifact_timestamp("db-backup-2024-05-17-090503.sql.partial"), None);
    }

    #[test]
    fn test_list_orders_by_mtime_and_skips_non_sql() {
        let dir = TempDir::new().unwrap();
        // Name order deliberately disagrees with mtime order
        write_with_mtime(dir.path(), "db-backup-2024-01-03-000000.sql", 300);
        write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 10);
        write_with_mtime(dir.path(), "manual.sql", 100);
        write_with_mtime(dir.path(), "db-backup-2024-01-04-000000.sql.partial", 0);
        write_with_mtime(dir.path(), "notes.txt", 0);
        fs::create_dir(dir.path().join("old.sql")).unwrap();

        let listed: Vec<String> = BackupManager::new(dir.path())
            .list()
            .unwrap()
            .into_iter()
            .map(|a| a.file_name)
            .collect();
        assert_eq!(
            listed,
            vec![
                "db-backup-2024-01-01-000000.sql",
                "manual.sql",
                "db-backup-2024-01-03-000000.sql",
            ]
        );
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::new(dir.path().join("nope"));
        assert!(manager.list().unwrap().is_empty());
        assert!(manager.latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_store_restores_newest_backup() {
        let dir = TempDir::new().unwrap();
        write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 3000);
        let newest = write_with_mtime(dir.path(), "db-backup-2024-01-02-000000.sql", 60);
        write_with_mtime(dir.path(), "db-backup-2024-01-03-000000.sql", 600);

        let mut store = mock_store();
        store.expect_row_count().times(1).returning(|_| Ok(0));
        let expected = newest.clone();
        store
            .expect_import()
            .withf(move |p| p == expected.as_path())
            .times(1)
            .returning(|_| Ok(()));
        store.expect_export().never();

        let config = config(dir.path(), ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config).sync().await.unwrap();
        match outcome {
            Outcome::Restored { artifact } => assert_eq!(artifact.path, newest),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_store_without_backups_starts_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_row_count().times(1).returning(|_| Ok(0));
        store.expect_import().never();
        store.expect_export().never();

        let config = config(dir.path(), ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config).sync().await.unwrap();
        assert_eq!(
            outcome,
            Outcome::StartedEmpty {
                backup_dir: dir.path().to_path_buf()
            }
        );
        assert!(sql_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_populated_store_exports_one_new_file() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let mut store = mock_store();
        store
            .expect_row_count()
            .withf(|t| t == "wp_posts")
            .times(1)
            .returning(|_| Ok(12));
        store.expect_import().never();
        store.expect_export().times(1).returning(|path| {
            fs::write(path, "-- dump\n").unwrap();
            Ok(())
        });

        let config = config(&backups, ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config)
            .with_clock(|| at(14, 30, 0))
            .sync()
            .await
            .unwrap();

        match outcome {
            Outcome::Exported { artifact } => {
                assert_eq!(artifact.file_name, "db-backup-2024-05-17-143000.sql");
                assert_eq!(artifact.timestamp, Some(at(14, 30, 0)));
                assert_eq!(artifact.size_bytes, 8);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(sql_files(&backups), vec!["db-backup-2024-05-17-143000.sql"]);
    }

    #[tokio::test]
    async fn test_exports_a_second_apart_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Ok(1));
        store.expect_export().times(2).returning(|path| {
            fs::write(path, "-- dump\n").unwrap();
            Ok(())
        });

        let tick = Arc::new(AtomicI64::new(0));
        let clock_tick = Arc::clone(&tick);
        let config = config(dir.path(), ProbePolicy::Strict);
        let orchestrator = Orchestrator::new(&store, &config).with_clock(move || {
            let n = clock_tick.fetch_add(1, Ordering::SeqCst);
            at(8, 0, 0) + chrono::Duration::seconds(n)
        });

        orchestrator.sync().await.unwrap();
        orchestrator.sync().await.unwrap();
        assert_eq!(
            sql_files(dir.path()),
            vec![
                "db-backup-2024-05-17-080000.sql",
                "db-backup-2024-05-17-080001.sql",
            ]
        );
    }

    #[tokio::test]
    async fn test_exports_in_same_second_collide() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Ok(1));
        store.expect_export().times(1).returning(|path| {
            fs::write(path, "-- first\n").unwrap();
            Ok(())
        });

        let config = config(dir.path(), ProbePolicy::Strict);
        let orchestrator = Orchestrator::new(&store, &config).with_clock(|| at(8, 0, 0));

        orchestrator.sync().await.unwrap();
        let err = orchestrator.sync().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ArtifactExists { .. }));

        let kept = dir.path().join("db-backup-2024-05-17-080000.sql");
        assert_eq!(fs::read_to_string(kept).unwrap(), "-- first\n");
    }

    #[tokio::test]
    async fn test_failed_export_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Ok(3));
        store.expect_export().times(1).returning(|path| {
            fs::write(path, "-- trunc").unwrap();
            Err(StoreError::CommandFailed {
                program: "mysqldump".to_string(),
                status: "exit status: 2".to_string(),
                stderr: "Got error: 2013".to_string(),
            })
        });

        let config = config(dir.path(), ProbePolicy::Strict);
        let err = Orchestrator::new(&store, &config).sync().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ExternalCommand(_)));
        assert!(sql_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_import_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 10);
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Ok(0));
        store.expect_import().times(1).returning(|_| {
            Err(StoreError::CommandFailed {
                program: "mysql".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR 1064".to_string(),
            })
        });

        let config = config(dir.path(), ProbePolicy::Strict);
        let err = Orchestrator::new(&store, &config).sync().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ExternalCommand(_)));
    }

    fn failing_count() -> StoreError {
        StoreError::CommandFailed {
            program: "mysql".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "ERROR 2013 (HY000): Lost connection to MySQL server during query".to_string(),
        }
    }

    fn missing_table() -> StoreError {
        StoreError::CommandFailed {
            program: "mysql".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "ERROR 1146 (42S02) at line 1: Table 'wordpress.wp_posts' doesn't exist"
                .to_string(),
        }
    }

    #[tokio::test]
    async fn test_strict_policy_surfaces_probe_failure() {
        let dir = TempDir::new().unwrap();
        write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 10);
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Err(failing_count()));
        store.expect_import().never();
        store.expect_export().never();

        let config = config(dir.path(), ProbePolicy::Strict);
        let err = Orchestrator::new(&store, &config).sync().await.unwrap_err();
        match err {
            OrchestratorError::ProbeFailed { table, .. } => assert_eq!(table, "wp_posts"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fail_open_policy_restores() {
        let dir = TempDir::new().unwrap();
        let backup = write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 10);
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Err(failing_count()));
        store.expect_import().times(1).returning(|_| Ok(()));
        store.expect_export().never();

        let config = config(dir.path(), ProbePolicy::FailOpen);
        let outcome = Orchestrator::new(&store, &config).sync().await.unwrap();
        assert!(matches!(outcome, Outcome::Restored { artifact } if artifact.path == backup));
    }

    #[tokio::test]
    async fn test_fresh_database_restores_under_strict_policy() {
        let dir = TempDir::new().unwrap();
        let backup = write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 10);
        let mut store = mock_store();
        store.expect_row_count().times(1).returning(|_| Err(missing_table()));
        let expected = backup.clone();
        store
            .expect_import()
            .withf(move |p| p == expected.as_path())
            .times(1)
            .returning(|_| Ok(()));
        store.expect_export().never();

        let config = Config {
            backup_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        assert_eq!(config.probe_policy, ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config).sync().await.unwrap();
        assert!(matches!(outcome, Outcome::Restored { artifact } if artifact.path == backup));
    }

    #[tokio::test]
    async fn test_fresh_database_without_backups_starts_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_row_count().returning(|_| Err(missing_table()));
        store.expect_import().never();
        store.expect_export().never();

        let config = config(dir.path(), ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config).sync().await.unwrap();
        assert!(matches!(outcome, Outcome::StartedEmpty { .. }));
    }

    #[test]
    fn test_failed_rename_removes_partial() {
        let dir = TempDir::new().unwrap();
        let partial = dir.path().join("db-backup-2024-05-17-080000.sql.partial");
        fs::write(&partial, "-- dump\n").unwrap();
        let target = dir.path().join("gone").join("db-backup-2024-05-17-080000.sql");

        let err = finalize(&partial, &target).unwrap_err();
        assert!(matches!(err, OrchestratorError::Io { .. }));
        assert!(!partial.exists());
        assert!(!target.exists());
    }

    /// Store backed by real shell commands through `CommandRunner`
    struct ShellStore {
        runner: CommandRunner,
        rows: u64,
        dump: &'static str,
        imported: PathBuf,
    }

    #[async_trait::async_trait]
    impl DataStore for ShellStore {
        fn describe(&self) -> String {
            "sh".to_string()
        }

        async fn ping(&self) -> std::result::Result<bool, StoreError> {
            self.runner
                .output(&Invocation::new("true"))
                .await
                .map(|_| true)
        }

        async fn row_count(&self, _table: &str) -> std::result::Result<u64, StoreError> {
            let script = format!("echo {}", self.rows);
            let out = self
                .runner
                .output(&Invocation::new("sh").args(["-c", script.as_str()]))
                .await?;
            parse_count("sh", &out)
        }

        async fn export(&self, path: &Path) -> std::result::Result<(), StoreError> {
            let script = format!("printf '%s' \"{}\"", self.dump);
            self.runner
                .output_to_file(&Invocation::new("sh").args(["-c", script.as_str()]), path)
                .await
        }

        async fn import(&self, path: &Path) -> std::result::Result<(), StoreError> {
            let script = format!("cat > '{}'", self.imported.display());
            self.runner
                .input_from_file(&Invocation::new("sh").args(["-c", script.as_str()]), path)
                .await
        }
    }

    const DUMP: &str = "INSERT INTO wp_posts VALUES (1,'Hello world');\n";

    #[tokio::test]
    async fn test_real_commands_export_dump_bytes() {
        let dir = TempDir::new().unwrap();
        let store = ShellStore {
            runner: CommandRunner::host(),
            rows: 4,
            dump: DUMP,
            imported: dir.path().join("imported.sql"),
        };

        let config = config(&dir.path().join("backups"), ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config)
            .with_clock(|| at(11, 3, 8))
            .sync()
            .await
            .unwrap();

        let artifact = match outcome {
            Outcome::Exported { artifact } => artifact,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(artifact.size_bytes, DUMP.len() as u64);
        assert_eq!(fs::read_to_string(&artifact.path).unwrap(), DUMP);
    }

    #[tokio::test]
    async fn test_real_commands_restore_feeds_backup_to_stdin() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        fs::create_dir(&backups).unwrap();
        fs::write(backups.join("db-backup-2024-05-17-110308.sql"), DUMP).unwrap();

        let imported = dir.path().join("imported.sql");
        let store = ShellStore {
            runner: CommandRunner::host(),
            rows: 0,
            dump: "",
            imported: imported.clone(),
        };

        let config = config(&backups, ProbePolicy::Strict);
        let outcome = Orchestrator::new(&store, &config).sync().await.unwrap();
        assert!(matches!(outcome, Outcome::Restored { .. }));
        assert_eq!(fs::read_to_string(&imported).unwrap(), DUMP);
    }

    #[tokio::test]
    async fn test_explicit_restore() {
        let dir = TempDir::new().unwrap();
        write_with_mtime(dir.path(), "db-backup-2024-01-02-000000.sql", 10);
        let older = write_with_mtime(dir.path(), "db-backup-2024-01-01-000000.sql", 500);

        let mut store = mock_store();
        store.expect_row_count().never();
        let expected = older.clone();
        store
            .expect_import()
            .withf(move |p| p == expected.as_path())
            .times(1)
            .returning(|_| Ok(()));

        let config = config(dir.path(), ProbePolicy::Strict);
        let orchestrator = Orchestrator::new(&store, &config);
        // Bare file names resolve inside the backup directory
        let outcome = orchestrator
            .restore(Some(Path::new("db-backup-2024-01-01-000000.sql")))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Restored { .. }));

        let err = orchestrator
            .restore(Some(Path::new("missing.sql")))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Io { .. }));
    }

    #[tokio::test]
    async fn test_restore_latest_requires_a_backup() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_import().never();

        let config = config(dir.path(), ProbePolicy::Strict);
        let err = Orchestrator::new(&store, &config)
            .restore(None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoBackupAvailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_then_decides() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        let mut pings = 0;
        store.expect_ping().returning(move || {
            pings += 1;
            Ok(pings > 2)
        });
        store.expect_row_count().times(1).returning(|_| Ok(0));

        let config = config(dir.path(), ProbePolicy::Strict);
        let poller = ReadinessPoller::new(Duration::from_secs(1), Duration::from_secs(5)).unwrap();
        let outcome = Orchestrator::new(&store, &config).run(&poller).await.unwrap();
        assert!(matches!(outcome, Outcome::StartedEmpty { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out_without_touching_store() {
        let dir = TempDir::new().unwrap();
        let mut store = mock_store();
        store.expect_ping().returning(|| Ok(false));
        store.expect_row_count().never();

        let config = config(dir.path(), ProbePolicy::Strict);
        let poller = ReadinessPoller::new(Duration::from_secs(1), Duration::from_secs(3)).unwrap();
        let err = Orchestrator::new(&store, &config).run(&poller).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout { .. }));
    }
}
