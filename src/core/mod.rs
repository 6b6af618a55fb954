pub mod backup;
pub mod config;
pub mod docker;
pub mod error;
pub mod exec;
pub mod mysql;
pub mod poller;
pub mod store;
pub mod wpcli;

pub use backup::{BackupManager, Orchestrator, Outcome};
pub use config::{Config, ConfigManager};
pub use error::OrchestratorError;
pub use poller::{Probe, ReadinessPoller};
pub use store::DataStore;

use config::{Backend, DbConfig};
use exec::CommandRunner;

/// Build the data store described by the configuration
pub fn open_store(config: &DbConfig) -> Box<dyn DataStore> {
    let runner = match &config.container {
        Some(container) => CommandRunner::in_container(container.clone()),
        None => CommandRunner::host(),
    };

    match config.backend {
        Backend::Mysql => Box::new(mysql::MysqlStore::new(runner, config)),
        Backend::WpCli => Box::new(wpcli::WpCliStore::new(runner, config)),
    }
}
