//! Backup-or-restore orchestration for local WordPress database containers

pub mod core;
pub mod utils;
