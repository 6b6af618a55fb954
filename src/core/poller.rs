/// Readiness polling
///
/// Blocks until a probe reports ready or the timeout elapses. Probes are
/// invoked at a fixed interval; probe errors (connection refused, container
/// missing, ...) count as "not ready yet" and never abort the wait.
///
/// Time comes from the tokio clock, so tests can run with a paused clock and
/// observe exact elapsed times without sleeping.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::core::config::PollConfig;
use crate::core::error::{OrchestratorError, Result};
use crate::core::store::DataStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Probe: Send + Sync {
    /// What is being waited on, for logs and errors
    fn name(&self) -> String;

    async fn check(&self) -> anyhow::Result<bool>;
}

/// Probe backed by the data store's own ping
pub struct StoreProbe<'a> {
    store: &'a dyn DataStore,
}

impl<'a> StoreProbe<'a> {
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<'a> Probe for StoreProbe<'a> {
    fn name(&self) -> String {
        self.store.describe()
    }

    async fn check(&self) -> anyhow::Result<bool> {
        Ok(self.store.ping().await?)
    }
}

/// Result of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    interval: Duration,
    timeout: Duration,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(OrchestratorError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        if timeout.is_zero() {
            return Err(OrchestratorError::InvalidConfig(
                "poll timeout must be positive".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    pub fn from_config(config: &PollConfig) -> Result<Self> {
        Self::new(config.interval, config.timeout)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `probe` until it reports ready.
    ///
    /// Each probe call is bounded by the remaining budget, and the last sleep
    /// is shortened to land on the deadline, so a failing wait returns no
    /// later than `timeout` after the start. No probe is started once the
    /// budget is spent.
    pub async fn wait_for(&self, probe: &dyn Probe) -> Result<Readiness> {
        let target = probe.name();
        let start = Instant::now();
        let mut attempts: u32 = 0;

        info!(
            probe = %target,
            interval = %humantime::format_duration(self.interval),
            timeout = %humantime::format_duration(self.timeout),
            "waiting for readiness"
        );

        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(OrchestratorError::Timeout {
                    target,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }

            attempts += 1;

            match time::timeout(remaining, probe.check()).await {
                Ok(Ok(true)) => {
                    let elapsed = start.elapsed();
                    info!(probe = %target, attempts, elapsed = ?elapsed, "ready");
                    return Ok(Readiness { attempts, elapsed });
                }
                Ok(Ok(false)) => debug!(probe = %target, attempt = attempts, "not ready"),
                Ok(Err(e)) => {
                    debug!(probe = %target, attempt = attempts, error = %e, "probe failed, not ready yet")
                }
                Err(_) => debug!(probe = %target, attempt = attempts, "probe timed out"),
            }

            let remaining = self.timeout.saturating_sub(start.elapsed());
            time::sleep(self.interval.min(remaining)).await;
        }
    }
}
