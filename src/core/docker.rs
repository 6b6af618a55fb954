/// Docker integration
///
/// Container lifecycle belongs to the compose scripts; this module only
/// inspects the database container so the orchestrator can wait for it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::Docker;

use crate::core::poller::Probe;
use crate::utils::ContainerState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    /// Docker healthcheck status, `None` when the container defines no healthcheck
    pub health: Option<String>,
}

impl ContainerStatus {
    /// Running, and healthy if a healthcheck is defined
    pub fn is_ready(&self) -> bool {
        self.state.is_running()
            && match self.health.as_deref() {
                None | Some("") | Some("none") => true,
                Some(status) => status == "healthy",
            }
    }
}

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker })
    }

    /// Check if Docker daemon is accessible
    pub async fn check_docker(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// Inspect a container by name; `Ok(None)` if it does not exist
    pub async fn container_status(&self, name: &str) -> Result<Option<ContainerStatus>> {
        let inspect = match self.docker.inspect_container(name, None).await {
            Ok(inspect) => inspect,
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to inspect container {}", name))
            }
        };

        let state = inspect.state.as_ref();
        let status = state.and_then(|s| s.status.as_ref()).map(|s| s.to_string());
        let running = state.and_then(|s| s.running).unwrap_or(false);
        let current = container_state(status.as_deref(), running);

        let health = state
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status.as_ref())
            .map(|s| s.to_string());

        Ok(Some(ContainerStatus {
            name: name.to_string(),
            state: current,
            health,
        }))
    }
}

/// Docker keeps `Running: true` while a container is paused or restarting,
/// so the status string wins and the flag only fills in when it is absent.
fn container_state(status: Option<&str>, running: bool) -> ContainerState {
    match status {
        Some(status) if !status.is_empty() => ContainerState::from(status),
        _ if running => ContainerState::Running,
        _ => ContainerState::Unknown,
    }
}

/// Readiness probe: the named container is running (and healthy, if it has a healthcheck)
pub struct ContainerProbe {
    docker: DockerManager,
    container: String,
}

impl ContainerProbe {
    pub fn new(docker: DockerManager, container: impl Into<String>) -> Self {
        Self {
            docker,
            container: container.into(),
        }
    }
}

#[async_trait]
impl Probe for ContainerProbe {
    fn name(&self) -> String {
        format!("container {}", self.container)
    }

    async fn check(&self) -> anyhow::Result<bool> {
        let status = self.docker.container_status(&self.container).await?;
        Ok(status.map(|s| s.is_ready()).unwrap_or(false))
    }
}
