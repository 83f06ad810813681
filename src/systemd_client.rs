use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use zbus::{zvariant::OwnedObjectPath, Connection, Proxy};

use crate::errors::ServiceControlError;

const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
const JOB_MODE: &str = "replace";

/// Run state of a monitored unit, folded down from systemd's `ActiveState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRunState {
    Running,
    Stopped,
    StartPending,
    StopPending,
    Other,
}

impl ServiceRunState {
    pub fn from_active_state(active_state: &str) -> Self {
        match active_state {
            "active" | "reloading" => Self::Running,
            "inactive" | "failed" => Self::Stopped,
            "activating" => Self::StartPending,
            "deactivating" => Self::StopPending,
            _ => Self::Other,
        }
    }
}

/// Folds a unit's `LoadState`/`ActiveState` pair into a run state.
pub fn resolve_unit_state(
    service: &str,
    load_state: &str,
    active_state: &str,
) -> Result<ServiceRunState, ServiceControlError> {
    if load_state == "not-found" {
        return Err(ServiceControlError::unit_not_found(service));
    }
    Ok(ServiceRunState::from_active_state(active_state))
}

#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn query_state(&self, service: &str) -> Result<ServiceRunState, ServiceControlError>;
    async fn stop(&self, service: &str) -> Result<(), ServiceControlError>;
    async fn start(&self, service: &str) -> Result<(), ServiceControlError>;
}

/// Polls `query_state` until the unit reaches `target`, failing once `timeout` elapses.
pub async fn wait_for_state(
    controller: &dyn ServiceController,
    service: &str,
    target: ServiceRunState,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), ServiceControlError> {
    let poll = async {
        loop {
            let state = controller.query_state(service).await?;
            if state == target {
                return Ok::<(), ServiceControlError>(());
            }
            debug!(service = %service, ?state, ?target, "waiting for unit state");
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(ServiceControlError::timeout(service, target, timeout)),
    }
}

#[derive(Debug, Clone)]
pub struct DbusServiceController {
    connection: Connection,
}

impl DbusServiceController {
    /// Connects to the system bus and checks that the systemd manager answers.
    pub async fn connect() -> Result<Self, ServiceControlError> {
        let connection = Connection::system()
            .await
            .map_err(|err| ServiceControlError::bus("connect", "system bus", err))?;
        let controller = Self { connection };

        let manager = controller.manager("systemd").await?;
        let version: String = manager
            .get_property("Version")
            .await
            .map_err(|err| ServiceControlError::bus("Version", "systemd", err))?;
        debug!(systemd_version = %version, "connected to systemd");

        Ok(controller)
    }

    async fn manager(&self, service: &str) -> Result<Proxy<'static>, ServiceControlError> {
        Proxy::new(
            &self.connection,
            SYSTEMD_DESTINATION,
            SYSTEMD_PATH,
            MANAGER_INTERFACE,
        )
        .await
        .map_err(|err| ServiceControlError::bus("manager proxy", service, err))
    }
}

#[async_trait]
impl ServiceController for DbusServiceController {
    async fn query_state(&self, service: &str) -> Result<ServiceRunState, ServiceControlError> {
        let manager = self.manager(service).await?;
        let unit_path: OwnedObjectPath = manager
            .call("LoadUnit", &(service,))
            .await
            .map_err(|err| ServiceControlError::bus("LoadUnit", service, err))?;

        let unit = Proxy::new(
            &self.connection,
            SYSTEMD_DESTINATION,
            unit_path.as_str(),
            UNIT_INTERFACE,
        )
        .await
        .map_err(|err| ServiceControlError::bus("unit proxy", service, err))?;

        let load_state: String = unit
            .get_property("LoadState")
            .await
            .map_err(|err| ServiceControlError::bus("LoadState", service, err))?;
        let active_state: String = unit
            .get_property("ActiveState")
            .await
            .map_err(|err| ServiceControlError::bus("ActiveState", service, err))?;

        resolve_unit_state(service, &load_state, &active_state)
    }

    async fn stop(&self, service: &str) -> Result<(), ServiceControlError> {
        let manager = self.manager(service).await?;
        let job: OwnedObjectPath = manager
            .call("StopUnit", &(service, JOB_MODE))
            .await
            .map_err(|err| ServiceControlError::bus("StopUnit", service, err))?;
        debug!(service = %service, job = %job.as_str(), "stop job queued");
        Ok(())
    }

    async fn start(&self, service: &str) -> Result<(), ServiceControlError> {
        let manager = self.manager(service).await?;
        let job: OwnedObjectPath = manager
            .call("StartUnit", &(service, JOB_MODE))
            .await
            .map_err(|err| ServiceControlError::bus("StartUnit", service, err))?;
        debug!(service = %service, job = %job.as_str(), "start job queued");
        Ok(())
    }
}
