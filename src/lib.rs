use std::{path::Path, sync::Arc};

use tracing::{error, info, warn};

pub mod audit;
pub mod config;
pub mod errors;
pub mod logging;
pub mod probe;
pub mod restart;
pub mod scheduler;
pub mod systemd_client;

use audit::AuditLog;
use config::{ConfigError, MonitorConfig, RawConfig};
use errors::ServiceControlError;
use probe::{HealthVerdict, PortSetChecker, Prober};
use restart::{RestartOrchestrator, RestartOutcome};
use scheduler::Scheduler;
use systemd_client::{ServiceController, ServiceRunState};

/// Everything one check cycle needs, built once at startup.
pub struct MonitorContext {
    pub config: MonitorConfig,
    pub audit: AuditLog,
    checker: PortSetChecker,
    orchestrator: RestartOrchestrator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub verdict: HealthVerdict,
    pub restart: Option<RestartOutcome>,
}

impl MonitorContext {
    pub fn new(
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        controller: Arc<dyn ServiceController>,
    ) -> Self {
        Self {
            audit: AuditLog::new(&config.log_file),
            checker: PortSetChecker::new(prober, config.probe_timeout),
            orchestrator: RestartOrchestrator::new(controller),
            config,
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let verdict = self
            .checker
            .check_all(&self.audit, &self.config.server_address, &self.config.ports)
            .await;

        let restart = match &verdict {
            HealthVerdict::Healthy => None,
            HealthVerdict::Unhealthy { unreachable } => {
                warn!(
                    host = %self.config.server_address,
                    ports = ?unreachable,
                    service = %self.config.service_name,
                    "ports unreachable, restarting service"
                );
                let outcome = self
                    .orchestrator
                    .restart(&self.audit, &self.config.service_name)
                    .await;
                if outcome == RestartOutcome::Restarted {
                    self.audit
                        .log(format!("Restarted {}.", self.config.service_name));
                }
                Some(outcome)
            }
        };

        CycleReport { verdict, restart }
    }
}

/// A started monitor; dropping it without `on_stop` also ends the schedule.
pub struct Monitor {
    context: Arc<MonitorContext>,
    scheduler: Scheduler,
}

impl Monitor {
    pub fn on_start(context: MonitorContext) -> Self {
        let context = Arc::new(context);
        context.audit.log("Service started");

        let tick_context = Arc::clone(&context);
        let scheduler = Scheduler::start(context.config.check_interval, move || {
            let context = Arc::clone(&tick_context);
            async move {
                context.run_cycle().await;
            }
        });

        info!(
            host = %context.config.server_address,
            ports = ?context.config.ports,
            service = %context.config.service_name,
            "monitor started"
        );

        Self { context, scheduler }
    }

    pub async fn on_stop(self) {
        self.scheduler.stop().await;
        self.context.audit.log("Service stopped");
    }

    pub fn context(&self) -> &MonitorContext {
        &self.context
    }
}

/// Loads the config, recording the outcome in the configured audit log.
/// `fallback_log` is used when the document names no log file or cannot be read.
pub fn load_config(path: &Path, fallback_log: &Path) -> Result<MonitorConfig, ConfigError> {
    let raw = RawConfig::read(path).map_err(|err| reject_config(path, fallback_log, err))?;
    let log_file = raw.log_file().unwrap_or(fallback_log).to_path_buf();

    let config =
        MonitorConfig::from_raw(raw).map_err(|err| reject_config(path, &log_file, err))?;
    AuditLog::new(&config.log_file).log("Config loaded");
    Ok(config)
}

fn reject_config(path: &Path, log_file: &Path, err: ConfigError) -> ConfigError {
    error!(path = %path.display(), error = %err, "configuration rejected");
    AuditLog::new(log_file).log(format!("Error loading configuration: {err}"));
    err
}

/// Confirms the monitored unit exists before the first cycle runs.
pub async fn verify_service(
    controller: &dyn ServiceController,
    audit: &AuditLog,
    service: &str,
) -> Result<ServiceRunState, ServiceControlError> {
    match controller.query_state(service).await {
        Ok(state) => {
            info!(service = %service, ?state, "monitored service found");
            Ok(state)
        }
        Err(err) => {
            error!(service = %service, error = %err, "monitored service unavailable");
            audit.log(format!("Error checking service {service}: {err}"));
            Err(err)
        }
    }
}
