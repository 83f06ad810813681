//! Stop/start sequencing for the monitored unit
//!
//! A restart observes the unit, stops it if running, waits for it to settle,
//! starts it and waits again. Every failure ends the attempt and is written to
//! the audit log; nothing is returned to the scheduler as an error.

use std::{sync::Arc, time::Duration};

use tracing::error;

use crate::{
    audit::AuditLog,
    errors::ServiceControlError,
    systemd_client::{wait_for_state, ServiceController, ServiceRunState},
};

pub const RESTART_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const STATE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    Failed,
}

pub struct RestartOrchestrator {
    controller: Arc<dyn ServiceController>,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl RestartOrchestrator {
    pub fn new(controller: Arc<dyn ServiceController>) -> Self {
        Self::with_timing(controller, RESTART_WAIT_TIMEOUT, STATE_POLL_INTERVAL)
    }

    pub fn with_timing(
        controller: Arc<dyn ServiceController>,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            controller,
            wait_timeout,
            poll_interval,
        }
    }

    pub async fn restart(&self, audit: &AuditLog, service: &str) -> RestartOutcome {
        match self.drive(audit, service).await {
            Ok(()) => RestartOutcome::Restarted,
            Err(err) => {
                error!(service = %service, error = %err, "restart aborted");
                audit.log(format!("Error restarting service {service}: {err}"));
                RestartOutcome::Failed
            }
        }
    }

    async fn drive(&self, audit: &AuditLog, service: &str) -> Result<(), ServiceControlError> {
        let state = self.controller.query_state(service).await?;

        if state == ServiceRunState::Running {
            audit.log(format!("Restarting service: {service}"));
            self.controller.stop(service).await?;
            audit.log(format!("Waiting for service to stop: {service}"));
            self.await_state(service, ServiceRunState::Stopped).await?;
            audit.log(format!("Service stopped successfully: {service}"));
        }

        audit.log(format!("Starting service: {service}"));
        self.controller.start(service).await?;
        audit.log(format!("Waiting for service to start: {service}"));
        self.await_state(service, ServiceRunState::Running).await?;
        audit.log(format!("Service started successfully: {service}"));

        Ok(())
    }

    async fn await_state(
        &self,
        service: &str,
        target: ServiceRunState,
    ) -> Result<(), ServiceControlError> {
        wait_for_state(
            self.controller.as_ref(),
            service,
            target,
            self.wait_timeout,
            self.poll_interval,
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Call {
        Query,
        Stop,
        Start,
    }

    /// In-memory unit that settles immediately unless told to stall or fail.
    pub(crate) struct FakeController {
        state: Mutex<ServiceRunState>,
        calls: Mutex<Vec<Call>>,
        fail_on: Option<Call>,
        missing_unit: bool,
        stall_stop: bool,
        stall_start: bool,
    }

    impl FakeController {
        pub(crate) fn new(state: ServiceRunState) -> Self {
            Self {
                state: Mutex::new(state),
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                missing_unit: false,
                stall_stop: false,
                stall_start: false,
            }
        }

        pub(crate) fn missing_unit(mut self) -> Self {
            self.missing_unit = true;
            self
        }

        pub(crate) fn stalling_stop(mut self) -> Self {
            self.stall_stop = true;
            self
        }

        pub(crate) fn failing_on(mut self, call: Call) -> Self {
            self.fail_on = Some(call);
            self
        }

        pub(crate) fn stalling_start(mut self) -> Self {
            self.stall_start = true;
            self
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub(crate) fn mutations(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| *call != Call::Query)
                .collect()
        }

        fn record(&self, call: Call, service: &str) -> Result<(), ServiceControlError> {
            self.calls.lock().expect("calls lock").push(call);
            if self.fail_on == Some(call) {
                return Err(ServiceControlError::bus("fake", service, "injected failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ServiceController for FakeController {
        async fn query_state(&self, service: &str) -> Result<ServiceRunState, ServiceControlError> {
            self.record(Call::Query, service)?;
            if self.missing_unit {
                return Err(ServiceControlError::unit_not_found(service));
            }
            Ok(*self.state.lock().expect("state lock"))
        }

        async fn stop(&self, service: &str) -> Result<(), ServiceControlError> {
            self.record(Call::Stop, service)?;
            *self.state.lock().expect("state lock") = if self.stall_stop {
                ServiceRunState::StopPending
            } else {
                ServiceRunState::Stopped
            };
            Ok(())
        }

        async fn start(&self, service: &str) -> Result<(), ServiceControlError> {
            self.record(Call::Start, service)?;
            *self.state.lock().expect("state lock") = if self.stall_start {
                ServiceRunState::StartPending
            } else {
                ServiceRunState::Running
            };
            Ok(())
        }
    }

    fn orchestrator(controller: Arc<FakeController>) -> RestartOrchestrator {
        RestartOrchestrator::with_timing(
            controller,
            Duration::from_millis(50),
            Duration::from_millis(5),
        )
    }

    fn read_log(audit: &AuditLog) -> String {
        std::fs::read_to_string(audit.path()).unwrap_or_default()
    }

    #[tokio::test]
    async fn running_service_is_stopped_before_start() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller = Arc::new(FakeController::new(ServiceRunState::Running));

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Restarted);
        assert_eq!(controller.mutations(), vec![Call::Stop, Call::Start]);

        let log = read_log(&audit);
        let expected = [
            "Restarting service: app.service",
            "Waiting for service to stop: app.service",
            "Service stopped successfully: app.service",
            "Starting service: app.service",
            "Waiting for service to start: app.service",
            "Service started successfully: app.service",
        ];
        let mut cursor = 0;
        for line in expected {
            let offset = log[cursor..]
                .find(line)
                .unwrap_or_else(|| panic!("missing or out of order: {line}"));
            cursor += offset + line.len();
        }
    }

    #[tokio::test]
    async fn stopped_service_skips_stop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller = Arc::new(FakeController::new(ServiceRunState::Stopped));

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Restarted);
        assert_eq!(controller.mutations(), vec![Call::Start]);
        let log = read_log(&audit);
        assert!(!log.contains("Restarting service"));
        assert!(log.contains("Service started successfully: app.service"));
    }

    #[tokio::test]
    async fn pending_state_is_treated_as_not_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller = Arc::new(FakeController::new(ServiceRunState::StopPending));

        orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(controller.mutations(), vec![Call::Start]);
    }

    #[tokio::test]
    async fn query_failure_is_logged_and_contained() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller =
            Arc::new(FakeController::new(ServiceRunState::Running).failing_on(Call::Query));

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Failed);
        assert!(controller.mutations().is_empty());
        assert!(read_log(&audit).contains("Error restarting service app.service: "));
    }

    #[tokio::test]
    async fn stop_failure_aborts_before_start() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller =
            Arc::new(FakeController::new(ServiceRunState::Running).failing_on(Call::Stop));

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Failed);
        assert_eq!(controller.mutations(), vec![Call::Stop]);
        let log = read_log(&audit);
        assert!(log.contains("injected failure"));
        assert!(!log.contains("Starting service"));
    }

    #[tokio::test]
    async fn start_timeout_is_logged_and_contained() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller = Arc::new(FakeController::new(ServiceRunState::Stopped).stalling_start());

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Failed);
        let log = read_log(&audit);
        assert!(log.contains("Waiting for service to start: app.service"));
        assert!(log.contains("Error restarting service app.service: timed out"));
        assert!(!log.contains("Service started successfully"));
    }

    #[tokio::test]
    async fn stop_timeout_is_logged_and_start_never_issued() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller = Arc::new(FakeController::new(ServiceRunState::Running).stalling_stop());

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "app.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Failed);
        assert_eq!(controller.mutations(), vec![Call::Stop]);
        let log = read_log(&audit);
        assert!(log.contains("Waiting for service to stop: app.service"));
        assert!(log.contains("Error restarting service app.service: timed out"));
        assert!(log.contains("to reach Stopped"));
        assert!(!log.contains("Service stopped successfully"));
        assert!(!log.contains("Starting service"));
    }

    #[tokio::test]
    async fn unknown_unit_is_never_started() {
        let dir = tempfile::tempdir().expect("temp dir");
        let audit = AuditLog::new(dir.path().join("portmon.log"));
        let controller = Arc::new(FakeController::new(ServiceRunState::Stopped).missing_unit());

        let outcome = orchestrator(controller.clone())
            .restart(&audit, "nope.service")
            .await;

        assert_eq!(outcome, RestartOutcome::Failed);
        assert!(controller.mutations().is_empty());
        assert!(read_log(&audit)
            .contains("Error restarting service nope.service: unit nope.service not found"));
    }
}
