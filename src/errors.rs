use std::time::Duration;

use thiserror::Error;

use crate::systemd_client::ServiceRunState;

#[derive(Debug, Error)]
pub enum ServiceControlError {
    #[error("{operation} failed for {service}: {message}")]
    Bus {
        operation: &'static str,
        service: String,
        message: String,
    },
    #[error("unit {service} not found")]
    UnitNotFound { service: String },
    #[error("timed out after {}s waiting for {service} to reach {target:?}", .timeout.as_secs())]
    Timeout {
        service: String,
        target: ServiceRunState,
        timeout: Duration,
    },
}

impl ServiceControlError {
    pub fn bus(
        operation: &'static str,
        service: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Bus {
            operation,
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn unit_not_found(service: impl Into<String>) -> Self {
        Self::UnitNotFound {
            service: service.into(),
        }
    }

    pub fn timeout(service: impl Into<String>, target: ServiceRunState, timeout: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            target,
            timeout,
        }
    }
}
