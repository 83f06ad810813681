//! TCP reachability probes and the per-cycle health verdict

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::audit::AuditLog;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    Unhealthy { unreachable: Vec<u16> },
}

impl HealthVerdict {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let unreachable: Vec<u16> = results
            .iter()
            .filter(|result| !result.reachable)
            .map(|result| result.port)
            .collect();

        if unreachable.is_empty() {
            Self::Healthy
        } else {
            Self::Unhealthy { unreachable }
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                debug!(host = %host, port, error = %err, "connect failed");
                false
            }
            Err(_) => {
                debug!(host = %host, port, timeout_ms = timeout.as_millis(), "connect timed out");
                false
            }
        }
    }
}

pub struct PortSetChecker {
    prober: Arc<dyn Prober>,
    timeout: Duration,
}

impl PortSetChecker {
    pub fn new(prober: Arc<dyn Prober>, timeout: Duration) -> Self {
        Self { prober, timeout }
    }

    /// Probes every port in order; one unreachable port makes the cycle unhealthy.
    pub async fn check_all(&self, audit: &AuditLog, host: &str, ports: &[u16]) -> HealthVerdict {
        audit.log("Checking ports");

        let mut results = Vec::with_capacity(ports.len());
        for &port in ports {
            let reachable = self.prober.probe(host, port, self.timeout).await;
            if !reachable {
                audit.log(format!("Port {port} is not reachable."));
            }
            results.push(ProbeResult { port, reachable });
        }

        let verdict = HealthVerdict::from_results(&results);
        if verdict.is_healthy() {
            audit.log("All ports are reachable.");
        }
        verdict
    }
}
