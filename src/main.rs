use std::{path::Path, sync::Arc};

use service_portmon::{
    audit::{AuditLog, DEFAULT_LOG_FILE},
    config::MonitorConfig,
    load_config, logging,
    probe::TcpProber,
    systemd_client::DbusServiceController,
    verify_service, Monitor, MonitorContext,
};
use systemd::daemon;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config_path = MonitorConfig::config_path();
    let config = load_config(&config_path, Path::new(DEFAULT_LOG_FILE))?;

    let audit = AuditLog::new(&config.log_file);
    let controller = match DbusServiceController::connect().await {
        Ok(controller) => Arc::new(controller),
        Err(err) => {
            audit.log(format!("Error connecting to systemd: {err}"));
            return Err(err.into());
        }
    };
    verify_service(&*controller, &audit, &config.service_name).await?;

    info!(config = %config_path.display(), "configuration loaded");
    let monitor = Monitor::on_start(MonitorContext::new(
        config,
        Arc::new(TcpProber),
        controller,
    ));
    notify_service_manager(daemon::STATE_READY);

    wait_for_shutdown().await?;

    notify_service_manager(daemon::STATE_STOPPING);
    monitor.on_stop().await;
    Ok(())
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = terminate.recv() => info!("received SIGTERM"),
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("received interrupt");
        }
    }
    Ok(())
}

fn notify_service_manager(state: &str) {
    match daemon::notify(false, [(state, "1")].iter()) {
        Ok(true) => {}
        Ok(false) => debug!(state, "not running under a service manager"),
        Err(err) => warn!(state, error = %err, "failed to notify service manager"),
    }
}
