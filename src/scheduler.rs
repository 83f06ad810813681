//! Periodic tick driver
//!
//! Ticks run inline on a single task, so a slow tick delays the next one instead
//! of overlapping it.

use std::{future::Future, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawns the tick loop. The first tick fires immediately.
    pub fn start<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "scheduler started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                if *shutdown_rx.borrow() {
                    break;
                }

                debug!("tick");
                on_tick().await;
            }

            info!("scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Prevents further ticks and waits for an in-flight tick to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "scheduler task ended abnormally");
        }
    }
}
