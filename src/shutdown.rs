use crate::lifecycle::Dispatcher;
use crate::observability::ReconcileMetrics;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Graceful shutdown coordinator for Boulder
///
/// Signals are turned into a `watch` broadcast; the scheduler stops ticking on
/// it and [`ShutdownCoordinator::shutdown_all_services`] drains dispatched work.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait for SIGINT/SIGTERM, then broadcast shutdown.
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        info!("Shutdown coordinator ready - will shutdown gracefully on SIGINT/SIGTERM");
        wait_for_signal().await?;
        info!("Shutdown signal received");
        self.trigger();
        Ok(())
    }

    /// Wait for in-flight actions, then log final counters.
    pub async fn shutdown_all_services(
        dispatcher: &Dispatcher,
        metrics: &ReconcileMetrics,
        drain_timeout: Duration,
    ) -> bool {
        info!(
            in_flight = dispatcher.in_flight(),
            timeout_secs = drain_timeout.as_secs(),
            "Waiting for in-flight actions to finish"
        );
        let drained = dispatcher.drain(drain_timeout).await;
        if !drained {
            warn!("Some actions did not finish before the drain timeout");
        }
        metrics.log_stats();
        info!("Graceful shutdown completed");
        drained
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.is_triggered());

        coordinator.trigger();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(coordinator.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger();
        let rx = coordinator.subscribe();
        assert!(*rx.borrow());
    }
}
