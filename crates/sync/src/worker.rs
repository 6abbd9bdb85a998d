//! Periodic background drain of the pending queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::SyncEngine;
use crate::types::SyncOutcome;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Drives [`SyncEngine::synchronize`] on an interval.
///
/// Ticks that find the client offline or the queue empty are cheap no-ops. A
/// pass that leaves failures behind stretches the wait with exponential
/// backoff (capped at five minutes); the next clean pass resets it. `poke`
/// requests an immediate pass, typically on a connectivity-restored signal.
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    wakeup: Arc<Notify>,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            wakeup: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            handle: None,
        }
    }

    /// Spawn the periodic loop. Idempotent.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let engine = self.engine.clone();
        let wakeup = self.wakeup.clone();
        let shutdown = self.shutdown.clone();
        let base_interval = engine.config().sync_interval;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(base_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // first tick completes immediately

            let mut backoff = base_interval;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wakeup.notified() => {
                        tracing::debug!("sync worker woken early");
                    }
                    _ = shutdown.notified() => {
                        tracing::info!("sync worker stopping");
                        return;
                    }
                }

                if !engine.has_pending_operations().await {
                    continue;
                }

                match engine.synchronize().await {
                    Ok(report) if report.success() => {
                        if report.outcome == SyncOutcome::Completed {
                            tracing::info!("background sync: {}", report.message());
                        }
                        if backoff != base_interval {
                            backoff = base_interval;
                            ticker = tokio::time::interval(backoff);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                            ticker.tick().await;
                        }
                    }
                    Ok(report) => {
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        tracing::warn!(
                            "background sync left {} operation(s) failed, backing off to {:?}",
                            report.failed,
                            backoff
                        );
                        ticker = tokio::time::interval(backoff);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                        ticker.tick().await;
                    }
                    Err(err) => {
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        tracing::error!("background sync failed: {err}, backing off to {backoff:?}");
                        ticker = tokio::time::interval(backoff);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                        ticker.tick().await;
                    }
                }
            }
        }));
        tracing::info!("sync worker started");
    }

    /// Request an immediate sync pass without waiting for the next tick.
    pub fn poke(&self) {
        self.wakeup.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for it to wind down.
    pub async fn shutdown(&mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!("sync worker task panicked: {err}");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
