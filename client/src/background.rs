//! Background sync task.
//!
//! Reacts to [`SyncTrigger`] messages and, while changes are pending, probes
//! the remote on a fixed interval so that connectivity coming back starts a
//! pass without any caller involvement. The interval restarts whenever work
//! appears and after every triggered pass, so a periodic probe always comes
//! a full period after the previous one.

use crate::scheduler::{Inner, SyncTrigger};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

pub(crate) async fn run(inner: Arc<Inner>, mut triggers: mpsc::UnboundedReceiver<SyncTrigger>) {
    let period = inner.options.health_interval;
    let mut health = tokio::time::interval_at(Instant::now() + period, period);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = period.as_secs(), "Background sync started");

    let mut was_pending = inner.has_pending();

    loop {
        let pending = inner.has_pending();
        if pending && !was_pending {
            health.reset();
        }
        was_pending = pending;

        tokio::select! {
            trigger = triggers.recv() => match trigger {
                None | Some(SyncTrigger::Shutdown) => break,
                Some(trigger) => {
                    // A burst of enqueues is usually drained by the first pass.
                    if !inner.has_pending() {
                        tracing::trace!(?trigger, "Nothing pending");
                        continue;
                    }
                    tracing::debug!(?trigger, "Sync triggered");
                    inner.perform_sync(None).await;
                    health.reset();
                }
            },
            _ = health.tick(), if pending => {
                // Cleared since the tick was armed
                if !inner.has_pending() {
                    continue;
                }
                let connection = inner.monitor.check_connection().await;
                inner.record_connection(connection);
                if connection.remote_reachable {
                    tracing::debug!("Remote reachable, retrying pending changes");
                    inner.perform_sync(Some(connection)).await;
                }
            }
        }
    }

    tracing::info!("Background sync stopped");
}
