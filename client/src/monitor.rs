//! Connection monitor: bounded-time reachability probes.

use crate::remote::RemoteService;
use chrono::Utc;
use offsync_engine::Timestamp;
use std::sync::Arc;
use std::time::Duration;

/// Result of one reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub remote_reachable: bool,
    pub checked_at: Timestamp,
}

/// Probes the remote service's health endpoint.
#[derive(Clone)]
pub struct ConnectionMonitor {
    remote: Arc<dyn RemoteService>,
    timeout: Duration,
}

impl ConnectionMonitor {
    /// Create a monitor with the given probe deadline.
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    /// Probe deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe the remote. Never errors and never takes longer than the
    /// configured timeout; any failure reports the remote as unreachable.
    pub async fn check_connection(&self) -> ConnectionStatus {
        let remote_reachable = match tokio::time::timeout(self.timeout, self.remote.check_health()).await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Health probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Health probe timed out");
                false
            }
        };

        ConnectionStatus {
            remote_reachable,
            checked_at: Utc::now(),
        }
    }
}
