//! In-process remote service for tests and local runs.
//!
//! Besides holding snapshots, it can simulate the failure modes the
//! scheduler has to cope with: an unreachable service, failing reads or
//! writes for one category, a slow health endpoint, and a fetch that blocks
//! until released so a pass can be observed mid-flight.

use super::{RemoteError, RemoteService};
use async_trait::async_trait;
use offsync_engine::Document;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

// Enough for every fetch that could be parked at the gate.
const RELEASE_PERMITS: usize = 1024;

#[derive(Debug, Default)]
struct State {
    snapshots: HashMap<String, Vec<Document>>,
    unreachable: bool,
    failing_fetches: HashSet<String>,
    failing_saves: HashSet<String>,
    health_latency: Option<Duration>,
    fetch_calls: HashMap<String, usize>,
    save_calls: HashMap<String, usize>,
    health_calls: usize,
}

/// Remote service backed by a map.
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<State>,
    held: AtomicBool,
    gate: Semaphore,
    fetch_arrived: Notify,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Create a reachable remote with no data.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            fetch_arrived: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a category's snapshot.
    pub fn set_snapshot(&self, category: &str, records: Vec<Document>) {
        self.state().snapshots.insert(category.to_string(), records);
    }

    /// Current snapshot of a category.
    pub fn snapshot(&self, category: &str) -> Vec<Document> {
        self.state()
            .snapshots
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    /// Toggle reachability. An unreachable remote fails every call.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    /// Make fetches for a category fail.
    pub fn fail_fetches(&self, category: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_fetches.insert(category.to_string());
        } else {
            state.failing_fetches.remove(category);
        }
    }

    /// Make saves for a category fail.
    pub fn fail_saves(&self, category: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_saves.insert(category.to_string());
        } else {
            state.failing_saves.remove(category);
        }
    }

    /// Delay every health probe by `latency`.
    pub fn set_health_latency(&self, latency: Option<Duration>) {
        self.state().health_latency = latency;
    }

    /// Block every fetch until [`MemoryRemote::release`] is called.
    pub fn hold(&self) {
        // Drop permits left over from an earlier release.
        while let Ok(permit) = self.gate.try_acquire() {
            permit.forget();
        }
        self.held.store(true, Ordering::SeqCst);
    }

    /// Unblock held fetches and stop holding new ones.
    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(RELEASE_PERMITS);
    }

    /// Wait until a fetch has reached the hold point.
    pub async fn wait_for_fetch(&self) {
        self.fetch_arrived.notified().await;
    }

    /// Number of fetches issued for a category.
    pub fn fetch_calls(&self, category: &str) -> usize {
        self.state().fetch_calls.get(category).copied().unwrap_or(0)
    }

    /// Number of saves issued for a category.
    pub fn save_calls(&self, category: &str) -> usize {
        self.state().save_calls.get(category).copied().unwrap_or(0)
    }

    /// Total saves across all categories.
    pub fn total_saves(&self) -> usize {
        self.state().save_calls.values().sum()
    }

    /// Number of health probes received.
    pub fn health_calls(&self) -> usize {
        self.state().health_calls
    }
}

#[async_trait]
impl RemoteService for MemoryRemote {
    async fn fetch_latest(&self, category: &str) -> Result<Vec<Document>, RemoteError> {
        if self.held.load(Ordering::SeqCst) {
            self.fetch_arrived.notify_one();
            let permit = self.gate.acquire().await;
            drop(permit);
        }

        let mut state = self.state();
        *state.fetch_calls.entry(category.to_string()).or_default() += 1;

        if state.unreachable {
            return Err(RemoteError::Unreachable("memory remote is offline".into()));
        }
        if state.failing_fetches.contains(category) {
            return Err(RemoteError::Status {
                status: 500,
                body: format!("fetch of {category} failed"),
            });
        }
        Ok(state.snapshots.get(category).cloned().unwrap_or_default())
    }

    async fn save(&self, category: &str, records: &[Document]) -> Result<(), RemoteError> {
        let mut state = self.state();
        *state.save_calls.entry(category.to_string()).or_default() += 1;

        if state.unreachable {
            return Err(RemoteError::Unreachable("memory remote is offline".into()));
        }
        if state.failing_saves.contains(category) {
            return Err(RemoteError::Status {
                status: 500,
                body: format!("save of {category} failed"),
            });
        }
        state
            .snapshots
            .insert(category.to_string(), records.to_vec());
        Ok(())
    }

    async fn check_health(&self) -> Result<(), RemoteError> {
        let (latency, unreachable) = {
            let mut state = self.state();
            state.health_calls += 1;
            (state.health_latency, state.unreachable)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if unreachable {
            Err(RemoteError::Unreachable("memory remote is offline".into()))
        } else {
            Ok(())
        }
    }
}
