//! Sync counters, status snapshots and pass results.

use crate::{Category, Timestamp};
use serde::{Deserialize, Serialize};

/// Process-wide counters. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Start of the most recent sync pass
    pub last_attempt_at: Option<Timestamp>,
    /// End of the most recent pass that synced at least one category
    pub last_success_at: Option<Timestamp>,
    /// Passes in a row that did not fully succeed
    pub consecutive_failures: u32,
    /// Passes that fully succeeded
    pub successful_syncs: u64,
    /// Passes that did not fully succeed
    pub failed_syncs: u64,
}

impl SyncStats {
    /// Record the start of a pass.
    pub fn record_attempt(&mut self, at: Timestamp) {
        self.last_attempt_at = Some(at);
    }

    /// Fold a finished pass into the counters.
    pub fn record_result(&mut self, result: &SyncResult, at: Timestamp) {
        if result.success {
            self.consecutive_failures = 0;
            self.successful_syncs += 1;
        } else {
            self.consecutive_failures += 1;
            self.failed_syncs += 1;
        }
        if result.success || result.items_synced > 0 {
            self.last_success_at = Some(at);
        }
    }
}

/// Read-only view for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(flatten)]
    pub stats: SyncStats,
    /// Total queued items
    pub pending_items: usize,
    /// Categories with queued items
    pub pending_categories: Vec<Category>,
    /// Whether a pass is running
    pub syncing: bool,
    /// Result of the last reachability probe, if any
    pub remote_reachable: Option<bool>,
}

impl SyncStatus {
    /// Whether anything is waiting to be synced.
    pub fn has_pending(&self) -> bool {
        self.pending_items > 0
    }
}

/// Outcome for a single category within a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOutcome {
    pub category: Category,
    /// Queued items processed for this category
    pub items: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategoryOutcome {
    pub fn synced(category: impl Into<Category>, items: usize) -> Self {
        Self {
            category: category.into(),
            items,
            success: true,
            error: None,
        }
    }

    pub fn failed(category: impl Into<Category>, items: usize, error: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            items,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Summary returned by a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub items_synced: usize,
    pub items_failed: usize,
    pub can_retry: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryOutcome>,
}

impl SyncResult {
    /// Another pass holds the single-flight guard.
    pub const IN_PROGRESS: &'static str = "Sync already in progress";
    /// The queue was empty.
    pub const NOTHING_PENDING: &'static str = "No pending changes";
    /// The reachability probe failed.
    pub const UNREACHABLE: &'static str = "Remote service unreachable";

    pub fn in_progress() -> Self {
        Self {
            success: false,
            message: Self::IN_PROGRESS.to_string(),
            items_synced: 0,
            items_failed: 0,
            can_retry: true,
            categories: Vec::new(),
        }
    }

    pub fn nothing_pending() -> Self {
        Self {
            success: true,
            message: Self::NOTHING_PENDING.to_string(),
            items_synced: 0,
            items_failed: 0,
            can_retry: false,
            categories: Vec::new(),
        }
    }

    pub fn unreachable(pending: usize) -> Self {
        Self {
            success: false,
            message: Self::UNREACHABLE.to_string(),
            items_synced: 0,
            items_failed: pending,
            can_retry: true,
            categories: Vec::new(),
        }
    }

    /// Aggregate per-category outcomes.
    pub fn from_outcomes(categories: Vec<CategoryOutcome>) -> Self {
        let (mut synced, mut failed) = (0, 0);
        for outcome in &categories {
            if outcome.success {
                synced += outcome.items;
            } else {
                failed += outcome.items;
            }
        }
        let failed_categories = categories.iter().filter(|c| !c.success).count();

        let message = if failed_categories == 0 {
            format!("Synced {synced} item(s) across {} categories", categories.len())
        } else if synced > 0 {
            format!("Partially synced: {synced} item(s) synced, {failed} item(s) failed")
        } else {
            format!("Sync failed for {failed_categories} categories; {failed} item(s) still pending")
        };

        Self {
            success: failed_categories == 0,
            message,
            items_synced: synced,
            items_failed: failed,
            can_retry: failed_categories > 0,
            categories,
        }
    }

    /// Whether some but not all categories synced.
    pub fn is_partial(&self) -> bool {
        !self.success && self.items_synced > 0
    }
}
