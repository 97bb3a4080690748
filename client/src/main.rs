//! offsync agent - queue changes from stdin and sync them to a remote service.
//!
//! Reads one JSON change request per line:
//!
//! ```text
//! {"category": "loot", "changes": [{"id": 1, "copies": 3}], "metadata": {"source": "cli"}}
//! ```
//!
//! At end of input the agent forces a sync pass and prints the result and
//! the final status as JSON.

use offsync_client::{Config, FileStore, HttpRemote, SyncResult, SyncScheduler};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One line of input.
#[derive(Debug, Deserialize)]
struct ChangeRequest {
    category: String,
    changes: Vec<Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offsync_client=debug,offsync_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let remote_url = config.require_remote_url()?;

    tracing::info!(
        "Starting offsync agent against {} (data in {})",
        remote_url,
        config.data_dir.display()
    );

    let store = Arc::new(FileStore::open(&config.data_dir)?);
    let remote = Arc::new(HttpRemote::new(remote_url));
    let scheduler = SyncScheduler::new(store, remote, config.sync.clone());
    let background = scheduler.spawn_background();

    if scheduler.has_pending_changes(None) {
        tracing::info!("Restored pending changes, requesting sync");
        scheduler.notify_resumed();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let request: ChangeRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed request");
                continue;
            }
        };

        match scheduler.queue_changes(&request.category, request.changes, request.metadata) {
            Ok(item_id) => {
                tracing::debug!(line = line_no, item = %item_id, "Accepted change request")
            }
            Err(e) => tracing::warn!(line = line_no, error = %e, "Rejected change request"),
        }
    }

    // A background pass may still be running; wait for it and go again.
    let mut status_rx = scheduler.subscribe();
    let result = loop {
        let result = scheduler.force_sync_all_changes().await;
        if result.message != SyncResult::IN_PROGRESS {
            break result;
        }
        status_rx.wait_for(|status| !status.syncing).await?;
    };
    let status = scheduler.sync_status();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "result": result, "status": status }))?
    );

    scheduler.shutdown();
    background.await?;

    Ok(())
}
