//! Background cleanup: prune the replay cache, expired enrollment
//! challenges, and aged-out tombstones.

use crate::config::ServerConfig;
use crate::storage::{devices, items, Storage};
use std::time::Duration;
use tokio::time;

/// Replay-cache rows live twice the signature window before pruning.
const SEEN_REQUEST_RETENTION_SECS: i64 = 600;

pub fn spawn_cleanup_task(storage: Storage, config: &ServerConfig) {
    let interval_secs = config.cleanup_interval_secs;
    let tombstone_retention_secs = config.tombstone_retention_days as i64 * 86_400;

    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup(&storage, tombstone_retention_secs) {
                tracing::error!("cleanup error: {}", e);
            }
        }
    });
}

fn run_cleanup(storage: &Storage, tombstone_retention_secs: i64) -> Result<(), String> {
    let conn = storage.conn().map_err(|e| e.to_string())?;

    let requests = devices::prune_seen_requests(&conn, SEEN_REQUEST_RETENTION_SECS)
        .map_err(|e| e.to_string())?;
    let challenges = devices::prune_expired_challenges(&conn).map_err(|e| e.to_string())?;
    let tombstones =
        items::prune_tombstones(&conn, tombstone_retention_secs).map_err(|e| e.to_string())?;

    tracing::debug!(requests, challenges, tombstones, "cleanup completed");
    Ok(())
}
