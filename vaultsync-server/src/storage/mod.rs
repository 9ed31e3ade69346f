//! SQLite storage backend.
//!
//! The connection is the single shared mutable resource; every request
//! takes the mutex for the duration of its storage work, and Commit runs
//! its read-modify-write cycle inside one transaction so concurrent
//! commits on a vault observe each other atomically.

pub mod devices;
pub mod items;
pub mod models;
pub mod shares;
pub mod vaults;

use crate::error::ApiError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe storage handle.
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT,
                credential_hash TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS devices (
                device_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                x25519_public BLOB NOT NULL,
                ed25519_public BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                last_seen INTEGER,
                verified_at INTEGER,
                revoked_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS device_challenges (
                device_id TEXT PRIMARY KEY REFERENCES devices(device_id) ON DELETE CASCADE,
                challenge BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vaults (
                vault_id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vault_keys (
                vault_id INTEGER NOT NULL REFERENCES vaults(vault_id) ON DELETE CASCADE,
                version INTEGER NOT NULL,
                wrapped_vek BLOB NOT NULL,
                wrap_iv BLOB NOT NULL,
                wrap_tag BLOB NOT NULL,
                kdf_salt BLOB NOT NULL,
                kdf_params TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (vault_id, version)
            );

            CREATE TABLE IF NOT EXISTS vault_items (
                item_id TEXT PRIMARY KEY,
                vault_id INTEGER NOT NULL REFERENCES vaults(vault_id) ON DELETE CASCADE,
                item_type TEXT NOT NULL,
                ciphertext BLOB NOT NULL,
                iv BLOB NOT NULL,
                tag BLOB NOT NULL,
                meta TEXT,
                version INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Snapshots survive vault deletion; no foreign key on purpose.
            CREATE TABLE IF NOT EXISTS vault_versions (
                version_id INTEGER PRIMARY KEY AUTOINCREMENT,
                vault_id INTEGER NOT NULL,
                object_key TEXT NOT NULL,
                mac BLOB,
                created_by_device TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE (vault_id, version_id)
            );

            CREATE TABLE IF NOT EXISTS item_tombstones (
                vault_id INTEGER NOT NULL,
                item_id TEXT NOT NULL,
                deleted_at INTEGER NOT NULL,
                PRIMARY KEY (vault_id, item_id)
            );

            CREATE TABLE IF NOT EXISTS sharing_records (
                share_id TEXT PRIMARY KEY,
                vault_id INTEGER NOT NULL REFERENCES vaults(vault_id) ON DELETE CASCADE,
                item_id TEXT,
                sender_user_id INTEGER NOT NULL REFERENCES users(user_id),
                recipient_user_id INTEGER NOT NULL REFERENCES users(user_id),
                wrapped_key BLOB NOT NULL,
                wrap_iv BLOB NOT NULL,
                wrap_tag BLOB NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                accepted_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS seen_requests (
                device_id TEXT NOT NULL,
                body_sha256 TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                seen_at INTEGER NOT NULL,
                PRIMARY KEY (device_id, body_sha256, timestamp_ms)
            );

            CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id);
            CREATE INDEX IF NOT EXISTS idx_items_vault ON vault_items(vault_id, item_id);
            CREATE INDEX IF NOT EXISTS idx_versions_vault ON vault_versions(vault_id, version_id);
            CREATE INDEX IF NOT EXISTS idx_shares_recipient ON sharing_records(recipient_user_id, status);
            CREATE INDEX IF NOT EXISTS idx_shares_vault ON sharing_records(vault_id, status);
            CREATE INDEX IF NOT EXISTS idx_seen_requests_seen_at ON seen_requests(seen_at);
            CREATE INDEX IF NOT EXISTS idx_tombstones_deleted_at ON item_tombstones(deleted_at);",
        )?;
        Ok(())
    }

    /// Take the connection for a unit of storage work.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.conn
            .lock()
            .map_err(|e| ApiError::StorageUnavailable(format!("lock poisoned: {}", e)))
    }
}

/// Current unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_initializes_in_memory() {
        let storage = Storage::in_memory().unwrap();
        let conn = storage.conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(count >= 10);
    }

    #[test]
    fn schema_is_idempotent() {
        let storage = Storage::in_memory().unwrap();
        storage.initialize_schema().unwrap();
    }
}
