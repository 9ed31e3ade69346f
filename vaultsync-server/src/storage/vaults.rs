//! Vaults, wrapped vault-key versions, and snapshot history.

use super::models::{opt_uuid_column, SnapshotRow, VaultKeyRow, VaultRow};
use super::now;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

fn vault_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VaultRow> {
    Ok(VaultRow {
        vault_id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn create_vault(conn: &Connection, owner_user_id: i64, name: &str) -> rusqlite::Result<VaultRow> {
    let ts = now();
    conn.execute(
        "INSERT INTO vaults (owner_user_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![owner_user_id, name, ts, ts],
    )?;
    Ok(VaultRow {
        vault_id: conn.last_insert_rowid(),
        owner_user_id,
        name: name.to_string(),
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_vault(conn: &Connection, vault_id: i64) -> rusqlite::Result<Option<VaultRow>> {
    conn.query_row(
        "SELECT vault_id, owner_user_id, name, created_at, updated_at FROM vaults WHERE vault_id = ?1",
        [vault_id],
        vault_from_row,
    )
    .optional()
}

pub fn vaults_for_owner(conn: &Connection, owner_user_id: i64) -> rusqlite::Result<Vec<VaultRow>> {
    let mut stmt = conn.prepare(
        "SELECT vault_id, owner_user_id, name, created_at, updated_at
         FROM vaults WHERE owner_user_id = ?1 ORDER BY vault_id",
    )?;
    let rows = stmt.query_map([owner_user_id], vault_from_row)?;
    rows.collect()
}

/// Access predicate: owner, or recipient of an accepted share on the
/// vault. Gates pull, commit, and key/item reads.
pub fn user_has_access(conn: &Connection, vault_id: i64, user_id: i64) -> rusqlite::Result<bool> {
    let owner: Option<i64> = conn
        .query_row(
            "SELECT owner_user_id FROM vaults WHERE vault_id = ?1",
            [vault_id],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        None => Ok(false),
        Some(owner_id) if owner_id == user_id => Ok(true),
        Some(_) => conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sharing_records
                WHERE vault_id = ?1 AND recipient_user_id = ?2 AND status = 'accepted'
            )",
            params![vault_id, user_id],
            |row| row.get(0),
        ),
    }
}

// --- wrapped key versions ---

fn key_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VaultKeyRow> {
    let params_text: String = row.get(6)?;
    let kdf_params = serde_json::from_str(&params_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(VaultKeyRow {
        vault_id: row.get(0)?,
        version: row.get(1)?,
        wrapped_vek: row.get(2)?,
        wrap_iv: row.get(3)?,
        wrap_tag: row.get(4)?,
        kdf_salt: row.get(5)?,
        kdf_params,
        created_at: row.get(7)?,
    })
}

const KEY_COLUMNS: &str =
    "vault_id, version, wrapped_vek, wrap_iv, wrap_tag, kdf_salt, kdf_params, created_at";

/// Append a wrapped-VEK version. `(vault_id, version)` is unique and
/// rows are never edited; a duplicate version surfaces as a constraint
/// violation.
#[allow(clippy::too_many_arguments)]
pub fn create_key_version(
    conn: &Connection,
    vault_id: i64,
    version: i64,
    wrapped_vek: &[u8],
    wrap_iv: &[u8],
    wrap_tag: &[u8],
    kdf_salt: &[u8],
    kdf_params: &serde_json::Value,
) -> rusqlite::Result<VaultKeyRow> {
    let created_at = now();
    conn.execute(
        "INSERT INTO vault_keys
            (vault_id, version, wrapped_vek, wrap_iv, wrap_tag, kdf_salt, kdf_params, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            vault_id,
            version,
            wrapped_vek,
            wrap_iv,
            wrap_tag,
            kdf_salt,
            kdf_params.to_string(),
            created_at,
        ],
    )?;
    Ok(VaultKeyRow {
        vault_id,
        version,
        wrapped_vek: wrapped_vek.to_vec(),
        wrap_iv: wrap_iv.to_vec(),
        wrap_tag: wrap_tag.to_vec(),
        kdf_salt: kdf_salt.to_vec(),
        kdf_params: kdf_params.clone(),
        created_at,
    })
}

/// The key row with the largest version, i.e. the current one.
pub fn get_current_key(conn: &Connection, vault_id: i64) -> rusqlite::Result<Option<VaultKeyRow>> {
    conn.query_row(
        &format!(
            "SELECT {KEY_COLUMNS} FROM vault_keys
             WHERE vault_id = ?1 ORDER BY version DESC LIMIT 1"
        ),
        [vault_id],
        key_from_row,
    )
    .optional()
}

pub fn get_key_version(
    conn: &Connection,
    vault_id: i64,
    version: i64,
) -> rusqlite::Result<Option<VaultKeyRow>> {
    conn.query_row(
        &format!("SELECT {KEY_COLUMNS} FROM vault_keys WHERE vault_id = ?1 AND version = ?2"),
        params![vault_id, version],
        key_from_row,
    )
    .optional()
}

pub fn all_key_versions(conn: &Connection, vault_id: i64) -> rusqlite::Result<Vec<VaultKeyRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {KEY_COLUMNS} FROM vault_keys WHERE vault_id = ?1 ORDER BY version DESC"
    ))?;
    let rows = stmt.query_map([vault_id], key_from_row)?;
    rows.collect()
}

// --- snapshots ---

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        version_id: row.get(0)?,
        vault_id: row.get(1)?,
        object_key: row.get(2)?,
        mac: row.get(3)?,
        created_by_device: opt_uuid_column(row, 4)?,
        created_at: row.get(5)?,
    })
}

pub fn insert_snapshot(
    conn: &Connection,
    vault_id: i64,
    object_key: &str,
    created_by_device: Option<&Uuid>,
) -> rusqlite::Result<SnapshotRow> {
    let created_at = now();
    conn.execute(
        "INSERT INTO vault_versions (vault_id, object_key, mac, created_by_device, created_at)
         VALUES (?1, ?2, NULL, ?3, ?4)",
        params![
            vault_id,
            object_key,
            created_by_device.map(|d| d.to_string()),
            created_at,
        ],
    )?;
    Ok(SnapshotRow {
        version_id: conn.last_insert_rowid(),
        vault_id,
        object_key: object_key.to_string(),
        mac: None,
        created_by_device: created_by_device.copied(),
        created_at,
    })
}

/// The latest snapshot version id, or 0 when the vault has none yet.
pub fn latest_snapshot_id(conn: &Connection, vault_id: i64) -> rusqlite::Result<i64> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT MAX(version_id) FROM vault_versions WHERE vault_id = ?1",
            [vault_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    Ok(id.unwrap_or(0))
}

pub fn snapshots_for_vault(
    conn: &Connection,
    vault_id: i64,
    limit: i64,
) -> rusqlite::Result<Vec<SnapshotRow>> {
    let mut stmt = conn.prepare(
        "SELECT version_id, vault_id, object_key, mac, created_by_device, created_at
         FROM vault_versions WHERE vault_id = ?1 ORDER BY version_id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![vault_id, limit], snapshot_from_row)?;
    rows.collect()
}
