//! Versioned ciphertext item records and deletion tombstones.
//!
//! The store's contract is monotonicity only: `update_item` overwrites
//! unconditionally with the caller-computed version. The base-version
//! check belongs to the sync engine.

use super::models::{opt_json_column, uuid_column, ItemRow};
use super::now;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Item types accepted by the vault.
pub const ITEM_TYPES: &[&str] = &["login", "note", "card", "alias"];

pub fn valid_item_type(item_type: &str) -> bool {
    ITEM_TYPES.contains(&item_type)
}

const ITEM_COLUMNS: &str =
    "item_id, vault_id, item_type, ciphertext, iv, tag, meta, version, created_at, updated_at";

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item_id: uuid_column(row, 0)?,
        vault_id: row.get(1)?,
        item_type: row.get(2)?,
        ciphertext: row.get(3)?,
        iv: row.get(4)?,
        tag: row.get(5)?,
        meta: opt_json_column(row, 6)?,
        version: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Insert a new item with a freshly minted UUID. The version starts at 1
/// regardless of any client hint.
pub fn create_item(
    conn: &Connection,
    vault_id: i64,
    item_type: &str,
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    meta: Option<&serde_json::Value>,
) -> rusqlite::Result<ItemRow> {
    let item_id = Uuid::new_v4();
    let ts = now();
    conn.execute(
        "INSERT INTO vault_items
            (item_id, vault_id, item_type, ciphertext, iv, tag, meta, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
        params![
            item_id.to_string(),
            vault_id,
            item_type,
            ciphertext,
            iv,
            tag,
            meta.map(|m| m.to_string()),
            ts,
        ],
    )?;
    Ok(ItemRow {
        item_id,
        vault_id,
        item_type: item_type.to_string(),
        ciphertext: ciphertext.to_vec(),
        iv: iv.to_vec(),
        tag: tag.to_vec(),
        meta: meta.cloned(),
        version: 1,
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_item(conn: &Connection, item_id: &Uuid) -> rusqlite::Result<Option<ItemRow>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM vault_items WHERE item_id = ?1"),
        [item_id.to_string()],
        item_from_row,
    )
    .optional()
}

/// All items of a vault, sorted by item id so downstream state hashing
/// is deterministic across query plans.
pub fn items_for_vault(conn: &Connection, vault_id: i64) -> rusqlite::Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM vault_items WHERE vault_id = ?1 ORDER BY item_id"
    ))?;
    let rows = stmt.query_map([vault_id], item_from_row)?;
    rows.collect()
}

pub fn items_for_vault_by_type(
    conn: &Connection,
    vault_id: i64,
    item_type: &str,
) -> rusqlite::Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM vault_items
         WHERE vault_id = ?1 AND item_type = ?2 ORDER BY item_id"
    ))?;
    let rows = stmt.query_map(params![vault_id, item_type], item_from_row)?;
    rows.collect()
}

/// Overwrite an item's ciphertext fields with the caller-computed next
/// version. Returns the updated row, or None when the item is gone.
pub fn update_item(
    conn: &Connection,
    item_id: &Uuid,
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    meta: Option<&serde_json::Value>,
    new_version: i64,
) -> rusqlite::Result<Option<ItemRow>> {
    let changed = conn.execute(
        "UPDATE vault_items
         SET ciphertext = ?1, iv = ?2, tag = ?3, meta = ?4, version = ?5, updated_at = ?6
         WHERE item_id = ?7",
        params![
            ciphertext,
            iv,
            tag,
            meta.map(|m| m.to_string()),
            new_version,
            now(),
            item_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_item(conn, item_id)
}

/// Hard-delete an item, leaving a tombstone so offline clients learn of
/// the deletion on their next pull. Returns false when the row was
/// already absent.
pub fn delete_item(conn: &Connection, vault_id: i64, item_id: &Uuid) -> rusqlite::Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM vault_items WHERE item_id = ?1 AND vault_id = ?2",
        params![item_id.to_string(), vault_id],
    )?;
    if deleted == 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO item_tombstones (vault_id, item_id, deleted_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(vault_id, item_id) DO UPDATE SET deleted_at = excluded.deleted_at",
        params![vault_id, item_id.to_string(), now()],
    )?;
    Ok(true)
}

pub fn tombstones_for_vault(conn: &Connection, vault_id: i64) -> rusqlite::Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT item_id FROM item_tombstones WHERE vault_id = ?1 ORDER BY item_id",
    )?;
    let rows = stmt.query_map([vault_id], |row| uuid_column(row, 0))?;
    rows.collect()
}

pub fn prune_tombstones(conn: &Connection, older_than_secs: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM item_tombstones WHERE deleted_at < ?1",
        [now() - older_than_secs],
    )
}
