//! Vault synchronization: deterministic state ETags and optimistic-
//! concurrency commit application.

use crate::error::ApiError;
use crate::storage::models::ItemRow;
use crate::storage::{items, vaults};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use vaultsync_core::crypto::decode_base64;

/// Compute the ETag summarizing a vault's state.
///
/// `items` must be sorted by item id; the storage listing guarantees it.
/// The fold is `"{vault_id}:{version_id}:{count}"` followed by each
/// item's raw UUID bytes and `:{version}`.
pub fn compute_etag(vault_id: i64, snapshot_version_id: i64, items: &[ItemRow]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", vault_id, snapshot_version_id, items.len()));
    for item in items {
        hasher.update(item.item_id.as_bytes());
        hasher.update(format!(":{}", item.version));
    }
    hex::encode(hasher.finalize())
}

/// ETag of a vault's current state as stored.
pub fn current_etag(conn: &Connection, vault_id: i64) -> Result<String, ApiError> {
    let rows = items::items_for_vault(conn, vault_id)?;
    let version_id = vaults::latest_snapshot_id(conn, vault_id)?;
    Ok(compute_etag(vault_id, version_id, &rows))
}

/// A single per-item operation in a commit batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SyncOperation {
    Create {
        item_type: String,
        ciphertext: String,
        iv: String,
        tag: String,
        #[serde(default)]
        meta: Option<serde_json::Value>,
    },
    Update {
        item_id: Uuid,
        ciphertext: String,
        iv: String,
        tag: String,
        #[serde(default)]
        meta: Option<serde_json::Value>,
        base_version: i64,
    },
    Delete {
        item_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    VersionMismatch,
    NotFound,
    Malformed,
}

/// A per-item failure recorded during commit. The batch keeps going;
/// conflicts never abort the surviving operations.
#[derive(Debug, Clone, Serialize)]
pub struct SyncConflict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    pub kind: ConflictKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<i64>,
    pub attempted: &'static str,
}

/// Result of a commit: what landed, what conflicted, and the state tag
/// after the batch.
#[derive(Debug)]
pub struct CommitOutcome {
    pub new_version_id: i64,
    pub committed: Vec<ItemRow>,
    pub conflicts: Vec<SyncConflict>,
    pub etag: String,
}

/// Decoded AEAD fields of an operation.
struct DecodedFields {
    ciphertext: Vec<u8>,
    iv: Vec<u8>,
    tag: Vec<u8>,
}

fn decode_fields(ciphertext: &str, iv: &str, tag: &str) -> Option<DecodedFields> {
    let ciphertext = decode_base64(ciphertext).ok()?;
    let iv = decode_base64(iv).ok()?;
    let tag = decode_base64(tag).ok()?;
    if iv.len() != 12 || tag.len() != 16 {
        return None;
    }
    Some(DecodedFields { ciphertext, iv, tag })
}

/// Apply a commit batch to a vault.
///
/// Runs inside one transaction so the read-modify-write cycle on every
/// item appears atomic to concurrent commits, and so the snapshot row is
/// never observable apart from the writes it marks. The `if_match`
/// precondition is checked inside the same transaction; on mismatch
/// nothing is written.
pub fn apply_commit(
    conn: &mut Connection,
    vault_id: i64,
    device_id: &Uuid,
    if_match: Option<&str>,
    operations: &[SyncOperation],
) -> Result<CommitOutcome, ApiError> {
    let tx = conn.transaction().map_err(ApiError::from)?;

    if let Some(expected) = if_match {
        let current = current_etag(&tx, vault_id)?;
        if expected != current {
            // Dropping the transaction rolls it back; no writes occurred.
            return Err(ApiError::PreconditionFailed { current_etag: current });
        }
    }

    let mut committed = Vec::new();
    let mut conflicts = Vec::new();

    for op in operations {
        match op {
            SyncOperation::Create { item_type, ciphertext, iv, tag, meta } => {
                if !items::valid_item_type(item_type) {
                    conflicts.push(SyncConflict {
                        item_id: None,
                        kind: ConflictKind::Malformed,
                        current_version: None,
                        attempted: "create",
                    });
                    continue;
                }
                let Some(fields) = decode_fields(ciphertext, iv, tag) else {
                    conflicts.push(SyncConflict {
                        item_id: None,
                        kind: ConflictKind::Malformed,
                        current_version: None,
                        attempted: "create",
                    });
                    continue;
                };
                let item = items::create_item(
                    &tx,
                    vault_id,
                    item_type,
                    &fields.ciphertext,
                    &fields.iv,
                    &fields.tag,
                    meta.as_ref(),
                )?;
                committed.push(item);
            }

            SyncOperation::Update { item_id, ciphertext, iv, tag, meta, base_version } => {
                let Some(fields) = decode_fields(ciphertext, iv, tag) else {
                    conflicts.push(SyncConflict {
                        item_id: Some(*item_id),
                        kind: ConflictKind::Malformed,
                        current_version: None,
                        attempted: "update",
                    });
                    continue;
                };
                let Some(current) = items::get_item(&tx, item_id)? else {
                    conflicts.push(SyncConflict {
                        item_id: Some(*item_id),
                        kind: ConflictKind::NotFound,
                        current_version: None,
                        attempted: "update",
                    });
                    continue;
                };
                if current.vault_id != vault_id {
                    conflicts.push(SyncConflict {
                        item_id: Some(*item_id),
                        kind: ConflictKind::NotFound,
                        current_version: None,
                        attempted: "update",
                    });
                    continue;
                }
                if current.version != *base_version {
                    conflicts.push(SyncConflict {
                        item_id: Some(*item_id),
                        kind: ConflictKind::VersionMismatch,
                        current_version: Some(current.version),
                        attempted: "update",
                    });
                    continue;
                }
                let updated = items::update_item(
                    &tx,
                    item_id,
                    &fields.ciphertext,
                    &fields.iv,
                    &fields.tag,
                    meta.as_ref(),
                    current.version + 1,
                )?;
                match updated {
                    Some(row) => committed.push(row),
                    None => conflicts.push(SyncConflict {
                        item_id: Some(*item_id),
                        kind: ConflictKind::NotFound,
                        current_version: None,
                        attempted: "update",
                    }),
                }
            }

            SyncOperation::Delete { item_id } => {
                if !items::delete_item(&tx, vault_id, item_id)? {
                    conflicts.push(SyncConflict {
                        item_id: Some(*item_id),
                        kind: ConflictKind::NotFound,
                        current_version: None,
                        attempted: "delete",
                    });
                }
            }
        }
    }

    let object_key = format!(
        "vaults/{}/versions/{}.snapshot",
        vault_id,
        chrono::Utc::now().timestamp()
    );
    let snapshot = vaults::insert_snapshot(&tx, vault_id, &object_key, Some(device_id))?;

    let rows = items::items_for_vault(&tx, vault_id)?;
    let etag = compute_etag(vault_id, snapshot.version_id, &rows);

    tx.commit().map_err(ApiError::from)?;

    Ok(CommitOutcome {
        new_version_id: snapshot.version_id,
        committed,
        conflicts,
        etag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::devices::create_user;
    use crate::storage::vaults::create_vault;
    use crate::storage::Storage;
    use vaultsync_core::crypto::encode_base64;

    fn seeded() -> (Storage, i64) {
        let storage = Storage::in_memory().unwrap();
        let vault_id = {
            let conn = storage.conn().unwrap();
            let user_id = create_user(&conn, "owner@example.com", None, "hash").unwrap();
            create_vault(&conn, user_id, "Personal").unwrap().vault_id
        };
        (storage, vault_id)
    }

    fn create_op(payload: &[u8]) -> SyncOperation {
        SyncOperation::Create {
            item_type: "login".to_string(),
            ciphertext: encode_base64(payload),
            iv: encode_base64(&[0u8; 12]),
            tag: encode_base64(&[0u8; 16]),
            meta: None,
        }
    }

    #[test]
    fn etag_is_deterministic_and_state_sensitive() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();

        let device = Uuid::new_v4();
        apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"a")]).unwrap();

        let e1 = current_etag(&conn, vault_id).unwrap();
        let e2 = current_etag(&conn, vault_id).unwrap();
        assert_eq!(e1, e2);
        assert_eq!(e1.len(), 64);
        assert!(e1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"b")]).unwrap();
        assert_ne!(current_etag(&conn, vault_id).unwrap(), e1);
    }

    #[test]
    fn commit_creates_at_version_one() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        let outcome =
            apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"secret")]).unwrap();
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.committed[0].version, 1);
        assert!(outcome.new_version_id >= 1);
    }

    #[test]
    fn stale_base_version_conflicts_without_state_change() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        let created =
            apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"v1")]).unwrap();
        let item_id = created.committed[0].item_id;

        let update = |base_version: i64, payload: &[u8]| SyncOperation::Update {
            item_id,
            ciphertext: encode_base64(payload),
            iv: encode_base64(&[0u8; 12]),
            tag: encode_base64(&[0u8; 16]),
            meta: None,
            base_version,
        };

        // Client A wins the race.
        let a = apply_commit(&mut conn, vault_id, &device, None, &[update(1, b"a")]).unwrap();
        assert!(a.conflicts.is_empty());
        assert_eq!(a.committed[0].version, 2);

        // Client B still holds base_version 1.
        let b = apply_commit(&mut conn, vault_id, &device, None, &[update(1, b"b")]).unwrap();
        assert_eq!(b.conflicts.len(), 1);
        let conflict = &b.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::VersionMismatch);
        assert_eq!(conflict.item_id, Some(item_id));
        assert_eq!(conflict.current_version, Some(2));
        assert_eq!(conflict.attempted, "update");

        // A's ciphertext survives.
        let row = items::get_item(&conn, &item_id).unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.ciphertext, b"a");
    }

    #[test]
    fn partial_commit_keeps_successes() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        // Seed Y (stale target) and Z (delete target).
        let seeded = apply_commit(
            &mut conn,
            vault_id,
            &device,
            None,
            &[create_op(b"y"), create_op(b"z")],
        )
        .unwrap();
        let y = seeded.committed[0].item_id;
        let z = seeded.committed[1].item_id;

        let batch = vec![
            create_op(b"x"),
            SyncOperation::Update {
                item_id: y,
                ciphertext: encode_base64(b"y2"),
                iv: encode_base64(&[0u8; 12]),
                tag: encode_base64(&[0u8; 16]),
                meta: None,
                base_version: 99,
            },
            SyncOperation::Delete { item_id: z },
        ];

        let outcome = apply_commit(&mut conn, vault_id, &device, None, &batch).unwrap();

        // X created, Z deleted, Y conflicted.
        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::VersionMismatch);
        assert!(items::get_item(&conn, &z).unwrap().is_none());
        let y_row = items::get_item(&conn, &y).unwrap().unwrap();
        assert_eq!(y_row.ciphertext, b"y");

        // The returned ETag reflects the post-batch state.
        assert_eq!(outcome.etag, current_etag(&conn, vault_id).unwrap());
    }

    #[test]
    fn if_match_mismatch_writes_nothing() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"seed")]).unwrap();
        let stale = current_etag(&conn, vault_id).unwrap();

        // Concurrent commit advances the state.
        apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"advance")]).unwrap();
        let advanced = current_etag(&conn, vault_id).unwrap();

        let err = apply_commit(
            &mut conn,
            vault_id,
            &device,
            Some(&stale),
            &[create_op(b"rejected")],
        )
        .unwrap_err();
        match err {
            ApiError::PreconditionFailed { current_etag: reported } => {
                assert_eq!(reported, advanced)
            }
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }

        // No writes, no snapshot advance.
        assert_eq!(current_etag(&conn, vault_id).unwrap(), advanced);
        assert_eq!(items::items_for_vault(&conn, vault_id).unwrap().len(), 2);
    }

    #[test]
    fn matching_if_match_commits() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"seed")]).unwrap();
        let etag = current_etag(&conn, vault_id).unwrap();

        let outcome =
            apply_commit(&mut conn, vault_id, &device, Some(&etag), &[create_op(b"next")]).unwrap();
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.committed.len(), 1);
    }

    #[test]
    fn malformed_fields_surface_as_conflicts() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        let bad = SyncOperation::Create {
            item_type: "login".to_string(),
            ciphertext: "not base64!!".to_string(),
            iv: encode_base64(&[0u8; 12]),
            tag: encode_base64(&[0u8; 16]),
            meta: None,
        };
        let short_iv = SyncOperation::Create {
            item_type: "login".to_string(),
            ciphertext: encode_base64(b"ct"),
            iv: encode_base64(&[0u8; 11]),
            tag: encode_base64(&[0u8; 16]),
            meta: None,
        };
        let bad_type = SyncOperation::Create {
            item_type: "totp".to_string(),
            ciphertext: encode_base64(b"ct"),
            iv: encode_base64(&[0u8; 12]),
            tag: encode_base64(&[0u8; 16]),
            meta: None,
        };

        let outcome =
            apply_commit(&mut conn, vault_id, &device, None, &[bad, short_iv, bad_type]).unwrap();
        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.conflicts.len(), 3);
        assert!(outcome.conflicts.iter().all(|c| c.kind == ConflictKind::Malformed));
    }

    #[test]
    fn delete_of_absent_item_is_not_found() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        let outcome = apply_commit(
            &mut conn,
            vault_id,
            &device,
            None,
            &[SyncOperation::Delete { item_id: Uuid::new_v4() }],
        )
        .unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::NotFound);
        assert_eq!(outcome.conflicts[0].attempted, "delete");
    }

    #[test]
    fn every_commit_records_a_snapshot() {
        let (storage, vault_id) = seeded();
        let mut conn = storage.conn().unwrap();
        let device = Uuid::new_v4();

        let first =
            apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"a")]).unwrap();
        let second =
            apply_commit(&mut conn, vault_id, &device, None, &[create_op(b"b")]).unwrap();
        assert!(second.new_version_id > first.new_version_id);

        let history = vaults::snapshots_for_vault(&conn, vault_id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].created_by_device, Some(device));
        assert!(history[0].object_key.starts_with(&format!("vaults/{}/versions/", vault_id)));
    }

    #[test]
    fn operation_wire_format_parses() {
        let json = serde_json::json!([
            {"op": "create", "item_type": "login", "ciphertext": "YQ==", "iv": "AAAAAAAAAAAAAAAA", "tag": "AAAAAAAAAAAAAAAAAAAAAA==", "meta": {"label": "x"}},
            {"op": "update", "item_id": "11111111-1111-1111-1111-111111111111", "ciphertext": "YQ==", "iv": "AAAAAAAAAAAAAAAA", "tag": "AAAAAAAAAAAAAAAAAAAAAA==", "base_version": 5},
            {"op": "delete", "item_id": "22222222-2222-2222-2222-222222222222"}
        ]);
        let ops: Vec<SyncOperation> = serde_json::from_value(json).unwrap();
        assert!(matches!(ops[0], SyncOperation::Create { .. }));
        assert!(matches!(ops[1], SyncOperation::Update { base_version: 5, .. }));
        assert!(matches!(ops[2], SyncOperation::Delete { .. }));
    }
}
