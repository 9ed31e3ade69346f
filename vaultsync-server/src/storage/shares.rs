//! Sharing records and their lifecycle.

use super::models::{opt_uuid_column, uuid_column, ShareRow, ShareStatus, VaultRow};
use super::now;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

const SHARE_COLUMNS: &str = "share_id, vault_id, item_id, sender_user_id, recipient_user_id, \
                             wrapped_key, wrap_iv, wrap_tag, status, created_at, accepted_at";

fn share_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareRow> {
    let status_text: String = row.get(8)?;
    let status = ShareStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown share status: {}", status_text).into(),
        )
    })?;
    Ok(ShareRow {
        share_id: uuid_column(row, 0)?,
        vault_id: row.get(1)?,
        item_id: opt_uuid_column(row, 2)?,
        sender_user_id: row.get(3)?,
        recipient_user_id: row.get(4)?,
        wrapped_key: row.get(5)?,
        wrap_iv: row.get(6)?,
        wrap_tag: row.get(7)?,
        status,
        created_at: row.get(9)?,
        accepted_at: row.get(10)?,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn insert_share(
    conn: &Connection,
    vault_id: i64,
    item_id: Option<&Uuid>,
    sender_user_id: i64,
    recipient_user_id: i64,
    wrapped_key: &[u8],
    wrap_iv: &[u8],
    wrap_tag: &[u8],
) -> rusqlite::Result<ShareRow> {
    let share_id = Uuid::new_v4();
    let created_at = now();
    conn.execute(
        "INSERT INTO sharing_records
            (share_id, vault_id, item_id, sender_user_id, recipient_user_id,
             wrapped_key, wrap_iv, wrap_tag, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)",
        params![
            share_id.to_string(),
            vault_id,
            item_id.map(|i| i.to_string()),
            sender_user_id,
            recipient_user_id,
            wrapped_key,
            wrap_iv,
            wrap_tag,
            created_at,
        ],
    )?;
    Ok(ShareRow {
        share_id,
        vault_id,
        item_id: item_id.copied(),
        sender_user_id,
        recipient_user_id,
        wrapped_key: wrapped_key.to_vec(),
        wrap_iv: wrap_iv.to_vec(),
        wrap_tag: wrap_tag.to_vec(),
        status: ShareStatus::Pending,
        created_at,
        accepted_at: None,
    })
}

pub fn get_share(conn: &Connection, share_id: &Uuid) -> rusqlite::Result<Option<ShareRow>> {
    conn.query_row(
        &format!("SELECT {SHARE_COLUMNS} FROM sharing_records WHERE share_id = ?1"),
        [share_id.to_string()],
        share_from_row,
    )
    .optional()
}

pub fn pending_for_recipient(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<ShareRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SHARE_COLUMNS} FROM sharing_records
         WHERE recipient_user_id = ?1 AND status = 'pending' ORDER BY created_at"
    ))?;
    let rows = stmt.query_map([user_id], share_from_row)?;
    rows.collect()
}

/// Vaults shared with a user through accepted records.
pub fn accepted_vaults_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<VaultRow>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT v.vault_id, v.owner_user_id, v.name, v.created_at, v.updated_at
         FROM vaults v
         JOIN sharing_records s ON s.vault_id = v.vault_id
         WHERE s.recipient_user_id = ?1 AND s.status = 'accepted'
         ORDER BY v.vault_id",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(VaultRow {
            vault_id: row.get(0)?,
            owner_user_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Transition a pending share to accepted, stamping `accepted_at`.
pub fn accept_share(conn: &Connection, share_id: &Uuid) -> rusqlite::Result<Option<ShareRow>> {
    conn.execute(
        "UPDATE sharing_records SET status = 'accepted', accepted_at = ?1
         WHERE share_id = ?2 AND status = 'pending'",
        params![now(), share_id.to_string()],
    )?;
    get_share(conn, share_id)
}

/// Transition a pending share to rejected.
pub fn reject_share(conn: &Connection, share_id: &Uuid) -> rusqlite::Result<Option<ShareRow>> {
    conn.execute(
        "UPDATE sharing_records SET status = 'rejected'
         WHERE share_id = ?1 AND status = 'pending'",
        [share_id.to_string()],
    )?;
    get_share(conn, share_id)
}

/// Owner revocation of any non-terminal share.
pub fn revoke_share(conn: &Connection, share_id: &Uuid) -> rusqlite::Result<Option<ShareRow>> {
    conn.execute(
        "UPDATE sharing_records SET status = 'revoked'
         WHERE share_id = ?1 AND status IN ('pending', 'accepted')",
        [share_id.to_string()],
    )?;
    get_share(conn, share_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::devices::create_user;
    use crate::storage::vaults::{create_vault, user_has_access};
    use crate::storage::Storage;

    struct Fixture {
        storage: Storage,
        owner: i64,
        recipient: i64,
        vault_id: i64,
    }

    fn seeded() -> Fixture {
        let storage = Storage::in_memory().unwrap();
        let (owner, recipient, vault_id) = {
            let conn = storage.conn().unwrap();
            let owner = create_user(&conn, "owner@example.com", None, "hash").unwrap();
            let recipient = create_user(&conn, "friend@example.com", None, "hash").unwrap();
            let vault_id = create_vault(&conn, owner, "Shared").unwrap().vault_id;
            (owner, recipient, vault_id)
        };
        Fixture { storage, owner, recipient, vault_id }
    }

    fn make_share(f: &Fixture) -> ShareRow {
        let conn = f.storage.conn().unwrap();
        insert_share(
            &conn,
            f.vault_id,
            None,
            f.owner,
            f.recipient,
            &[1u8; 48],
            &[2u8; 12],
            &[3u8; 16],
        )
        .unwrap()
    }

    #[test]
    fn share_starts_pending() {
        let f = seeded();
        let share = make_share(&f);
        assert_eq!(share.status, ShareStatus::Pending);
        assert!(share.accepted_at.is_none());

        let conn = f.storage.conn().unwrap();
        let pending = pending_for_recipient(&conn, f.recipient).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].share_id, share.share_id);
    }

    #[test]
    fn accept_grants_access() {
        let f = seeded();
        let share = make_share(&f);
        let conn = f.storage.conn().unwrap();

        assert!(!user_has_access(&conn, f.vault_id, f.recipient).unwrap());

        let accepted = accept_share(&conn, &share.share_id).unwrap().unwrap();
        assert_eq!(accepted.status, ShareStatus::Accepted);
        assert!(accepted.accepted_at.is_some());
        assert!(user_has_access(&conn, f.vault_id, f.recipient).unwrap());

        let shared = accepted_vaults_for_user(&conn, f.recipient).unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].vault_id, f.vault_id);
    }

    #[test]
    fn rejected_is_terminal() {
        let f = seeded();
        let share = make_share(&f);
        let conn = f.storage.conn().unwrap();

        let rejected = reject_share(&conn, &share.share_id).unwrap().unwrap();
        assert_eq!(rejected.status, ShareStatus::Rejected);

        // Accept after reject does not change the state.
        let after = accept_share(&conn, &share.share_id).unwrap().unwrap();
        assert_eq!(after.status, ShareStatus::Rejected);

        // Neither does owner revocation.
        let after = revoke_share(&conn, &share.share_id).unwrap().unwrap();
        assert_eq!(after.status, ShareStatus::Rejected);
    }

    #[test]
    fn revoke_covers_pending_and_accepted() {
        let f = seeded();
        let conn = f.storage.conn().unwrap();

        let pending = insert_share(
            &conn, f.vault_id, None, f.owner, f.recipient, &[1u8; 48], &[2u8; 12], &[3u8; 16],
        )
        .unwrap();
        let revoked = revoke_share(&conn, &pending.share_id).unwrap().unwrap();
        assert_eq!(revoked.status, ShareStatus::Revoked);

        let accepted = insert_share(
            &conn, f.vault_id, None, f.owner, f.recipient, &[1u8; 48], &[2u8; 12], &[3u8; 16],
        )
        .unwrap();
        accept_share(&conn, &accepted.share_id).unwrap();
        let revoked = revoke_share(&conn, &accepted.share_id).unwrap().unwrap();
        assert_eq!(revoked.status, ShareStatus::Revoked);

        // Revoked share no longer grants access.
        assert!(!user_has_access(&conn, f.vault_id, f.recipient).unwrap());
    }

    #[test]
    fn item_share_keeps_item_id() {
        let f = seeded();
        let conn = f.storage.conn().unwrap();
        let item_id = Uuid::new_v4();

        let share = insert_share(
            &conn, f.vault_id, Some(&item_id), f.owner, f.recipient,
            &[1u8; 48], &[2u8; 12], &[3u8; 16],
        )
        .unwrap();
        let fetched = get_share(&conn, &share.share_id).unwrap().unwrap();
        assert_eq!(fetched.item_id, Some(item_id));
    }
}
