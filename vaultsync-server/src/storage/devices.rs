//! Users, sessions, devices, enrollment challenges, and the signed-request
//! replay cache.

use super::models::{uuid_column, DeviceRow, UserRow};
use super::now;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

const DEVICE_COLUMNS: &str = "device_id, user_id, label, x25519_public, ed25519_public, \
                              created_at, last_seen, verified_at, revoked_at";

fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRow> {
    Ok(DeviceRow {
        device_id: uuid_column(row, 0)?,
        user_id: row.get(1)?,
        label: row.get(2)?,
        x25519_public: row.get(3)?,
        ed25519_public: row.get(4)?,
        created_at: row.get(5)?,
        last_seen: row.get(6)?,
        verified_at: row.get(7)?,
        revoked_at: row.get(8)?,
    })
}

// --- users & sessions (interface to the out-of-scope account system) ---

pub fn create_user(
    conn: &Connection,
    email: &str,
    display_name: Option<&str>,
    credential_hash: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (email, display_name, credential_hash, verified, created_at)
         VALUES (?1, ?2, ?3, 1, ?4)",
        params![email, display_name, credential_hash, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        "SELECT user_id, email, display_name, verified, created_at FROM users WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(UserRow {
                user_id: row.get(0)?,
                email: row.get(1)?,
                display_name: row.get(2)?,
                verified: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()
}

pub fn create_session(
    conn: &Connection,
    user_id: i64,
    token: &str,
    ttl_secs: i64,
) -> rusqlite::Result<()> {
    let created = now();
    conn.execute(
        "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![token, user_id, created, created + ttl_secs],
    )?;
    Ok(())
}

/// Resolve a session token to its user, ignoring expired sessions.
pub fn user_for_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2",
        params![token, now()],
        |row| row.get(0),
    )
    .optional()
}

// --- devices ---

#[allow(clippy::too_many_arguments)]
pub fn insert_device(
    conn: &Connection,
    device_id: &Uuid,
    user_id: i64,
    label: &str,
    x25519_public: &[u8],
    ed25519_public: &[u8],
) -> rusqlite::Result<DeviceRow> {
    let created_at = now();
    conn.execute(
        "INSERT INTO devices (device_id, user_id, label, x25519_public, ed25519_public, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            device_id.to_string(),
            user_id,
            label,
            x25519_public,
            ed25519_public,
            created_at,
        ],
    )?;
    Ok(DeviceRow {
        device_id: *device_id,
        user_id,
        label: label.to_string(),
        x25519_public: x25519_public.to_vec(),
        ed25519_public: ed25519_public.to_vec(),
        created_at,
        last_seen: None,
        verified_at: None,
        revoked_at: None,
    })
}

pub fn get_device(conn: &Connection, device_id: &Uuid) -> rusqlite::Result<Option<DeviceRow>> {
    conn.query_row(
        &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?1"),
        [device_id.to_string()],
        device_from_row,
    )
    .optional()
}

pub fn devices_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<DeviceRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = ?1 ORDER BY created_at"
    ))?;
    let rows = stmt.query_map([user_id], device_from_row)?;
    rows.collect()
}

/// Non-revoked devices of a user, for public-key disclosure.
pub fn public_devices_for_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<DeviceRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices
         WHERE user_id = ?1 AND revoked_at IS NULL ORDER BY created_at"
    ))?;
    let rows = stmt.query_map([user_id], device_from_row)?;
    rows.collect()
}

/// One-way idempotent revocation: sets `revoked_at` only when still null.
pub fn revoke_device(conn: &Connection, device_id: &Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE devices SET revoked_at = ?1 WHERE device_id = ?2 AND revoked_at IS NULL",
        params![now(), device_id.to_string()],
    )?;
    Ok(())
}

pub fn touch_last_seen(conn: &Connection, device_id: &Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE devices SET last_seen = ?1 WHERE device_id = ?2",
        params![now(), device_id.to_string()],
    )?;
    Ok(())
}

pub fn mark_verified(conn: &Connection, device_id: &Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE devices SET verified_at = ?1 WHERE device_id = ?2 AND verified_at IS NULL",
        params![now(), device_id.to_string()],
    )?;
    Ok(())
}

// --- enrollment challenges ---

pub fn store_challenge(
    conn: &Connection,
    device_id: &Uuid,
    challenge: &[u8],
    expires_at: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO device_challenges (device_id, challenge, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(device_id) DO UPDATE SET
            challenge = excluded.challenge,
            expires_at = excluded.expires_at",
        params![device_id.to_string(), challenge, expires_at],
    )?;
    Ok(())
}

pub fn get_challenge(
    conn: &Connection,
    device_id: &Uuid,
) -> rusqlite::Result<Option<(Vec<u8>, i64)>> {
    conn.query_row(
        "SELECT challenge, expires_at FROM device_challenges WHERE device_id = ?1",
        [device_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// Consume a challenge after successful verification.
pub fn delete_challenge(conn: &Connection, device_id: &Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM device_challenges WHERE device_id = ?1",
        [device_id.to_string()],
    )?;
    Ok(())
}

pub fn prune_expired_challenges(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM device_challenges WHERE expires_at < ?1", [now()])
}

// --- replay cache ---

/// Record a signed request. Returns false when the same
/// `(device, body hash, timestamp)` triple was already seen, i.e. a
/// replay within the signature window.
pub fn record_signed_request(
    conn: &Connection,
    device_id: &Uuid,
    body_sha256: &str,
    timestamp_ms: i64,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO seen_requests (device_id, body_sha256, timestamp_ms, seen_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![device_id.to_string(), body_sha256, timestamp_ms, now()],
    )?;
    Ok(inserted > 0)
}

pub fn prune_seen_requests(conn: &Connection, older_than_secs: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM seen_requests WHERE seen_at < ?1",
        [now() - older_than_secs],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn seeded() -> (Storage, i64) {
        let storage = Storage::in_memory().unwrap();
        let user_id = {
            let conn = storage.conn().unwrap();
            create_user(&conn, "alice@example.com", Some("Alice"), "hash").unwrap()
        };
        (storage, user_id)
    }

    #[test]
    fn device_insert_and_lookup() {
        let (storage, user_id) = seeded();
        let conn = storage.conn().unwrap();
        let id = Uuid::new_v4();

        let device = insert_device(&conn, &id, user_id, "Laptop", &[1u8; 32], &[2u8; 32]).unwrap();
        assert_eq!(device.device_id, id);
        assert_eq!(device.label, "Laptop");
        assert!(device.revoked_at.is_none());
        assert!(device.verified_at.is_none());

        let fetched = get_device(&conn, &id).unwrap().unwrap();
        assert_eq!(fetched.ed25519_public, vec![2u8; 32]);
    }

    #[test]
    fn revocation_is_idempotent_and_one_way() {
        let (storage, user_id) = seeded();
        let conn = storage.conn().unwrap();
        let id = Uuid::new_v4();
        insert_device(&conn, &id, user_id, "Laptop", &[1u8; 32], &[2u8; 32]).unwrap();

        revoke_device(&conn, &id).unwrap();
        let first = get_device(&conn, &id).unwrap().unwrap().revoked_at.unwrap();

        revoke_device(&conn, &id).unwrap();
        let second = get_device(&conn, &id).unwrap().unwrap().revoked_at.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn public_listing_excludes_revoked() {
        let (storage, user_id) = seeded();
        let conn = storage.conn().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        insert_device(&conn, &a, user_id, "A", &[1u8; 32], &[2u8; 32]).unwrap();
        insert_device(&conn, &b, user_id, "B", &[3u8; 32], &[4u8; 32]).unwrap();
        revoke_device(&conn, &b).unwrap();

        let public = public_devices_for_user(&conn, user_id).unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].device_id, a);

        // The full listing still shows both.
        assert_eq!(devices_for_user(&conn, user_id).unwrap().len(), 2);
    }

    #[test]
    fn challenge_store_and_consume() {
        let (storage, user_id) = seeded();
        let conn = storage.conn().unwrap();
        let id = Uuid::new_v4();
        insert_device(&conn, &id, user_id, "A", &[1u8; 32], &[2u8; 32]).unwrap();

        store_challenge(&conn, &id, &[9u8; 32], now() + 300).unwrap();
        let (challenge, _) = get_challenge(&conn, &id).unwrap().unwrap();
        assert_eq!(challenge, vec![9u8; 32]);

        delete_challenge(&conn, &id).unwrap();
        assert!(get_challenge(&conn, &id).unwrap().is_none());
    }

    #[test]
    fn replay_cache_detects_duplicates() {
        let (storage, user_id) = seeded();
        let conn = storage.conn().unwrap();
        let id = Uuid::new_v4();
        insert_device(&conn, &id, user_id, "A", &[1u8; 32], &[2u8; 32]).unwrap();

        assert!(record_signed_request(&conn, &id, "abcd", 1_700_000_000_000).unwrap());
        assert!(!record_signed_request(&conn, &id, "abcd", 1_700_000_000_000).unwrap());
        // Different timestamp is a different request.
        assert!(record_signed_request(&conn, &id, "abcd", 1_700_000_000_001).unwrap());
    }

    #[test]
    fn session_expiry_respected() {
        let (storage, user_id) = seeded();
        let conn = storage.conn().unwrap();

        create_session(&conn, user_id, "live-token", 3600).unwrap();
        create_session(&conn, user_id, "dead-token", -10).unwrap();

        assert_eq!(user_for_session(&conn, "live-token").unwrap(), Some(user_id));
        assert_eq!(user_for_session(&conn, "dead-token").unwrap(), None);
        assert_eq!(user_for_session(&conn, "missing").unwrap(), None);
    }
}
