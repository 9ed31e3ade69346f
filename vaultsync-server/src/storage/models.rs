//! Storage row types.
//!
//! Nullable columns are explicit `Option`s; "no value" is never a zero
//! value.

use rusqlite::Row;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub verified: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub device_id: Uuid,
    pub user_id: i64,
    pub label: String,
    pub x25519_public: Vec<u8>,
    pub ed25519_public: Vec<u8>,
    pub created_at: i64,
    pub last_seen: Option<i64>,
    pub verified_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

impl DeviceRow {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct VaultRow {
    pub vault_id: i64,
    pub owner_user_id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct VaultKeyRow {
    pub vault_id: i64,
    pub version: i64,
    pub wrapped_vek: Vec<u8>,
    pub wrap_iv: Vec<u8>,
    pub wrap_tag: Vec<u8>,
    pub kdf_salt: Vec<u8>,
    pub kdf_params: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ItemRow {
    pub item_id: Uuid,
    pub vault_id: i64,
    pub item_type: String,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
    pub meta: Option<serde_json::Value>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub version_id: i64,
    pub vault_id: i64,
    pub object_key: String,
    pub mac: Option<Vec<u8>>,
    pub created_by_device: Option<Uuid>,
    pub created_at: i64,
}

/// Lifecycle state of a sharing record.
///
/// `Rejected` and `Revoked` are terminal; `Accepted` is terminal except
/// for owner revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareStatus {
    Pending,
    Accepted,
    Rejected,
    Revoked,
}

impl ShareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Revoked)
    }
}

#[derive(Debug, Clone)]
pub struct ShareRow {
    pub share_id: Uuid,
    pub vault_id: i64,
    pub item_id: Option<Uuid>,
    pub sender_user_id: i64,
    pub recipient_user_id: i64,
    pub wrapped_key: Vec<u8>,
    pub wrap_iv: Vec<u8>,
    pub wrap_tag: Vec<u8>,
    pub status: ShareStatus,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
}

/// Parse a UUID column stored as lowercase hyphenated text.
pub fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse an optional UUID column.
pub fn opt_uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(t) => t.parse().map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

/// Parse an optional JSON text column.
pub fn opt_json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(t) => serde_json::from_str(&t).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}
