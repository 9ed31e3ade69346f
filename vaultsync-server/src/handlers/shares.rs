//! Sharing lifecycle: blind relay of ECDH-wrapped keys.
//!
//! The server stores wrapped keys it cannot open and mediates the
//! pending → accepted | rejected | revoked state machine.

use super::{rfc3339, rfc3339_opt, ApiJson};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::storage::models::{ShareRow, ShareStatus};
use crate::storage::{devices, items, shares, vaults, Storage};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaultsync_core::crypto::aead::{NONCE_SIZE, TAG_SIZE};
use vaultsync_core::crypto::{decode_base64, encode_base64};

use super::vaults::VaultResponse;

#[derive(Deserialize)]
pub struct ShareVaultRequest {
    pub recipient_user_id: i64,
    /// Present for item-level shares; the wrapped key is then an IEK.
    #[serde(default)]
    pub item_id: Option<Uuid>,
    pub wrapped_key: String,
    pub wrap_iv: String,
    pub wrap_tag: String,
}

#[derive(Serialize)]
pub struct ShareResponse {
    pub id: Uuid,
    pub vault_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    pub sender_user_id: i64,
    pub recipient_user_id: i64,
    pub wrapped_key: String,
    pub wrap_iv: String,
    pub wrap_tag: String,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
}

impl From<ShareRow> for ShareResponse {
    fn from(s: ShareRow) -> Self {
        Self {
            id: s.share_id,
            vault_id: s.vault_id,
            item_id: s.item_id,
            sender_user_id: s.sender_user_id,
            recipient_user_id: s.recipient_user_id,
            wrapped_key: encode_base64(&s.wrapped_key),
            wrap_iv: encode_base64(&s.wrap_iv),
            wrap_tag: encode_base64(&s.wrap_tag),
            status: s.status.as_str().to_string(),
            created_at: rfc3339(s.created_at),
            accepted_at: rfc3339_opt(s.accepted_at),
        }
    }
}

/// POST /vaults/{id}/share (signed, owner only)
pub async fn create_share(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
    ApiJson(req): ApiJson<ShareVaultRequest>,
) -> Result<(StatusCode, Json<ShareResponse>), ApiError> {
    let wrapped_key = decode_base64(&req.wrapped_key)
        .map_err(|_| ApiError::BadRequest("invalid wrapped_key format".to_string()))?;
    let wrap_iv = decode_base64(&req.wrap_iv)
        .map_err(|_| ApiError::BadRequest("invalid wrap_iv format".to_string()))?;
    let wrap_tag = decode_base64(&req.wrap_tag)
        .map_err(|_| ApiError::BadRequest("invalid wrap_tag format".to_string()))?;
    if wrap_iv.len() != NONCE_SIZE {
        return Err(ApiError::BadRequest(format!("wrap_iv must be {} bytes", NONCE_SIZE)));
    }
    if wrap_tag.len() != TAG_SIZE {
        return Err(ApiError::BadRequest(format!("wrap_tag must be {} bytes", TAG_SIZE)));
    }

    let conn = storage.conn()?;

    let vault = vaults::get_vault(&conn, vault_id)?
        .ok_or_else(|| ApiError::NotFound("vault not found".to_string()))?;
    if vault.owner_user_id != user.user_id {
        return Err(ApiError::NotAuthorized("only the vault owner can share".to_string()));
    }

    if req.recipient_user_id == user.user_id {
        return Err(ApiError::BadRequest("cannot share a vault with yourself".to_string()));
    }

    // The recipient must exist and have at least one device whose keys a
    // sender could have wrapped against.
    if devices::get_user(&conn, req.recipient_user_id)?.is_none() {
        return Err(ApiError::NotFound("recipient user not found".to_string()));
    }
    if devices::public_devices_for_user(&conn, req.recipient_user_id)?.is_empty() {
        return Err(ApiError::NotFound(
            "recipient has no active devices".to_string(),
        ));
    }

    if let Some(item_id) = &req.item_id {
        let item = items::get_item(&conn, item_id)?;
        if item.map(|i| i.vault_id) != Some(vault_id) {
            return Err(ApiError::NotFound("item not found in this vault".to_string()));
        }
    }

    let share = shares::insert_share(
        &conn,
        vault_id,
        req.item_id.as_ref(),
        user.user_id,
        req.recipient_user_id,
        &wrapped_key,
        &wrap_iv,
        &wrap_tag,
    )?;
    Ok((StatusCode::CREATED, Json(share.into())))
}

/// GET /shares/pending — pending shares addressed to me.
pub async fn pending_shares(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ShareResponse>>, ApiError> {
    let conn = storage.conn()?;
    let rows = shares::pending_for_recipient(&conn, user.user_id)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /vaults/shared — vaults shared with me through accepted records.
pub async fn shared_vaults(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<VaultResponse>>, ApiError> {
    let conn = storage.conn()?;
    let rows = shares::accepted_vaults_for_user(&conn, user.user_id)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// POST /shares/{id}/accept (recipient only)
pub async fn accept_share(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(share_id): Path<Uuid>,
) -> Result<Json<ShareResponse>, ApiError> {
    let conn = storage.conn()?;
    let share = shares::get_share(&conn, &share_id)?
        .ok_or_else(|| ApiError::NotFound("sharing record not found".to_string()))?;
    if share.recipient_user_id != user.user_id {
        return Err(ApiError::NotAuthorized(
            "not authorized to accept this share".to_string(),
        ));
    }
    if share.status != ShareStatus::Pending {
        return Err(ApiError::ShareStateInvalid(format!(
            "cannot accept a {} share",
            share.status.as_str()
        )));
    }

    let updated = shares::accept_share(&conn, &share_id)?
        .ok_or_else(|| ApiError::NotFound("sharing record not found".to_string()))?;
    Ok(Json(updated.into()))
}

/// POST /shares/{id}/reject (recipient only)
pub async fn reject_share(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(share_id): Path<Uuid>,
) -> Result<Json<ShareResponse>, ApiError> {
    let conn = storage.conn()?;
    let share = shares::get_share(&conn, &share_id)?
        .ok_or_else(|| ApiError::NotFound("sharing record not found".to_string()))?;
    if share.recipient_user_id != user.user_id {
        return Err(ApiError::NotAuthorized(
            "not authorized to reject this share".to_string(),
        ));
    }
    if share.status != ShareStatus::Pending {
        return Err(ApiError::ShareStateInvalid(format!(
            "cannot reject a {} share",
            share.status.as_str()
        )));
    }

    let updated = shares::reject_share(&conn, &share_id)?
        .ok_or_else(|| ApiError::NotFound("sharing record not found".to_string()))?;
    Ok(Json(updated.into()))
}

/// DELETE /shares/{id} (signed, owner only)
///
/// Revokes any non-terminal share; the wrapped key is never returned to
/// the recipient afterwards.
pub async fn revoke_share(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(share_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = storage.conn()?;
    let share = shares::get_share(&conn, &share_id)?
        .ok_or_else(|| ApiError::NotFound("sharing record not found".to_string()))?;

    let vault = vaults::get_vault(&conn, share.vault_id)?
        .ok_or_else(|| ApiError::NotFound("vault not found".to_string()))?;
    if vault.owner_user_id != user.user_id {
        return Err(ApiError::NotAuthorized(
            "only the vault owner can revoke shares".to_string(),
        ));
    }
    if share.status.is_terminal() {
        return Err(ApiError::ShareStateInvalid(format!(
            "cannot revoke a {} share",
            share.status.as_str()
        )));
    }

    shares::revoke_share(&conn, &share_id)?;
    Ok(Json(serde_json::json!({ "message": "share revoked" })))
}
