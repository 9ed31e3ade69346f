//! Wrapped vault-key versions: upload, current, history.
//!
//! The server stores wrapped VEKs as opaque blobs alongside the KDF
//! parameters the client used, and returns both verbatim.

use super::{rfc3339, ApiJson};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::storage::models::VaultKeyRow;
use crate::storage::{vaults, Storage};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use vaultsync_core::crypto::aead::{NONCE_SIZE, TAG_SIZE};
use vaultsync_core::crypto::{decode_base64, encode_base64};
use vaultsync_core::KdfParams;

#[derive(Deserialize)]
pub struct UploadVaultKeyRequest {
    pub wrapped_vek: String,
    pub wrap_iv: String,
    pub wrap_tag: String,
    pub kdf_salt: String,
    pub kdf_params: serde_json::Value,
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Serialize)]
pub struct VaultKeyResponse {
    pub vault_id: i64,
    pub wrapped_vek: String,
    pub wrap_iv: String,
    pub wrap_tag: String,
    pub kdf_salt: String,
    pub kdf_params: serde_json::Value,
    pub version: i64,
    pub created_at: String,
}

impl From<VaultKeyRow> for VaultKeyResponse {
    fn from(k: VaultKeyRow) -> Self {
        Self {
            vault_id: k.vault_id,
            wrapped_vek: encode_base64(&k.wrapped_vek),
            wrap_iv: encode_base64(&k.wrap_iv),
            wrap_tag: encode_base64(&k.wrap_tag),
            kdf_salt: encode_base64(&k.kdf_salt),
            kdf_params: k.kdf_params,
            version: k.version,
            created_at: rfc3339(k.created_at),
        }
    }
}

fn require_owner(
    conn: &rusqlite::Connection,
    vault_id: i64,
    user_id: i64,
) -> Result<(), ApiError> {
    let vault = vaults::get_vault(conn, vault_id)?
        .ok_or_else(|| ApiError::NotFound("vault not found".to_string()))?;
    if vault.owner_user_id != user_id {
        return Err(ApiError::NotAuthorized("not the vault owner".to_string()));
    }
    Ok(())
}

fn require_access(
    conn: &rusqlite::Connection,
    vault_id: i64,
    user_id: i64,
) -> Result<(), ApiError> {
    if vaults::get_vault(conn, vault_id)?.is_none() {
        return Err(ApiError::NotFound("vault not found".to_string()));
    }
    if !vaults::user_has_access(conn, vault_id, user_id)? {
        return Err(ApiError::NotAuthorized("no access to this vault".to_string()));
    }
    Ok(())
}

/// POST /vaults/{id}/keys (signed)
pub async fn upload_key(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
    ApiJson(req): ApiJson<UploadVaultKeyRequest>,
) -> Result<(StatusCode, Json<VaultKeyResponse>), ApiError> {
    let wrapped_vek = decode_base64(&req.wrapped_vek)
        .map_err(|_| ApiError::BadRequest("invalid wrapped_vek format".to_string()))?;
    let wrap_iv = decode_base64(&req.wrap_iv)
        .map_err(|_| ApiError::BadRequest("invalid wrap_iv format".to_string()))?;
    let wrap_tag = decode_base64(&req.wrap_tag)
        .map_err(|_| ApiError::BadRequest("invalid wrap_tag format".to_string()))?;
    let kdf_salt = decode_base64(&req.kdf_salt)
        .map_err(|_| ApiError::BadRequest("invalid kdf_salt format".to_string()))?;

    if wrap_iv.len() != NONCE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "wrap_iv must be {} bytes",
            NONCE_SIZE
        )));
    }
    if wrap_tag.len() != TAG_SIZE {
        return Err(ApiError::BadRequest(format!(
            "wrap_tag must be {} bytes",
            TAG_SIZE
        )));
    }

    let params: KdfParams = serde_json::from_value(req.kdf_params.clone())
        .map_err(|_| ApiError::BadRequest("invalid kdf_params format".to_string()))?;
    params.validate()?;

    let version = req.version.unwrap_or(1);
    if version < 1 {
        return Err(ApiError::BadRequest("version must be at least 1".to_string()));
    }

    let conn = storage.conn()?;
    require_owner(&conn, vault_id, user.user_id)?;

    let key = vaults::create_key_version(
        &conn,
        vault_id,
        version,
        &wrapped_vek,
        &wrap_iv,
        &wrap_tag,
        &kdf_salt,
        &req.kdf_params,
    )?;

    Ok((StatusCode::CREATED, Json(key.into())))
}

/// GET /vaults/{id}/keys — current wrapped VEK.
pub async fn current_key(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
) -> Result<Json<VaultKeyResponse>, ApiError> {
    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let key = vaults::get_current_key(&conn, vault_id)?
        .ok_or_else(|| ApiError::NotFound("vault key not found".to_string()))?;
    Ok(Json(key.into()))
}

/// GET /vaults/{id}/keys/versions
pub async fn all_versions(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
) -> Result<Json<Vec<VaultKeyResponse>>, ApiError> {
    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let keys = vaults::all_key_versions(&conn, vault_id)?;
    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

/// GET /vaults/{id}/keys/versions/{v}
pub async fn key_version(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path((vault_id, version)): Path<(i64, i64)>,
) -> Result<Json<VaultKeyResponse>, ApiError> {
    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let key = vaults::get_key_version(&conn, vault_id, version)?
        .ok_or_else(|| ApiError::NotFound("vault key version not found".to_string()))?;
    Ok(Json(key.into()))
}
