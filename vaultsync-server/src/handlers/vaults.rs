//! Minimal vault surface: every core endpoint hangs off a vault id.

use super::{rfc3339, ApiJson};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::storage::models::VaultRow;
use crate::storage::{vaults, Storage};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreateVaultRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct VaultResponse {
    pub id: i64,
    pub name: String,
    pub owner_user_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<VaultRow> for VaultResponse {
    fn from(v: VaultRow) -> Self {
        Self {
            id: v.vault_id,
            name: v.name,
            owner_user_id: v.owner_user_id,
            created_at: rfc3339(v.created_at),
            updated_at: rfc3339(v.updated_at),
        }
    }
}

/// POST /vaults
pub async fn create_vault(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateVaultRequest>,
) -> Result<(StatusCode, Json<VaultResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("vault name must not be empty".to_string()));
    }
    let conn = storage.conn()?;
    let vault = vaults::create_vault(&conn, user.user_id, req.name.trim())?;
    Ok((StatusCode::CREATED, Json(vault.into())))
}

/// GET /vaults
pub async fn list_vaults(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<VaultResponse>>, ApiError> {
    let conn = storage.conn()?;
    let rows = vaults::vaults_for_owner(&conn, user.user_id)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /vaults/{id}
pub async fn get_vault(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
) -> Result<Json<VaultResponse>, ApiError> {
    let conn = storage.conn()?;
    let vault = vaults::get_vault(&conn, vault_id)?
        .ok_or_else(|| ApiError::NotFound("vault not found".to_string()))?;
    if !vaults::user_has_access(&conn, vault_id, user.user_id)? {
        return Err(ApiError::NotAuthorized("no access to this vault".to_string()));
    }
    Ok(Json(vault.into()))
}
