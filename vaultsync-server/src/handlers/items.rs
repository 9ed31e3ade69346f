//! Direct item endpoints: signed create/update/delete, blob-free
//! listing, full single-item reads.

use super::{rfc3339, ApiJson};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::storage::models::ItemRow;
use crate::storage::{items, vaults, Storage};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaultsync_core::crypto::aead::{NONCE_SIZE, TAG_SIZE};
use vaultsync_core::crypto::{decode_base64, encode_base64};

#[derive(Deserialize)]
pub struct CreateItemRequest {
    pub item_type: String,
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    pub base_version: i64,
}

#[derive(Deserialize)]
pub struct ListItemsQuery {
    #[serde(rename = "type")]
    pub item_type: Option<String>,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub vault_id: i64,
    pub item_type: String,
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing entry: metadata only, no ciphertext blobs.
#[derive(Serialize)]
pub struct ItemSummary {
    pub id: Uuid,
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ItemRow> for ItemResponse {
    fn from(i: ItemRow) -> Self {
        Self {
            id: i.item_id,
            vault_id: i.vault_id,
            item_type: i.item_type,
            ciphertext: encode_base64(&i.ciphertext),
            iv: encode_base64(&i.iv),
            tag: encode_base64(&i.tag),
            meta: i.meta,
            version: i.version,
            created_at: rfc3339(i.created_at),
            updated_at: rfc3339(i.updated_at),
        }
    }
}

impl From<ItemRow> for ItemSummary {
    fn from(i: ItemRow) -> Self {
        Self {
            id: i.item_id,
            item_type: i.item_type,
            meta: i.meta,
            version: i.version,
            created_at: rfc3339(i.created_at),
            updated_at: rfc3339(i.updated_at),
        }
    }
}

struct AeadFields {
    ciphertext: Vec<u8>,
    iv: Vec<u8>,
    tag: Vec<u8>,
}

fn decode_aead_fields(ciphertext: &str, iv: &str, tag: &str) -> Result<AeadFields, ApiError> {
    let ciphertext = decode_base64(ciphertext)
        .map_err(|_| ApiError::BadRequest("invalid ciphertext format".to_string()))?;
    let iv =
        decode_base64(iv).map_err(|_| ApiError::BadRequest("invalid iv format".to_string()))?;
    let tag =
        decode_base64(tag).map_err(|_| ApiError::BadRequest("invalid tag format".to_string()))?;
    if iv.len() != NONCE_SIZE {
        return Err(ApiError::BadRequest(format!("iv must be {} bytes", NONCE_SIZE)));
    }
    if tag.len() != TAG_SIZE {
        return Err(ApiError::BadRequest(format!("tag must be {} bytes", TAG_SIZE)));
    }
    Ok(AeadFields { ciphertext, iv, tag })
}

fn require_owner(conn: &rusqlite::Connection, vault_id: i64, user_id: i64) -> Result<(), ApiError> {
    let vault = vaults::get_vault(conn, vault_id)?
        .ok_or_else(|| ApiError::NotFound("vault not found".to_string()))?;
    if vault.owner_user_id != user_id {
        return Err(ApiError::NotAuthorized("not the vault owner".to_string()));
    }
    Ok(())
}

fn require_access(conn: &rusqlite::Connection, vault_id: i64, user_id: i64) -> Result<(), ApiError> {
    if vaults::get_vault(conn, vault_id)?.is_none() {
        return Err(ApiError::NotFound("vault not found".to_string()));
    }
    if !vaults::user_has_access(conn, vault_id, user_id)? {
        return Err(ApiError::NotAuthorized("no access to this vault".to_string()));
    }
    Ok(())
}

/// POST /vaults/{id}/items (signed)
pub async fn create_item(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
    ApiJson(req): ApiJson<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    if !items::valid_item_type(&req.item_type) {
        return Err(ApiError::BadRequest(format!(
            "item_type must be one of {:?}",
            items::ITEM_TYPES
        )));
    }
    let fields = decode_aead_fields(&req.ciphertext, &req.iv, &req.tag)?;

    let conn = storage.conn()?;
    require_owner(&conn, vault_id, user.user_id)?;

    let item = items::create_item(
        &conn,
        vault_id,
        &req.item_type,
        &fields.ciphertext,
        &fields.iv,
        &fields.tag,
        req.meta.as_ref(),
    )?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// GET /vaults/{id}/items — summaries without ciphertext blobs.
pub async fn list_items(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Vec<ItemSummary>>, ApiError> {
    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let rows = match &query.item_type {
        Some(item_type) => items::items_for_vault_by_type(&conn, vault_id, item_type)?,
        None => items::items_for_vault(&conn, vault_id)?,
    };
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /vaults/{id}/items/{iid} — full record.
pub async fn get_item(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path((vault_id, item_id)): Path<(i64, Uuid)>,
) -> Result<Json<ItemResponse>, ApiError> {
    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let item = items::get_item(&conn, &item_id)?
        .filter(|i| i.vault_id == vault_id)
        .ok_or_else(|| ApiError::NotFound("item not found".to_string()))?;
    Ok(Json(item.into()))
}

/// PUT /vaults/{id}/items/{iid} (signed, base_version required)
pub async fn update_item(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path((vault_id, item_id)): Path<(i64, Uuid)>,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    let fields = decode_aead_fields(&req.ciphertext, &req.iv, &req.tag)?;

    let conn = storage.conn()?;
    require_owner(&conn, vault_id, user.user_id)?;

    let current = items::get_item(&conn, &item_id)?
        .filter(|i| i.vault_id == vault_id)
        .ok_or_else(|| ApiError::NotFound("item not found".to_string()))?;

    if current.version != req.base_version {
        return Err(ApiError::VersionMismatch {
            current_version: current.version,
        });
    }

    let updated = items::update_item(
        &conn,
        &item_id,
        &fields.ciphertext,
        &fields.iv,
        &fields.tag,
        req.meta.as_ref(),
        current.version + 1,
    )?
    .ok_or_else(|| ApiError::NotFound("item not found".to_string()))?;
    Ok(Json(updated.into()))
}

/// DELETE /vaults/{id}/items/{iid} (signed)
pub async fn delete_item(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path((vault_id, item_id)): Path<(i64, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = storage.conn()?;
    require_owner(&conn, vault_id, user.user_id)?;

    if !items::delete_item(&conn, vault_id, &item_id)? {
        return Err(ApiError::NotFound("item not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "message": "item deleted" })))
}
