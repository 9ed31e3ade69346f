//! Bulk sync endpoints: ETag-gated pull, signed commit, snapshot
//! history.

use super::items::ItemResponse;
use super::{rfc3339, ApiJson};
use crate::auth::{AuthUser, SignedDevice};
use crate::error::ApiError;
use crate::storage::{items, vaults, Storage};
use crate::sync::{self, SyncConflict, SyncOperation};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaultsync_core::crypto::encode_base64;

#[derive(Deserialize, Default)]
pub struct CommitRequest {
    pub operations: Vec<SyncOperation>,
}

#[derive(Serialize)]
pub struct PullResponse {
    pub vault_id: i64,
    pub current_version: i64,
    pub items: Vec<ItemResponse>,
    pub deleted_item_ids: Vec<Uuid>,
    pub etag: String,
}

#[derive(Serialize)]
pub struct CommitResponse {
    pub vault_id: i64,
    pub new_version_id: i64,
    pub committed_items: Vec<ItemResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<SyncConflict>,
    pub etag: String,
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub id: i64,
    pub vault_id: i64,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_device: Option<Uuid>,
    pub created_at: String,
}

#[derive(Deserialize)]
pub struct VersionsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
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

/// POST /vaults/{id}/sync/pull
///
/// Returns the full current item list, tombstoned ids, the latest
/// snapshot version, and a state ETag. `If-None-Match` with the current
/// ETag short-circuits to 304 with no body.
pub async fn pull(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let rows = items::items_for_vault(&conn, vault_id)?;
    let version_id = vaults::latest_snapshot_id(&conn, vault_id)?;
    let etag = sync::compute_etag(vault_id, version_id, &rows);

    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok())
    {
        if if_none_match == etag {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let deleted_item_ids = items::tombstones_for_vault(&conn, vault_id)?;

    let response = PullResponse {
        vault_id,
        current_version: version_id,
        items: rows.into_iter().map(Into::into).collect(),
        deleted_item_ids,
        etag: etag.clone(),
    };

    Ok(([(header::ETAG, etag)], Json(response)).into_response())
}

/// POST /vaults/{id}/sync/commit (signed)
///
/// Applies the batch atomically with respect to other commits on the
/// vault. Conflicting operations are reported, successful ones persist;
/// any conflict turns the status into 409. `If-Match` gives clients
/// strict atomicity instead.
pub async fn commit(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Extension(device): Extension<SignedDevice>,
    Path(vault_id): Path<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CommitRequest>,
) -> Result<Response, ApiError> {
    let device_id = device.device_id;

    let if_match = headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let outcome = sync::apply_commit(
        &mut conn,
        vault_id,
        &device_id,
        if_match.as_deref(),
        &req.operations,
    )?;

    let status = if outcome.conflicts.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };

    let response = CommitResponse {
        vault_id,
        new_version_id: outcome.new_version_id,
        committed_items: outcome.committed.into_iter().map(Into::into).collect(),
        conflicts: outcome.conflicts,
        etag: outcome.etag.clone(),
    };

    Ok((status, [(header::ETAG, outcome.etag)], Json(response)).into_response())
}

/// GET /vaults/{id}/versions — snapshot history, newest first.
pub async fn versions(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(vault_id): Path<i64>,
    Query(query): Query<VersionsQuery>,
) -> Result<Json<Vec<SnapshotResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let conn = storage.conn()?;
    require_access(&conn, vault_id, user.user_id)?;

    let rows = vaults::snapshots_for_vault(&conn, vault_id, limit)?;
    let response = rows
        .into_iter()
        .map(|s| SnapshotResponse {
            id: s.version_id,
            vault_id: s.vault_id,
            object_key: s.object_key,
            mac: s.mac.as_deref().map(encode_base64),
            created_by_device: s.created_by_device,
            created_at: rfc3339(s.created_at),
        })
        .collect();
    Ok(Json(response))
}
