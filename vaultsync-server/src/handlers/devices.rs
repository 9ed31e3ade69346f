//! Device enrollment, verification, listing, revocation, and public-key
//! disclosure.

use super::{rfc3339, rfc3339_opt, ApiJson};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::storage::{devices, Storage};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaultsync_core::crypto::{
    decode_base64, encode_base64, exchange, random, signing,
};

/// How long an enrollment challenge stays valid.
const CHALLENGE_TTL_SECS: i64 = 300;

#[derive(Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_label: String,
    /// base64, 32 bytes
    pub x25519_public: String,
    /// base64, 32 bytes
    pub ed25519_public: String,
}

#[derive(Serialize)]
pub struct RegisterDeviceResponse {
    pub device_id: Uuid,
    /// base64 challenge to sign in the verify step
    pub challenge: String,
    pub expires_at: i64,
}

#[derive(Deserialize)]
pub struct VerifyDeviceRequest {
    pub device_id: Uuid,
    /// base64 Ed25519 signature over the challenge bytes
    pub signature: String,
}

#[derive(Serialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub device_label: String,
    pub x25519_public: String,
    pub ed25519_public: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
}

#[derive(Serialize)]
pub struct PublicKeysResponse {
    pub device_id: Uuid,
    pub device_label: String,
    pub x25519_public: String,
    pub ed25519_public: String,
    pub created_at: String,
}

/// POST /devices/register
///
/// Persists the device keys and replies with a fresh challenge; signing
/// it via the verify endpoint marks the device verified.
pub async fn register_device(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<RegisterDeviceResponse>), ApiError> {
    let x25519_public = decode_base64(&req.x25519_public)
        .map_err(|_| ApiError::BadRequest("invalid x25519_public format".to_string()))?;
    exchange::validate_public_key(&x25519_public)?;

    let ed25519_public = decode_base64(&req.ed25519_public)
        .map_err(|_| ApiError::BadRequest("invalid ed25519_public format".to_string()))?;
    signing::validate_public_key(&ed25519_public)?;

    let device_id = Uuid::new_v4();
    let challenge = random::random_challenge();
    let expires_at = crate::storage::now() + CHALLENGE_TTL_SECS;

    let conn = storage.conn()?;
    devices::insert_device(
        &conn,
        &device_id,
        user.user_id,
        &req.device_label,
        &x25519_public,
        &ed25519_public,
    )?;
    devices::store_challenge(&conn, &device_id, &challenge, expires_at)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterDeviceResponse {
            device_id,
            challenge: encode_base64(&challenge),
            expires_at,
        }),
    ))
}

/// POST /devices/verify
///
/// Requires an Ed25519 signature over the exact stored challenge bytes;
/// a valid signature consumes the challenge and marks the device
/// verified.
pub async fn verify_device(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<VerifyDeviceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = decode_base64(&req.signature)
        .map_err(|_| ApiError::BadRequest("invalid signature format".to_string()))?;
    signing::validate_signature(&signature)?;

    let conn = storage.conn()?;
    let device = devices::get_device(&conn, &req.device_id)?
        .ok_or_else(|| ApiError::NotFound("device not found".to_string()))?;
    if device.user_id != user.user_id {
        return Err(ApiError::NotAuthorized(
            "device does not belong to user".to_string(),
        ));
    }
    if device.is_revoked() {
        return Err(ApiError::AuthDeviceInvalid);
    }

    let (challenge, expires_at) = devices::get_challenge(&conn, &req.device_id)?
        .ok_or_else(|| ApiError::NotFound("no pending challenge for device".to_string()))?;
    if expires_at < crate::storage::now() {
        devices::delete_challenge(&conn, &req.device_id)?;
        return Err(ApiError::BadRequest("challenge expired".to_string()));
    }

    let valid = signing::verify(&device.ed25519_public, &challenge, &signature)?;
    if !valid {
        return Err(ApiError::AuthSignatureInvalid);
    }

    devices::mark_verified(&conn, &req.device_id)?;
    devices::delete_challenge(&conn, &req.device_id)?;

    Ok(Json(serde_json::json!({
        "message": "device verified",
        "device_id": req.device_id,
    })))
}

/// GET /devices
pub async fn list_devices(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<DeviceResponse>>, ApiError> {
    let conn = storage.conn()?;
    let rows = devices::devices_for_user(&conn, user.user_id)?;
    let response = rows
        .into_iter()
        .map(|d| DeviceResponse {
            id: d.device_id,
            device_label: d.label,
            x25519_public: encode_base64(&d.x25519_public),
            ed25519_public: encode_base64(&d.ed25519_public),
            created_at: rfc3339(d.created_at),
            last_seen: rfc3339_opt(d.last_seen),
            verified_at: rfc3339_opt(d.verified_at),
            revoked_at: rfc3339_opt(d.revoked_at),
        })
        .collect();
    Ok(Json(response))
}

/// DELETE /devices/{id}
///
/// One-way idempotent revocation; the device's signatures are rejected
/// from this point on.
pub async fn revoke_device(
    State(storage): State<Storage>,
    Extension(user): Extension<AuthUser>,
    Path(device_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = storage.conn()?;
    let device = devices::get_device(&conn, &device_id)?
        .ok_or_else(|| ApiError::NotFound("device not found".to_string()))?;
    if device.user_id != user.user_id {
        return Err(ApiError::NotAuthorized(
            "not authorized to revoke this device".to_string(),
        ));
    }

    devices::revoke_device(&conn, &device_id)?;
    Ok(Json(serde_json::json!({ "message": "device revoked" })))
}

/// GET /users/{id}/public-keys
///
/// Only non-revoked devices are ever disclosed.
pub async fn user_public_keys(
    State(storage): State<Storage>,
    Extension(_user): Extension<AuthUser>,
    Path(target_user_id): Path<i64>,
) -> Result<Json<Vec<PublicKeysResponse>>, ApiError> {
    let conn = storage.conn()?;
    let rows = devices::public_devices_for_user(&conn, target_user_id)?;
    let response = rows
        .into_iter()
        .map(|d| PublicKeysResponse {
            device_id: d.device_id,
            device_label: d.label,
            x25519_public: encode_base64(&d.x25519_public),
            ed25519_public: encode_base64(&d.ed25519_public),
            created_at: rfc3339(d.created_at),
        })
        .collect();
    Ok(Json(response))
}
