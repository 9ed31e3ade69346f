//! Request authentication: session resolution and device-signature
//! verification.
//!
//! Writes carry three headers (`X-Device-Id`, `X-Device-Timestamp`,
//! `X-Device-Signature`) proving possession of a registered device key.
//! Verification short-circuits in order: headers well-formed, timestamp
//! within the window, device valid for the session user, signature valid
//! over the canonical message. A replay cache rejects an identical
//! signed request seen again inside the window.

use crate::error::ApiError;
use crate::storage::{devices, Storage};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use vaultsync_core::crypto::decode_base64;
use vaultsync_core::protocol::{
    self, DEVICE_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};

/// The session-authenticated user, inserted by [`require_session`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

/// The verified signing device, inserted by the signature middleware on
/// signed requests.
#[derive(Debug, Clone, Copy)]
pub struct SignedDevice {
    pub device_id: Uuid,
}

/// Resolve `Authorization: Bearer <token>` to a user and stash it in the
/// request extensions. The account/session system itself lives outside
/// this server; this is its read interface.
pub async fn require_session(
    State(storage): State<Storage>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?
        .to_string();

    let user_id = {
        let conn = storage.conn()?;
        devices::user_for_session(&conn, &token)?
    }
    .ok_or(ApiError::Unauthenticated)?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

/// Whether a route's mutation must carry a device signature.
///
/// Signed: POST/PUT/DELETE on vault keys, items, sharing (create and
/// owner revoke), and sync commit. Unsigned mutations are the device
/// lifecycle itself (no usable key yet at registration), vault creation,
/// and the recipient's accept/reject.
pub fn signature_required(method: &Method, path: &str) -> bool {
    if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
        return false;
    }
    if path == "/devices/register" || path == "/devices/verify" || path == "/vaults" {
        return false;
    }
    if *method == Method::DELETE && path.starts_with("/devices/") {
        return false;
    }
    if path.starts_with("/shares/") && (path.ends_with("/accept") || path.ends_with("/reject")) {
        return false;
    }
    true
}

/// Device-signature middleware.
///
/// Mutations matching [`signature_required`] must verify; on any other
/// request the headers pass unchecked only when absent, and are
/// validated whenever a client includes them.
pub async fn verify_device_signature(
    State(storage): State<Storage>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers_present = request.headers().contains_key(DEVICE_ID_HEADER)
        || request.headers().contains_key(SIGNATURE_HEADER)
        || request.headers().contains_key(TIMESTAMP_HEADER);

    let required = signature_required(request.method(), request.uri().path());
    if !headers_present && !required {
        return Ok(next.run(request).await);
    }

    // 1. Headers present and well-formed.
    let device_id = header_str(&request, DEVICE_ID_HEADER)?
        .parse::<Uuid>()
        .map_err(|_| ApiError::AuthMissing)?;
    let timestamp_ms = header_str(&request, TIMESTAMP_HEADER)?
        .parse::<i64>()
        .map_err(|_| ApiError::AuthMissing)?;
    let signature = decode_base64(header_str(&request, SIGNATURE_HEADER)?)
        .map_err(|_| ApiError::AuthMissing)?;
    if signature.len() != 64 {
        return Err(ApiError::AuthMissing);
    }

    // 2. Timestamp within the acceptance window.
    let now_ms = chrono::Utc::now().timestamp_millis();
    if !protocol::timestamp_in_window(timestamp_ms, now_ms) {
        return Err(ApiError::AuthStale);
    }

    // 3. Device exists, belongs to the session user, not revoked.
    let user_id = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::Unauthenticated)?
        .user_id;

    let device = {
        let conn = storage.conn()?;
        devices::get_device(&conn, &device_id)?
    }
    .ok_or(ApiError::AuthDeviceInvalid)?;

    if device.user_id != user_id || device.is_revoked() {
        return Err(ApiError::AuthDeviceInvalid);
    }

    // 4. Signature over the canonical message.
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, 4 * 1024 * 1024)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {}", e)))?;

    let valid = protocol::verify_request(
        &device.ed25519_public,
        &method,
        &path,
        timestamp_ms,
        &body_bytes,
        &signature,
    )
    .map_err(|_| ApiError::AuthSignatureInvalid)?;
    if !valid {
        return Err(ApiError::AuthSignatureInvalid);
    }

    // Replay guard within the window, keyed by (device, body hash,
    // timestamp); identical requests re-sent inside the window are stale.
    let body_hash = hex::encode(Sha256::digest(&body_bytes));
    {
        let conn = storage.conn()?;
        if !devices::record_signed_request(&conn, &device_id, &body_hash, timestamp_ms)? {
            tracing::warn!(device = %device_id, "replayed signed request rejected");
            return Err(ApiError::AuthStale);
        }
        devices::touch_last_seen(&conn, &device_id)?;
    }

    let mut request = Request::from_parts(parts, Body::from(body_bytes));
    request.extensions_mut().insert(SignedDevice { device_id });
    Ok(next.run(request).await)
}

fn header_str<'a>(request: &'a Request, name: &str) -> Result<&'a str, ApiError> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::AuthMissing)
}
