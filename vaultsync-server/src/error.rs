//! Server error types mapped to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vaultsync_core::CryptoError;

/// Error kinds surfaced at the request boundary.
///
/// Leaf failures propagate here and the `IntoResponse` impl maps them to
/// the canonical status table. Commit is the only endpoint that collects
/// multiple per-item failures into a structured body instead of failing
/// the request.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input: bad base64, bad KDF params, missing field.
    BadRequest(String),

    /// Signing headers absent or not well-formed.
    AuthMissing,

    /// Timestamp outside the acceptance window, or a replay of a
    /// request already seen inside it.
    AuthStale,

    /// Device unknown, revoked, or owned by a different user.
    AuthDeviceInvalid,

    /// Ed25519 verification failed over the canonical message.
    AuthSignatureInvalid,

    /// No session, or the session is expired.
    Unauthenticated,

    /// Authenticated but not owner/recipient of the target.
    NotAuthorized(String),

    NotFound(String),

    /// Stale `base_version` on a direct item update.
    VersionMismatch { current_version: i64 },

    /// Illegal sharing state transition.
    ShareStateInvalid(String),

    /// Unexpected uniqueness violation.
    StorageConflict(String),

    /// `If-Match` did not match the current vault state.
    PreconditionFailed { current_etag: String },

    StorageUnavailable(String),

    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {}", msg),
            Self::AuthMissing => write!(f, "device authentication headers missing or malformed"),
            Self::AuthStale => write!(f, "request timestamp outside acceptance window"),
            Self::AuthDeviceInvalid => write!(f, "device unknown, revoked, or not owned by user"),
            Self::AuthSignatureInvalid => write!(f, "invalid device signature"),
            Self::Unauthenticated => write!(f, "not authenticated"),
            Self::NotAuthorized(msg) => write!(f, "not authorized: {}", msg),
            Self::NotFound(msg) => write!(f, "not found: {}", msg),
            Self::VersionMismatch { current_version } => {
                write!(f, "version mismatch, current version is {}", current_version)
            }
            Self::ShareStateInvalid(msg) => write!(f, "invalid share state: {}", msg),
            Self::StorageConflict(msg) => write!(f, "storage conflict: {}", msg),
            Self::PreconditionFailed { .. } => {
                write!(f, "vault state has changed, pull latest changes first")
            }
            Self::StorageUnavailable(msg) => write!(f, "storage unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthMissing
            | Self::AuthStale
            | Self::AuthDeviceInvalid
            | Self::AuthSignatureInvalid
            | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::VersionMismatch { .. } | Self::ShareStateInvalid(_) | Self::StorageConflict(_) => {
                StatusCode::CONFLICT
            }
            Self::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            Self::StorageUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            Self::PreconditionFailed { current_etag } => serde_json::json!({
                "error": self.to_string(),
                "current_etag": current_etag,
            }),
            Self::VersionMismatch { current_version } => serde_json::json!({
                "error": self.to_string(),
                "current_version": current_version,
            }),
            // Storage detail stays out of responses.
            Self::StorageUnavailable(msg) | Self::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                serde_json::json!({ "error": "internal server error" })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return Self::StorageConflict(e.to_string());
            }
        }
        Self::StorageUnavailable(e.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_of(ApiError::BadRequest("x".into())), 400);
        assert_eq!(status_of(ApiError::AuthMissing), 401);
        assert_eq!(status_of(ApiError::AuthStale), 401);
        assert_eq!(status_of(ApiError::AuthDeviceInvalid), 401);
        assert_eq!(status_of(ApiError::AuthSignatureInvalid), 401);
        assert_eq!(status_of(ApiError::NotAuthorized("x".into())), 403);
        assert_eq!(status_of(ApiError::NotFound("x".into())), 404);
        assert_eq!(status_of(ApiError::VersionMismatch { current_version: 6 }), 409);
        assert_eq!(status_of(ApiError::ShareStateInvalid("x".into())), 409);
        assert_eq!(
            status_of(ApiError::PreconditionFailed { current_etag: "e".into() }),
            412
        );
        assert_eq!(status_of(ApiError::Internal("x".into())), 500);
    }

    fn status_of(e: ApiError) -> u16 {
        e.into_response().status().as_u16()
    }
}
