//! HTTP handlers.

pub mod devices;
pub mod items;
pub mod shares;
pub mod sync;
pub mod vault_keys;
pub mod vaults;

use crate::error::ApiError;
use axum::extract::{FromRequest, Request};
use axum::Json;
use chrono::{DateTime, SecondsFormat};
use serde::de::DeserializeOwned;

/// JSON extractor that reports extraction failures as 400s through the
/// standard error body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// Render a stored unix timestamp as RFC 3339.
pub fn rfc3339(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Render an optional stored timestamp.
pub fn rfc3339_opt(secs: Option<i64>) -> Option<String> {
    secs.map(rfc3339)
}
