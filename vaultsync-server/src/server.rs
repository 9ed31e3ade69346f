//! Axum router setup.

use crate::auth;
use crate::config::ServerConfig;
use crate::handlers::{devices, items, shares, sync, vault_keys, vaults};
use crate::storage::Storage;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(storage: Storage, config: &ServerConfig) -> Router {
    // Everything behind a session; device signatures are enforced per
    // the signing policy inside the signature middleware.
    let api = Router::new()
        .route("/devices/register", post(devices::register_device))
        .route("/devices/verify", post(devices::verify_device))
        .route("/devices", get(devices::list_devices))
        .route("/devices/{id}", delete(devices::revoke_device))
        .route("/users/{id}/public-keys", get(devices::user_public_keys))
        .route("/vaults", post(vaults::create_vault).get(vaults::list_vaults))
        .route("/vaults/shared", get(shares::shared_vaults))
        .route("/vaults/{id}", get(vaults::get_vault))
        .route(
            "/vaults/{id}/keys",
            post(vault_keys::upload_key).get(vault_keys::current_key),
        )
        .route("/vaults/{id}/keys/versions", get(vault_keys::all_versions))
        .route("/vaults/{id}/keys/versions/{v}", get(vault_keys::key_version))
        .route(
            "/vaults/{id}/items",
            post(items::create_item).get(items::list_items),
        )
        .route(
            "/vaults/{id}/items/{iid}",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .route("/vaults/{id}/sync/pull", post(sync::pull))
        .route("/vaults/{id}/sync/commit", post(sync::commit))
        .route("/vaults/{id}/versions", get(sync::versions))
        .route("/vaults/{id}/share", post(shares::create_share))
        .route("/shares/pending", get(shares::pending_shares))
        .route("/shares/{id}/accept", post(shares::accept_share))
        .route("/shares/{id}/reject", post(shares::reject_share))
        .route("/shares/{id}", delete(shares::revoke_share))
        .layer(middleware::from_fn_with_state(
            storage.clone(),
            auth::verify_device_signature,
        ))
        .layer(middleware::from_fn_with_state(
            storage.clone(),
            auth::require_session,
        ));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(storage)
}

async fn health() -> &'static str {
    "ok"
}
