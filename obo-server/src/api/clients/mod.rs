//! Client registry endpoints
//!
//! First-party management surface for service clients: registration with
//! one-time secret issuance, metadata updates, secret rotation, revocation,
//! and the admin-only trust level switch. Delegated tokens cannot reach any
//! of these.

pub mod handlers;
pub mod models;

use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/clients",
            post(handlers::register_client).get(handlers::list_clients),
        )
        .route(
            "/api/clients/{client_id}",
            get(handlers::get_client)
                .patch(handlers::update_client)
                .delete(handlers::revoke_client),
        )
        .route(
            "/api/clients/{client_id}/rotate-secret",
            post(handlers::rotate_secret),
        )
        .route(
            "/api/clients/{client_id}/trust-level",
            put(handlers::set_trust_level),
        )
}
