//! Consent grant endpoints
//!
//! Where users record, inspect, and withdraw consent. Consent is always a
//! first-party act; a delegated token can never widen or create a grant.

pub mod handlers;
pub mod models;

use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, post},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/grants",
            post(handlers::record_consent).get(handlers::list_grants),
        )
        .route("/api/grants/{grant_id}", delete(handlers::revoke_grant))
}
