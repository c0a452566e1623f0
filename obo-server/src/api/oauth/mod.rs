//! OAuth-facing surface
//!
//! The protocol boundary of the subsystem: scope catalog listing for consent
//! UIs, authorization request validation, RFC 8693 token exchange, and
//! RFC 7662 introspection. Core errors are translated to RFC 6749 error
//! bodies here; everything inward speaks [`crate::errors::AuthError`].
//!
//! ## Flows
//! - Token exchange (RFC 8693): a registered client presents its credentials
//!   plus a user's session token and receives a delegated token bounded by
//!   the user's consent grant.
//! - Introspection (RFC 7662): a registered client asks whether a delegated
//!   token is currently good, which includes the live revocation re-check.

pub mod handlers;
pub mod models;

use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/scopes", get(handlers::list_scopes))
        .route("/oauth/authorize", get(handlers::authorize))
        .route("/oauth/token", post(handlers::token))
        .route("/oauth/introspect", post(handlers::introspect))
}
