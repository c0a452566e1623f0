mod authn;
pub(crate) mod clients;
pub(crate) mod grants;
pub(crate) mod health;
pub(crate) mod me;
pub(crate) mod oauth;

use crate::api::authn::authentication_middleware;
use crate::state::AppState;
use axum::{Router, middleware};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(oauth::router())
        .merge(protected_routes(state))
}

/// Routes that resolve the bearer credential before the handler runs
///
/// The oauth surface stays outside this layer: its endpoints authenticate
/// clients with form credentials, not bearer tokens.
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(me::router())
        .merge(clients::router())
        .merge(grants::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}
