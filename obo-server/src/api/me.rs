use crate::errors::AuthError;
use crate::models::{ActorClient, RequestAuthContext};
use crate::openapi::ME_TAG;
use crate::state::AppState;
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The identity a request resolved to
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: String,
    pub admin: bool,
    /// Set when the request acts under a delegated token
    pub actor: Option<ActorClient>,
    /// Effective scopes; empty for first-party requests
    pub scopes: Vec<String>,
}

/// Echoes the resolved identity of the caller
#[utoipa::path(
    get,
    path = "/api/me",
    tag = ME_TAG,
    responses(
        (status = 200, description = "Resolved identity", body = MeResponse),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Delegated token lacks the user:read scope")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn me(context: RequestAuthContext) -> Result<Json<MeResponse>, AuthError> {
    context.require_scopes(&["user:read"])?;
    let user = context.user.as_ref().ok_or(AuthError::Unauthenticated)?;
    Ok(Json(MeResponse {
        user_id: user.id.clone(),
        admin: user.admin,
        actor: context.actor.clone(),
        scopes: context.scopes.clone(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/me", get(me))
}
