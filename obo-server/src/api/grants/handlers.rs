//! Consent grant endpoint handlers

use crate::api::grants::models::{ConsentRequest, GrantResponse};
use crate::errors::AuthError;
use crate::models::RequestAuthContext;
use crate::openapi::GRANTS_TAG;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// Records the caller's consent for a client, replacing any earlier approval
#[utoipa::path(
    post,
    path = "/api/grants",
    tag = GRANTS_TAG,
    request_body = ConsentRequest,
    responses(
        (status = 200, description = "Consent recorded; the scope set is exactly what was approved now", body = GrantResponse),
        (status = 400, description = "Empty scope set, or scopes outside the client registration"),
        (status = 403, description = "Requires first-party credentials"),
        (status = 404, description = "Unknown or revoked client")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn record_consent(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Json(request): Json<ConsentRequest>,
) -> Result<Json<GrantResponse>, AuthError> {
    let user = context.require_first_party()?;
    let client = state.registry.get_client(&request.client_id).await?;
    let grant = state
        .grants
        .upsert_grant(&user.id, &client, &request.scopes)
        .await?;
    Ok(Json(GrantResponse::from_grant(
        &grant,
        Some(client.name.clone()),
    )))
}

/// Lists the caller's active grants
#[utoipa::path(
    get,
    path = "/api/grants",
    tag = GRANTS_TAG,
    responses(
        (status = 200, description = "Active grants with resolved client names", body = [GrantResponse]),
        (status = 403, description = "Requires first-party credentials")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_grants(
    State(state): State<AppState>,
    context: RequestAuthContext,
) -> Result<Json<Vec<GrantResponse>>, AuthError> {
    let user = context.require_first_party()?;
    let grants = state.grants.list_active_grants(&user.id).await?;

    let mut responses = Vec::with_capacity(grants.len());
    for grant in &grants {
        let client_name = match state.registry.get_client(&grant.client_id).await {
            Ok(client) => Some(client.name),
            Err(AuthError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };
        responses.push(GrantResponse::from_grant(grant, client_name));
    }
    Ok(Json(responses))
}

/// Withdraws a grant; only the granting user may do this
#[utoipa::path(
    delete,
    path = "/api/grants/{grant_id}",
    tag = GRANTS_TAG,
    params(
        ("grant_id" = String, Path, description = "Grant identifier"),
    ),
    responses(
        (status = 204, description = "Grant revoked; tokens minted under it stop verifying immediately"),
        (status = 403, description = "Caller is not the granting user"),
        (status = 404, description = "Unknown or already revoked grant")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn revoke_grant(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Path(grant_id): Path<String>,
) -> Result<StatusCode, AuthError> {
    let user = context.require_first_party()?;
    state.grants.revoke_grant(&grant_id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
