//! Client registry endpoint handlers

use crate::api::clients::models::{
    ClientResponse, CreatedClientResponse, ListClientsQuery, RegisterClientRequest,
    RotatedSecretResponse, TrustLevelRequest, UpdateClientRequest,
};
use crate::errors::AuthError;
use crate::models::RequestAuthContext;
use crate::openapi::CLIENTS_TAG;
use crate::registry::ClientRegistry;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

/// Registers a new client for the calling user
#[utoipa::path(
    post,
    path = "/api/clients",
    tag = CLIENTS_TAG,
    request_body = RegisterClientRequest,
    responses(
        (status = 201, description = "Client registered; the secret appears here and never again", body = CreatedClientResponse),
        (status = 400, description = "Unknown scopes or redirect URIs off the homepage host"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Requires first-party credentials")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn register_client(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Json(request): Json<RegisterClientRequest>,
) -> Result<(StatusCode, Json<CreatedClientResponse>), AuthError> {
    let user = context.require_first_party()?;
    let (client, secret) = state.registry.create_client(&user.id, request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedClientResponse {
            client: ClientResponse::from(&client),
            client_secret: secret,
        }),
    ))
}

/// Lists the caller's clients, or every client for administrators
#[utoipa::path(
    get,
    path = "/api/clients",
    tag = CLIENTS_TAG,
    params(
        ("all" = Option<bool>, Query, description = "List every registered client; administrators only"),
    ),
    responses(
        (status = 200, description = "Clients visible to the caller", body = [ClientResponse]),
        (status = 403, description = "Non-administrator asked for all clients")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_clients(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<Vec<ClientResponse>>, AuthError> {
    let user = context.require_first_party()?;
    let clients = if query.all {
        if !user.admin {
            return Err(AuthError::NoPermission(
                "only administrators may list all clients".to_string(),
            ));
        }
        state.registry.get_all_clients().await?
    } else {
        state.registry.get_owned_clients(&user.id).await?
    };
    Ok(Json(clients.iter().map(ClientResponse::from).collect()))
}

/// Fetches one client; owners and administrators only
#[utoipa::path(
    get,
    path = "/api/clients/{client_id}",
    tag = CLIENTS_TAG,
    params(
        ("client_id" = String, Path, description = "Client identifier"),
    ),
    responses(
        (status = 200, description = "Client metadata", body = ClientResponse),
        (status = 404, description = "Unknown client, or not visible to the caller")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_client(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Path(client_id): Path<String>,
) -> Result<Json<ClientResponse>, AuthError> {
    let user = context.require_first_party()?;
    let client = state.registry.get_client(&client_id).await?;
    // Hidden rather than forbidden for everyone else
    if !ClientRegistry::can_view(&client, user) {
        return Err(AuthError::NotFound("client"));
    }
    Ok(Json(ClientResponse::from(&client)))
}

/// Applies a partial update to an owned client
#[utoipa::path(
    patch,
    path = "/api/clients/{client_id}",
    tag = CLIENTS_TAG,
    params(
        ("client_id" = String, Path, description = "Client identifier"),
    ),
    request_body = UpdateClientRequest,
    responses(
        (status = 200, description = "Updated client", body = ClientResponse),
        (status = 400, description = "Merged state violates a registration invariant"),
        (status = 403, description = "Caller does not own the client"),
        (status = 404, description = "Unknown or revoked client")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_client(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Path(client_id): Path<String>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<Json<ClientResponse>, AuthError> {
    let user = context.require_first_party()?;
    let client = state
        .registry
        .update_client(&client_id, &user.id, request.into())
        .await?;
    Ok(Json(ClientResponse::from(&client)))
}

/// Rotates the client secret and returns the replacement exactly once
#[utoipa::path(
    post,
    path = "/api/clients/{client_id}/rotate-secret",
    tag = CLIENTS_TAG,
    params(
        ("client_id" = String, Path, description = "Client identifier"),
    ),
    responses(
        (status = 200, description = "New secret; the old one no longer verifies", body = RotatedSecretResponse),
        (status = 403, description = "Caller does not own the client"),
        (status = 404, description = "Unknown or revoked client")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn rotate_secret(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Path(client_id): Path<String>,
) -> Result<Json<RotatedSecretResponse>, AuthError> {
    let user = context.require_first_party()?;
    let secret = state.registry.rotate_secret(&client_id, &user.id).await?;
    Ok(Json(RotatedSecretResponse {
        client_id,
        client_secret: secret,
    }))
}

/// Revokes an owned client
#[utoipa::path(
    delete,
    path = "/api/clients/{client_id}",
    tag = CLIENTS_TAG,
    params(
        ("client_id" = String, Path, description = "Client identifier"),
    ),
    responses(
        (status = 204, description = "Client revoked; tokens and credentials stop working immediately"),
        (status = 403, description = "Caller does not own the client"),
        (status = 404, description = "Unknown or already revoked client")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn revoke_client(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Path(client_id): Path<String>,
) -> Result<StatusCode, AuthError> {
    let user = context.require_first_party()?;
    state.registry.revoke_client(&client_id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Sets the trust level of a client; administrators only
#[utoipa::path(
    put,
    path = "/api/clients/{client_id}/trust-level",
    tag = CLIENTS_TAG,
    params(
        ("client_id" = String, Path, description = "Client identifier"),
    ),
    request_body = TrustLevelRequest,
    responses(
        (status = 200, description = "Updated client", body = ClientResponse),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "Unknown or revoked client")
    ),
    security(("bearer" = []))
)]
pub(crate) async fn set_trust_level(
    State(state): State<AppState>,
    context: RequestAuthContext,
    Path(client_id): Path<String>,
    Json(request): Json<TrustLevelRequest>,
) -> Result<Json<ClientResponse>, AuthError> {
    let user = context.require_first_party()?;
    if !user.admin {
        return Err(AuthError::NoPermission(
            "only administrators may change trust levels".to_string(),
        ));
    }
    let client = state
        .registry
        .set_trust_level(&client_id, request.trust_level)
        .await?;
    Ok(Json(ClientResponse::from(&client)))
}
