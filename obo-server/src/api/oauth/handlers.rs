//! OAuth endpoint handlers

use crate::api::oauth::models::{
    AuthorizeContext, AuthorizeQuery, GRANT_TYPE_TOKEN_EXCHANGE, IntrospectionRequest,
    IntrospectionResponse, OAuthError, TOKEN_TYPE_ACCESS_TOKEN, TokenExchangeRequest,
    TokenExchangeResponse,
};
use crate::errors::AuthError;
use crate::models::TrustLevel;
use crate::openapi::OAUTH_TAG;
use crate::scopes::{self, ScopeDescriptor, ScopeGroup};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Form, FromRequest, Query, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Redirect, Response},
};
use log::{info, warn};
use url::Url;

/// Read-only scope catalog, grouped by resource family
#[utoipa::path(
    get,
    path = "/oauth/scopes",
    tag = OAUTH_TAG,
    responses(
        (status = 200, description = "Every grantable scope with its consent description", body = [ScopeGroup])
    )
)]
pub(crate) async fn list_scopes() -> Json<Vec<ScopeGroup>> {
    Json(scopes::grouped())
}

/// Validates an authorization request and returns the consent context
///
/// Failures involving an unrecognized client or an unregistered redirect URI
/// never redirect; everything later flows back to the registered
/// `redirect_uri` with `error`, `error_description` and `state` query
/// parameters (RFC 6749 Section 4.1.2.1).
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    tag = OAUTH_TAG,
    params(
        ("client_id" = String, Query, description = "Client identifier"),
        ("redirect_uri" = String, Query, description = "Must exactly match a registered redirect URI"),
        ("scope" = Option<String>, Query, description = "Space-delimited scopes; defaults to the client's registration"),
        ("state" = Option<String>, Query, description = "Opaque value echoed back on redirects")
    ),
    responses(
        (status = 200, description = "Consent context for the authorization UI", body = AuthorizeContext),
        (status = 303, description = "Redirect back to the client with an error"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = OAuthError)
    )
)]
pub(crate) async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    info!("Authorization request from client_id: {}", query.client_id);

    let client = match state.registry.get_client(&query.client_id).await {
        Ok(client) if client.lifecycle.is_active() => client,
        Ok(_) | Err(AuthError::NotFound(_)) => {
            warn!("Authorization request for unusable client {}", query.client_id);
            return error_response(
                StatusCode::BAD_REQUEST,
                OAuthError::invalid_request("client_id is unknown or revoked"),
            );
        }
        Err(err) => return oauth_error(err),
    };

    // An unregistered target gets no redirect at all
    if !client.redirect_uris.iter().any(|uri| uri == &query.redirect_uri) {
        warn!(
            "Authorization request for client {} with unregistered redirect_uri",
            query.client_id
        );
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("redirect_uri is not registered for this client"),
        );
    }

    let requested = match &query.scope {
        Some(scope) => scopes::normalize(&scopes::parse_scope_param(scope)),
        None => client.scopes.clone(),
    };
    if requested.is_empty() {
        return redirect_with_error(
            &query.redirect_uri,
            "invalid_scope",
            "no valid scopes requested",
            &query.state,
        );
    }
    let offending = scopes::missing_from(&requested, &client.scopes);
    if !offending.is_empty() {
        return redirect_with_error(
            &query.redirect_uri,
            "invalid_scope",
            &format!(
                "scopes outside the client registration: {}",
                offending.join(" ")
            ),
            &query.state,
        );
    }

    let descriptors = requested
        .iter()
        .map(|scope| ScopeDescriptor {
            scope: scope.clone(),
            description: scopes::describe(scope).unwrap_or_default().to_string(),
        })
        .collect();

    Json(AuthorizeContext {
        client_id: client.client_id,
        client_name: client.name,
        client_description: client.description,
        homepage_url: client.homepage_url,
        icon_url: client.icon_url,
        redirect_uri: query.redirect_uri,
        scopes: descriptors,
        trust_warning: client.trust_level == TrustLevel::Untrusted,
        state: query.state,
    })
    .into_response()
}

/// RFC 8693 token exchange endpoint
///
/// A registered client trades its own credentials plus a user's first-party
/// session token for a delegated token. The issued scopes are bounded by the
/// user's consent grant; without one the exchange fails.
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = OAUTH_TAG,
    request_body = TokenExchangeRequest,
    responses(
        (status = 200, description = "Delegated token issued", body = TokenExchangeResponse),
        (status = 400, description = "Malformed request, missing consent, or bad subject token", body = OAuthError),
        (status = 401, description = "Invalid client credentials", body = OAuthError),
        (status = 503, description = "Authorization store unavailable", body = OAuthError)
    )
)]
pub(crate) async fn token(
    State(state): State<AppState>,
    Form(request): Form<TokenExchangeRequest>,
) -> Response {
    info!(
        "Token exchange request from client_id: {} with grant_type: {}",
        request.client_id, request.grant_type
    );

    if request.grant_type != GRANT_TYPE_TOKEN_EXCHANGE {
        warn!(
            "Unsupported grant type '{}' from client '{}'",
            request.grant_type, request.client_id
        );
        return error_response(StatusCode::BAD_REQUEST, OAuthError::unsupported_grant_type());
    }
    if request.subject_token_type != TOKEN_TYPE_ACCESS_TOKEN {
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request(&format!(
                "Unsupported subject_token_type, expected {}",
                TOKEN_TYPE_ACCESS_TOKEN
            )),
        );
    }
    if request.client_id.is_empty() || request.client_secret.is_empty() {
        warn!("Missing client credentials in token exchange request");
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("client_id and client_secret are required"),
        );
    }
    if request.subject_token.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("subject_token is required"),
        );
    }

    let client = match state
        .registry
        .verify_credentials(&request.client_id, &request.client_secret)
        .await
    {
        Ok(client) => client,
        Err(err) => {
            warn!("Client authentication failed for {}", request.client_id);
            return oauth_error(err);
        }
    };

    // The subject must be a live first-party session; a delegated token can
    // never act as the subject of another exchange
    let session = match state.tokens.resolve_session(&request.subject_token).await {
        Ok(session) => session,
        Err(err) if err.is_transient() => return oauth_error(err),
        Err(_) => {
            warn!(
                "Invalid subject token in exchange for client {}",
                request.client_id
            );
            return error_response(
                StatusCode::BAD_REQUEST,
                OAuthError::invalid_grant("subject_token is not a valid session"),
            );
        }
    };

    // Absent scope asks for everything the user has granted
    let requested = match &request.scope {
        Some(scope) => scopes::parse_scope_param(scope),
        None => {
            match state
                .grants
                .find_active(&session.user_id, &client.client_id)
                .await
            {
                Ok(Some(grant)) => grant.scopes,
                Ok(None) => return oauth_error(AuthError::ConsentRequired),
                Err(err) => return oauth_error(err),
            }
        }
    };

    let minted = match state
        .tokens
        .mint(
            &session.user_id,
            &client.client_id,
            &requested,
            state.tokens.default_ttl_secs(),
        )
        .await
    {
        Ok(minted) => minted,
        Err(err) => return oauth_error(err),
    };

    info!(
        "Issued delegated token to client {} for user {} with {} scopes",
        client.client_id,
        session.user_id,
        minted.scopes.len()
    );
    Json(TokenExchangeResponse {
        access_token: minted.token,
        issued_token_type: TOKEN_TYPE_ACCESS_TOKEN.to_string(),
        token_type: "Bearer".to_string(),
        expires_in: minted.expires_in,
        scope: scopes::join_scopes(&minted.scopes),
    })
    .into_response()
}

/// RFC 7662 token introspection endpoint
///
/// Requires client credentials; any token that fails verification, for
/// whatever reason, is reported as merely inactive. Only a store outage is
/// surfaced, as 503.
#[utoipa::path(
    post,
    path = "/oauth/introspect",
    tag = OAUTH_TAG,
    request_body = IntrospectionRequest,
    responses(
        (status = 200, description = "Introspection result", body = IntrospectionResponse),
        (status = 400, description = "Missing token parameter", body = OAuthError),
        (status = 401, description = "Invalid client credentials", body = OAuthError),
        (status = 503, description = "Authorization store unavailable", body = OAuthError)
    )
)]
pub(crate) async fn introspect(
    State(state): State<AppState>,
    request: IntrospectionRequestExtractor,
) -> Response {
    if request.token.is_empty() {
        warn!("Empty token in introspection request");
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("token parameter is required"),
        );
    }

    if let Err(err) = state
        .registry
        .verify_credentials(&request.client_id, &request.client_secret)
        .await
    {
        warn!(
            "Client authentication failed for introspection by {}",
            request.client_id
        );
        return oauth_error(err);
    }

    match state.tokens.verify(&request.token).await {
        Ok(verified) => Json(IntrospectionResponse {
            active: true,
            sub: Some(verified.claims.sub),
            client_id: Some(verified.claims.act.client_id),
            // The live effective set, not the embedded claim
            scope: Some(scopes::join_scopes(&verified.context.scopes)),
            exp: Some(verified.claims.exp),
            iat: Some(verified.claims.iat),
            iss: Some(verified.claims.iss),
        })
        .into_response(),
        Err(err) if err.is_transient() => oauth_error(err),
        Err(_) => Json(IntrospectionResponse::inactive()).into_response(),
    }
}

/// Custom extractor that handles both form-encoded and JSON introspection
/// requests
pub struct IntrospectionRequestExtractor {
    pub token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl<S> FromRequest<S> for IntrospectionRequestExtractor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("");

        let request = if content_type.starts_with("application/json") {
            match Json::<IntrospectionRequest>::from_request(req, state).await {
                Ok(Json(request)) => request,
                Err(_) => {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        OAuthError::invalid_request("Invalid JSON in request body"),
                    ));
                }
            }
        } else {
            match Form::<IntrospectionRequest>::from_request(req, state).await {
                Ok(Form(request)) => request,
                Err(_) => {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        OAuthError::invalid_request("Invalid form data in request body"),
                    ));
                }
            }
        };
        Ok(IntrospectionRequestExtractor {
            token: request.token,
            client_id: request.client_id,
            client_secret: request.client_secret,
        })
    }
}

/// Helper function to create error responses
fn error_response(status: StatusCode, error: OAuthError) -> Response {
    (status, Json(error)).into_response()
}

fn oauth_error(err: AuthError) -> Response {
    if err.is_transient() {
        warn!("Store failure on the oauth surface: {}", err);
    }
    let (status, body) = OAuthError::from_auth_error(&err);
    (status, Json(body)).into_response()
}

/// Sends the error back to the registered redirect URI per RFC 6749
fn redirect_with_error(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: &Option<String>,
) -> Response {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("error", error)
                .append_pair("error_description", description);
            if let Some(state) = state {
                url.query_pairs_mut().append_pair("state", state);
            }
            Redirect::to(url.as_str()).into_response()
        }
        Err(_) => error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("Invalid redirect_uri"),
        ),
    }
}
