use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Validation and authorization failures surfaced by the core services.
///
/// Store failures stay distinct from denials: a transient backend problem maps
/// to 503 and must never be reported as 401/403.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The named entity is absent or already revoked.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// An anonymous request reached an operation that needs a user.
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    NoPermission(String),

    /// Requested scopes outside the catalog or outside the client's
    /// registration. Carries every offending entry, not just the first.
    #[error("{}", scope_detail(.scopes))]
    Scope { scopes: Vec<String> },

    /// A delegated request whose granted scopes do not cover the operation.
    #[error("insufficient scope, requires: {}", .scopes.join(", "))]
    InsufficientScope { scopes: Vec<String> },

    /// Redirect URIs whose host does not match the homepage host.
    #[error("redirect URIs do not match the homepage host: {}", .uris.join(", "))]
    RedirectUriMismatch { uris: Vec<String> },

    /// No active grant covers the requested (user, client, scopes) triple.
    #[error("user consent is required for the requested scopes")]
    ConsentRequired,

    #[error("requested ttl of {requested}s is outside the allowed range of 1..={max}s")]
    InvalidTtl { requested: u64, max: u64 },

    #[error("token has expired")]
    Expired,

    #[error("token subject client or grant has been revoked")]
    Revoked,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn scope_detail(scopes: &[String]) -> String {
    if scopes.is_empty() {
        "no valid scopes requested".to_string()
    } else {
        format!("unknown or unauthorized scopes: {}", scopes.join(", "))
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::NoPermission(_)
            | AuthError::InsufficientScope { .. }
            | AuthError::ConsentRequired => StatusCode::FORBIDDEN,
            AuthError::Scope { .. }
            | AuthError::RedirectUriMismatch { .. }
            | AuthError::InvalidTtl { .. } => StatusCode::BAD_REQUEST,
            AuthError::Unauthenticated
            | AuthError::Expired
            | AuthError::Revoked
            | AuthError::Malformed(_) => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            AuthError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// True for failures of the store itself, as opposed to denials.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Store(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AuthError::Scope { scopes } | AuthError::InsufficientScope { scopes } => json!({
                "detail": self.to_string(),
                "scopes": scopes,
            }),
            AuthError::RedirectUriMismatch { uris } => json!({
                "detail": self.to_string(),
                "redirect_uris": uris,
            }),
            _ => json!({ "detail": self.to_string() }),
        };
        let mut response = (status, Json(body)).into_response();
        // RFC 6750 asks for a challenge alongside credential rejections
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
