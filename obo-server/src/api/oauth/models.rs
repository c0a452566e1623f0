//! OAuth request/response models and RFC 6749 error bodies

use crate::errors::AuthError;
use crate::scopes::ScopeDescriptor;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// RFC 8693 token exchange grant type
pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
/// The only token type this server accepts and issues
pub const TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Authorization validation request (query parameters)
#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: String,
    pub redirect_uri: String,
    /// Space-delimited; absent means everything the client registered
    pub scope: Option<String>,
    /// Echoed back to the client on redirects
    pub state: Option<String>,
}

/// Consent context returned to the authorization UI
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeContext {
    pub client_id: String,
    pub client_name: String,
    pub client_description: Option<String>,
    pub homepage_url: String,
    pub icon_url: Option<String>,
    /// Validated against the registered set, echoed for the consent form
    pub redirect_uri: String,
    /// Requested scopes with their consent screen descriptions
    pub scopes: Vec<ScopeDescriptor>,
    /// True for untrusted clients; the consent screen must show a warning
    pub trust_warning: bool,
    pub state: Option<String>,
}

/// RFC 8693 token exchange request (form-encoded)
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenExchangeRequest {
    /// Must be `urn:ietf:params:oauth:grant-type:token-exchange`
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    /// First-party session credential of the user to act for
    pub subject_token: String,
    /// Must be `urn:ietf:params:oauth:token-type:access_token`
    pub subject_token_type: String,
    /// Space-delimited; absent asks for the full granted set
    pub scope: Option<String>,
}

/// RFC 8693 token exchange response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub issued_token_type: String,
    /// Always "Bearer"
    pub token_type: String,
    pub expires_in: u64,
    /// Scopes actually embedded in the token (space-delimited)
    pub scope: String,
}

/// RFC 7662 introspection request
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectionRequest {
    /// The delegated token to inspect
    pub token: String,
    pub client_id: String,
    pub client_secret: String,
}

/// RFC 7662 introspection response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    /// Whether the token currently passes verification
    pub active: bool,
    /// Subject user id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Acting client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Effective scopes after the live grant re-check (space-delimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectionResponse {
    /// The response for any token that does not verify. No detail leaks
    /// about why.
    pub fn inactive() -> Self {
        Self {
            active: false,
            sub: None,
            client_id: None,
            scope: None,
            exp: None,
            iat: None,
            iss: None,
        }
    }
}

/// RFC 6749 error body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthError {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    /// Create an invalid_request error
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_string(),
            error_description: Some(description.to_string()),
        }
    }

    /// Create an invalid_client error
    pub fn invalid_client(description: &str) -> Self {
        Self {
            error: "invalid_client".to_string(),
            error_description: Some(description.to_string()),
        }
    }

    /// Create an invalid_grant error
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_string(),
            error_description: Some(description.to_string()),
        }
    }

    /// Create an invalid_scope error
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_string(),
            error_description: Some(description.to_string()),
        }
    }

    /// Create an unsupported_grant_type error
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_string(),
            error_description: Some(format!(
                "Supported grant types: {}",
                GRANT_TYPE_TOKEN_EXCHANGE
            )),
        }
    }

    /// Create a server_error
    pub fn server_error(description: &str) -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: Some(description.to_string()),
        }
    }

    /// Create a temporarily_unavailable error
    pub fn temporarily_unavailable() -> Self {
        Self {
            error: "temporarily_unavailable".to_string(),
            error_description: Some("The authorization store is unavailable, retry".to_string()),
        }
    }

    /// Maps a core error to its RFC 6749 rendering. Store failures keep
    /// their 503 so a backend outage is never reported as a denial.
    pub fn from_auth_error(err: &AuthError) -> (StatusCode, Self) {
        match err {
            AuthError::NoPermission(detail) => {
                (StatusCode::UNAUTHORIZED, Self::invalid_client(detail))
            }
            AuthError::NotFound("client") => (
                StatusCode::UNAUTHORIZED,
                Self::invalid_client("Invalid client credentials"),
            ),
            AuthError::NotFound(_)
            | AuthError::Unauthenticated
            | AuthError::ConsentRequired
            | AuthError::Expired
            | AuthError::Revoked
            | AuthError::Malformed(_) => (
                StatusCode::BAD_REQUEST,
                Self::invalid_grant(&err.to_string()),
            ),
            AuthError::Scope { .. } | AuthError::InsufficientScope { .. } => (
                StatusCode::BAD_REQUEST,
                Self::invalid_scope(&err.to_string()),
            ),
            AuthError::RedirectUriMismatch { .. } | AuthError::InvalidTtl { .. } => (
                StatusCode::BAD_REQUEST,
                Self::invalid_request(&err.to_string()),
            ),
            AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Self::server_error("Internal server error"),
            ),
            AuthError::Store(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Self::temporarily_unavailable(),
            ),
        }
    }
}
