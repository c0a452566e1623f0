//! Client registry request/response models

use crate::models::{ServiceClient, TrustLevel};
use crate::registry::{ClientUpdate, NewClient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Registration payload for a new service client
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterClientRequest {
    /// Display name shown on consent screens
    pub name: String,
    pub description: Option<String>,
    /// Homepage whose host anchors every redirect URI
    pub homepage_url: String,
    pub icon_url: Option<String>,
    /// Redirect URIs, matched exactly at authorization time
    pub redirect_uris: Vec<String>,
    /// Scopes the client may ever request
    pub scopes: Vec<String>,
}

impl From<RegisterClientRequest> for NewClient {
    fn from(request: RegisterClientRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            homepage_url: request.homepage_url,
            icon_url: request.icon_url,
            redirect_uris: request.redirect_uris,
            scopes: request.scopes,
        }
    }
}

/// Partial update; absent fields keep their current value
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub homepage_url: Option<String>,
    pub icon_url: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub scopes: Option<Vec<String>>,
}

impl From<UpdateClientRequest> for ClientUpdate {
    fn from(request: UpdateClientRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            homepage_url: request.homepage_url,
            icon_url: request.icon_url,
            redirect_uris: request.redirect_uris,
            scopes: request.scopes,
        }
    }
}

/// Public view of a client. The secret verifier never leaves the store.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientResponse {
    pub client_id: String,
    pub name: String,
    pub description: Option<String>,
    pub homepage_url: String,
    pub icon_url: Option<String>,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub trust_level: TrustLevel,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Set once the client has been revoked; the record stays for audit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<&ServiceClient> for ClientResponse {
    fn from(client: &ServiceClient) -> Self {
        Self {
            client_id: client.client_id.clone(),
            name: client.name.clone(),
            description: client.description.clone(),
            homepage_url: client.homepage_url.clone(),
            icon_url: client.icon_url.clone(),
            redirect_uris: client.redirect_uris.clone(),
            scopes: client.scopes.clone(),
            trust_level: client.trust_level,
            created_by: client.created_by.clone(),
            created_at: client.created_at,
            revoked_at: client.lifecycle.revoked_at(),
        }
    }
}

/// Registration response, the single point where the plaintext secret exists
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedClientResponse {
    #[serde(flatten)]
    pub client: ClientResponse,
    pub client_secret: String,
}

/// Rotation response; the previous secret has already stopped working
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RotatedSecretResponse {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrustLevelRequest {
    pub trust_level: TrustLevel,
}

/// Query parameters for listing clients
#[derive(Debug, Default, Deserialize)]
pub struct ListClientsQuery {
    /// List every client instead of only owned ones; administrators only
    #[serde(default)]
    pub all: bool,
}
