//! Consent grant request/response models

use crate::models::Grant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Consent approval for a client
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentRequest {
    pub client_id: String,
    /// Scopes the user approves; replaces any earlier approval in full
    pub scopes: Vec<String>,
}

/// A user's consent to one client
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantResponse {
    pub id: String,
    pub client_id: String,
    /// Display name of the client, when it still resolves
    pub client_name: Option<String>,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Last time a token was minted or verified under this grant
    pub last_used_at: Option<DateTime<Utc>>,
}

impl GrantResponse {
    pub fn from_grant(grant: &Grant, client_name: Option<String>) -> Self {
        Self {
            id: grant.id.clone(),
            client_id: grant.client_id.clone(),
            client_name,
            scopes: grant.scopes.clone(),
            created_at: grant.created_at,
            last_used_at: grant.last_used_at,
        }
    }
}
