//! Domain types shared across the registry, grant, and token services.

use crate::errors::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How much scrutiny a client gets on consent screens. Untrusted clients get a
/// warning banner; trusted ones are first-party or vetted integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Untrusted,
    Trusted,
}

/// Soft-delete state shared by clients and grants. Revoked records stay in the
/// store for audit but are unusable for new grants and tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lifecycle {
    Active,
    Revoked(DateTime<Utc>),
}

impl Lifecycle {
    pub fn from_revoked_at(revoked_at: Option<DateTime<Utc>>) -> Self {
        match revoked_at {
            Some(at) => Lifecycle::Revoked(at),
            None => Lifecycle::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Revoked(at) => Some(*at),
        }
    }
}

/// A registered service client. The plaintext secret is never part of this
/// type; only the derived verifier is stored, so nothing past the single point
/// of issuance can read the secret back.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    /// Stable row identifier
    pub id: String,
    /// Public identifier presented by the client
    pub client_id: String,
    /// Salted hash of the current secret
    pub secret_verifier: String,
    pub name: String,
    pub description: Option<String>,
    pub homepage_url: String,
    pub icon_url: Option<String>,
    /// Registered redirect URIs; every host must equal the homepage host
    pub redirect_uris: Vec<String>,
    /// Scopes the client may ever request, a subset of the catalog
    pub scopes: Vec<String>,
    pub trust_level: TrustLevel,
    /// User id of the owning user
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    /// Bumped on every write, used for compare-and-swap updates
    pub version: u64,
}

/// A user's recorded consent for one client. At most one active grant exists
/// per (user, client) pair; re-consent replaces the scope set in place.
#[derive(Debug, Clone)]
pub struct Grant {
    pub id: String,
    pub user_id: String,
    /// Public identifier of the consented client
    pub client_id: String,
    /// Approved scopes, a subset of the client's registered scopes
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Updated opportunistically when a token minted from this grant is used
    pub last_used_at: Option<DateTime<Utc>>,
    pub lifecycle: Lifecycle,
    pub version: u64,
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: String,
    pub admin: bool,
}

/// The service client acting on a user's behalf in a delegated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActorClient {
    pub client_id: String,
    pub name: String,
}

/// Per-request authentication result, built fresh for every request and never
/// persisted. `actor` is non-null only for delegated requests.
#[derive(Debug, Clone)]
pub struct RequestAuthContext {
    pub user: Option<Principal>,
    pub actor: Option<ActorClient>,
    pub scopes: Vec<String>,
}

impl RequestAuthContext {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            actor: None,
            scopes: Vec::new(),
        }
    }

    /// A first-party user session. No actor, full access.
    pub fn first_party(user: Principal) -> Self {
        Self {
            user: Some(user),
            actor: None,
            scopes: Vec::new(),
        }
    }

    /// A service client acting for a user within the given scopes.
    pub fn delegated(user: Principal, actor: ActorClient, scopes: Vec<String>) -> Self {
        Self {
            user: Some(user),
            actor: Some(actor),
            scopes,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_delegated(&self) -> bool {
        self.actor.is_some()
    }

    /// Scope rule for a protected operation requiring `required`: allowed when
    /// nothing is required, when there is no actor (first-party requests are
    /// not scope-limited), or when every required scope was granted.
    /// Authentication itself is checked separately.
    pub fn has_scopes(&self, required: &[&str]) -> bool {
        required.is_empty()
            || self.actor.is_none()
            || required.iter().all(|s| self.scopes.iter().any(|g| g == s))
    }

    pub fn require_scopes(&self, required: &[&str]) -> Result<(), AuthError> {
        if self.has_scopes(required) {
            Ok(())
        } else {
            let missing: Vec<String> = required
                .iter()
                .filter(|s| !self.scopes.iter().any(|g| g == **s))
                .map(|s| s.to_string())
                .collect();
            Err(AuthError::InsufficientScope { scopes: missing })
        }
    }

    /// The user behind a first-party request. Delegated contexts are
    /// forbidden, anonymous ones unauthenticated.
    pub fn require_first_party(&self) -> Result<&Principal, AuthError> {
        if self.actor.is_some() {
            return Err(AuthError::NoPermission(
                "this operation requires first-party credentials".to_string(),
            ));
        }
        self.user.as_ref().ok_or(AuthError::Unauthenticated)
    }
}
