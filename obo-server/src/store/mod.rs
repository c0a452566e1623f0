//! Record store for clients, grants, and sessions.
//!
//! The store keeps durable state only. Domain rules (ownership, scope subset
//! checks, at-most-one-active-grant) live in the services; the store's own
//! contract is limited to durability, compare-and-swap updates, and the
//! active-grant uniqueness primitive that cannot be enforced above it without
//! a race.

use crate::config::{Settings, StoreBackend};
use crate::models::{Grant, Lifecycle, ServiceClient, TrustLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse record: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Store operation timed out after {0}s")]
    Timeout(u64),
    #[error("Conflicting concurrent update, retry the request")]
    Conflict,
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Stored form of a service client. The `revoked_at` column encodes the
/// soft-delete state; the domain `Lifecycle` is rebuilt at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub id: String,
    pub client_id: String,
    pub secret_verifier: String,
    pub name: String,
    pub description: Option<String>,
    pub homepage_url: String,
    pub icon_url: Option<String>,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub trust_level: TrustLevel,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Stored form of a consent grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrantRecord {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Stored form of a first-party session. Sessions expire via store TTL, so
/// there is no lifecycle column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub user_id: String,
    pub admin: bool,
}

impl From<&ServiceClient> for ClientRecord {
    fn from(client: &ServiceClient) -> Self {
        Self {
            id: client.id.clone(),
            client_id: client.client_id.clone(),
            secret_verifier: client.secret_verifier.clone(),
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
            version: client.version,
        }
    }
}

impl From<ClientRecord> for ServiceClient {
    fn from(record: ClientRecord) -> Self {
        Self {
            id: record.id,
            client_id: record.client_id,
            secret_verifier: record.secret_verifier,
            name: record.name,
            description: record.description,
            homepage_url: record.homepage_url,
            icon_url: record.icon_url,
            redirect_uris: record.redirect_uris,
            scopes: record.scopes,
            trust_level: record.trust_level,
            created_by: record.created_by,
            created_at: record.created_at,
            lifecycle: Lifecycle::from_revoked_at(record.revoked_at),
            version: record.version,
        }
    }
}

impl From<&Grant> for GrantRecord {
    fn from(grant: &Grant) -> Self {
        Self {
            id: grant.id.clone(),
            user_id: grant.user_id.clone(),
            client_id: grant.client_id.clone(),
            scopes: grant.scopes.clone(),
            created_at: grant.created_at,
            last_used_at: grant.last_used_at,
            revoked_at: grant.lifecycle.revoked_at(),
            version: grant.version,
        }
    }
}

impl From<GrantRecord> for Grant {
    fn from(record: GrantRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            client_id: record.client_id,
            scopes: record.scopes,
            created_at: record.created_at,
            last_used_at: record.last_used_at,
            lifecycle: Lifecycle::from_revoked_at(record.revoked_at),
            version: record.version,
        }
    }
}

/// Contract every store backend must fulfill.
///
/// Updates are compare-and-swap: the caller passes the version it read, the
/// store writes only if that version is still current and reports the outcome
/// through the returned bool. `insert_grant_if_absent` is the one compound
/// primitive, keeping "at most one active grant per (user, client)" atomic.
#[async_trait::async_trait]
pub trait AuthStore: Send + Sync {
    /// Insert a new client. Returns false if the client_id is already taken.
    async fn insert_client(&self, record: &ClientRecord) -> Result<bool, StoreError>;

    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError>;

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StoreError>;

    /// Write `record` only if the stored version equals `expected_version`.
    /// The record carries its own, already bumped, version.
    async fn update_client(
        &self,
        record: &ClientRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError>;

    async fn get_grant(&self, grant_id: &str) -> Result<Option<GrantRecord>, StoreError>;

    /// The single active grant for a (user, client) pair, if any.
    async fn find_active_grant(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<GrantRecord>, StoreError>;

    /// All grants recorded for a user, active and revoked.
    async fn list_grants(&self, user_id: &str) -> Result<Vec<GrantRecord>, StoreError>;

    /// Insert `record` only if no active grant exists for its (user, client)
    /// pair. Returns the id of the existing active grant when one is present.
    async fn insert_grant_if_absent(
        &self,
        record: &GrantRecord,
    ) -> Result<Option<String>, StoreError>;

    /// Compare-and-swap write, same contract as `update_client`. A write that
    /// sets `revoked_at` also releases the active-pair slot.
    async fn update_grant(
        &self,
        record: &GrantRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError>;

    /// Store a session under an opaque token, expiring after the configured
    /// session TTL.
    async fn put_session(&self, token: &str, record: &SessionRecord) -> Result<(), StoreError>;

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn delete_session(&self, token: &str) -> Result<(), StoreError>;

    /// Returns Ok(()) if healthy, or Err with a descriptive message.
    async fn health_check(&self) -> Result<(), String>;
}

/// Store implementation that provides a uniform interface regardless of
/// backend. The concrete backend is chosen at startup from configuration.
#[derive(Clone)]
pub enum Store {
    /// Process-local store, also the test backend
    InMemory(memory::InMemoryStore),
    /// Redis-backed store for multi-instance deployments
    Redis(redis::RedisStore),
}

// Manual impl because the Redis backend's connection manager is not Debug.
impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Store::InMemory(_) => f.write_str("Store::InMemory"),
            Store::Redis(_) => f.write_str("Store::Redis"),
        }
    }
}

#[async_trait::async_trait]
impl AuthStore for Store {
    async fn insert_client(&self, record: &ClientRecord) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.insert_client(record).await,
            Self::Redis(store) => store.insert_client(record).await,
        }
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_client(client_id).await,
            Self::Redis(store) => store.get_client(client_id).await,
        }
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.list_clients().await,
            Self::Redis(store) => store.list_clients().await,
        }
    }

    async fn update_client(
        &self,
        record: &ClientRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.update_client(record, expected_version).await,
            Self::Redis(store) => store.update_client(record, expected_version).await,
        }
    }

    async fn get_grant(&self, grant_id: &str) -> Result<Option<GrantRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_grant(grant_id).await,
            Self::Redis(store) => store.get_grant(grant_id).await,
        }
    }

    async fn find_active_grant(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<GrantRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.find_active_grant(user_id, client_id).await,
            Self::Redis(store) => store.find_active_grant(user_id, client_id).await,
        }
    }

    async fn list_grants(&self, user_id: &str) -> Result<Vec<GrantRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.list_grants(user_id).await,
            Self::Redis(store) => store.list_grants(user_id).await,
        }
    }

    async fn insert_grant_if_absent(
        &self,
        record: &GrantRecord,
    ) -> Result<Option<String>, StoreError> {
        match self {
            Self::InMemory(store) => store.insert_grant_if_absent(record).await,
            Self::Redis(store) => store.insert_grant_if_absent(record).await,
        }
    }

    async fn update_grant(
        &self,
        record: &GrantRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.update_grant(record, expected_version).await,
            Self::Redis(store) => store.update_grant(record, expected_version).await,
        }
    }

    async fn put_session(&self, token: &str, record: &SessionRecord) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.put_session(token, record).await,
            Self::Redis(store) => store.put_session(token, record).await,
        }
    }

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_session(token).await,
            Self::Redis(store) => store.get_session(token).await,
        }
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.delete_session(token).await,
            Self::Redis(store) => store.delete_session(token).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

/// Creates the store backend selected by configuration.
pub async fn create_store(settings: &Settings) -> Result<Store, StoreError> {
    match settings.store.backend {
        StoreBackend::InMemory => {
            let store = memory::InMemoryStore::new(
                settings.store.session_ttl_secs,
                settings.store.in_memory.capacity_mib,
            )
            .map_err(StoreError::Config)?;
            Ok(Store::InMemory(store))
        }
        StoreBackend::Redis => {
            if settings.store.redis.url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for the Redis store".to_string(),
                ));
            }
            let store = redis::RedisStore::new(
                &settings.store.redis.url,
                settings.store.session_ttl_secs,
                settings.store.timeout_secs,
            )
            .await
            .map_err(StoreError::Config)?;
            Ok(Store::Redis(store))
        }
    }
}
