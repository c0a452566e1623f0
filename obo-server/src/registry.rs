//! Client registry
//!
//! Owns the lifecycle of service clients: identity, display metadata,
//! redirect URIs, declared scopes, trust level, and revocation. The plaintext
//! secret exists only at creation and rotation; everything else sees the
//! salted verifier.

use crate::errors::AuthError;
use crate::models::{Lifecycle, Principal, ServiceClient, TrustLevel};
use crate::scopes;
use crate::store::{AuthStore, ClientRecord, Store, StoreError};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use url::Url;
use uuid::Uuid;

/// Attempts before a contended compare-and-swap update is given up on.
const MAX_UPDATE_ATTEMPTS: usize = 3;

const VERIFIER_VERSION: &str = "v1";
const SALT_LEN: usize = 16;
const SECRET_LEN: usize = 32;
const CLIENT_ID_LEN: usize = 16;

/// Salted SHA-256 verifier for a client secret, stored as
/// `v1$<salt_b64>$<digest_b64>`. Deriving is one-way; the plaintext secret is
/// not recoverable from this value.
pub struct SecretVerifier(String);

impl SecretVerifier {
    pub fn derive(secret: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let digest = Self::digest(&salt, secret);
        Self(format!(
            "{}${}${}",
            VERIFIER_VERSION,
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(digest)
        ))
    }

    pub fn from_stored(stored: &str) -> Self {
        Self(stored.to_string())
    }

    /// Constant-time check of a candidate secret against the stored digest.
    /// A malformed stored value never matches.
    pub fn matches(&self, candidate: &str) -> bool {
        let mut parts = self.0.splitn(3, '$');
        let (version, salt_b64, digest_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(s), Some(d)) => (v, s, d),
            _ => return false,
        };
        if version != VERIFIER_VERSION {
            return false;
        }
        let salt = match URL_SAFE_NO_PAD.decode(salt_b64) {
            Ok(salt) => salt,
            Err(_) => return false,
        };
        let expected = match URL_SAFE_NO_PAD.decode(digest_b64) {
            Ok(digest) => digest,
            Err(_) => return false,
        };
        let computed = Self::digest(&salt, candidate);
        computed.as_slice().ct_eq(&expected).into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digest(salt: &[u8], secret: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(secret.as_bytes());
        hasher.finalize().into()
    }
}

fn generate_client_id() -> String {
    let mut bytes = [0u8; CLIENT_ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Registration input for a new client.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub description: Option<String>,
    pub homepage_url: String,
    pub icon_url: Option<String>,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
}

/// Partial update; None fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub homepage_url: Option<String>,
    pub icon_url: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub scopes: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<Store>,
}

impl ClientRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Registers a client and returns it with the plaintext secret. This is
    /// the only point where the secret is recoverable; only the verifier is
    /// stored.
    pub async fn create_client(
        &self,
        owner_id: &str,
        new: NewClient,
    ) -> Result<(ServiceClient, String), AuthError> {
        let declared_scopes = scopes::validate(&new.scopes)?;
        let redirect_uris = dedupe_uris(&new.redirect_uris);
        validate_redirect_uris(&new.homepage_url, &redirect_uris)?;

        let secret = generate_secret();
        let verifier = SecretVerifier::derive(&secret);

        // client_id collisions are vanishingly rare, retry on the off chance
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let client = ServiceClient {
                id: Uuid::new_v4().to_string(),
                client_id: generate_client_id(),
                secret_verifier: verifier.as_str().to_string(),
                name: new.name.clone(),
                description: new.description.clone(),
                homepage_url: new.homepage_url.clone(),
                icon_url: new.icon_url.clone(),
                redirect_uris: redirect_uris.clone(),
                scopes: declared_scopes.clone(),
                trust_level: TrustLevel::Untrusted,
                created_by: owner_id.to_string(),
                created_at: Utc::now(),
                lifecycle: Lifecycle::Active,
                version: 1,
            };
            if self
                .store
                .insert_client(&ClientRecord::from(&client))
                .await?
            {
                log::info!(
                    "registered client {} ({}) for user {}",
                    client.client_id,
                    client.name,
                    owner_id
                );
                return Ok((client, secret));
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// Applies a partial update. Only the owning user may mutate, and the
    /// scope/redirect invariants are re-validated against the merged state,
    /// so e.g. a homepage change is checked against the existing redirect
    /// URIs.
    pub async fn update_client(
        &self,
        client_id: &str,
        requester_id: &str,
        update: ClientUpdate,
    ) -> Result<ServiceClient, AuthError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.require_active(client_id).await?;
            self.require_owner(&current, requester_id)?;

            let mut updated = current.clone();
            if let Some(name) = &update.name {
                updated.name = name.clone();
            }
            if let Some(description) = &update.description {
                updated.description = Some(description.clone());
            }
            if let Some(homepage_url) = &update.homepage_url {
                updated.homepage_url = homepage_url.clone();
            }
            if let Some(icon_url) = &update.icon_url {
                updated.icon_url = Some(icon_url.clone());
            }
            if let Some(requested) = &update.scopes {
                updated.scopes = scopes::validate(requested)?;
            }
            if let Some(uris) = &update.redirect_uris {
                updated.redirect_uris = dedupe_uris(uris);
            }
            validate_redirect_uris(&updated.homepage_url, &updated.redirect_uris)?;

            updated.version = current.version + 1;
            if self
                .store
                .update_client(&ClientRecord::from(&updated), current.version)
                .await?
            {
                return Ok(updated);
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// Replaces the client secret and returns the new plaintext once. The
    /// verifier swap is a single compare-and-swap write, so the old secret
    /// stops verifying the moment the new one is issued.
    pub async fn rotate_secret(
        &self,
        client_id: &str,
        requester_id: &str,
    ) -> Result<String, AuthError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.require_active(client_id).await?;
            self.require_owner(&current, requester_id)?;

            let secret = generate_secret();
            let mut updated = current.clone();
            updated.secret_verifier = SecretVerifier::derive(&secret).as_str().to_string();
            updated.version = current.version + 1;
            if self
                .store
                .update_client(&ClientRecord::from(&updated), current.version)
                .await?
            {
                log::info!("rotated secret for client {}", client_id);
                return Ok(secret);
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// Soft-deletes a client. The record is kept for audit; the client can no
    /// longer authenticate, receive grants, or pass token verification.
    pub async fn revoke_client(
        &self,
        client_id: &str,
        requester_id: &str,
    ) -> Result<ServiceClient, AuthError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.require_active(client_id).await?;
            self.require_owner(&current, requester_id)?;

            let mut updated = current.clone();
            updated.lifecycle = Lifecycle::Revoked(Utc::now());
            updated.version = current.version + 1;
            if self
                .store
                .update_client(&ClientRecord::from(&updated), current.version)
                .await?
            {
                log::info!("revoked client {}", client_id);
                return Ok(updated);
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// Administrative trust level change. Permission is enforced at the API
    /// boundary; this is the only mutation not restricted to the owner.
    pub async fn set_trust_level(
        &self,
        client_id: &str,
        level: TrustLevel,
    ) -> Result<ServiceClient, AuthError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.require_active(client_id).await?;
            let mut updated = current.clone();
            updated.trust_level = level;
            updated.version = current.version + 1;
            if self
                .store
                .update_client(&ClientRecord::from(&updated), current.version)
                .await?
            {
                log::info!("set trust level of client {} to {:?}", client_id, level);
                return Ok(updated);
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// Fetches a client including revoked ones. Callers decide how to treat
    /// the lifecycle.
    pub async fn get_client(&self, client_id: &str) -> Result<ServiceClient, AuthError> {
        match self.store.get_client(client_id).await? {
            Some(record) => Ok(record.into()),
            None => Err(AuthError::NotFound("client")),
        }
    }

    /// Clients owned by a user, revoked ones included for audit.
    pub async fn get_owned_clients(&self, owner_id: &str) -> Result<Vec<ServiceClient>, AuthError> {
        let clients = self.store.list_clients().await?;
        Ok(clients
            .into_iter()
            .filter(|c| c.created_by == owner_id)
            .map(ServiceClient::from)
            .collect())
    }

    /// Every registered client. Permission is enforced at the API boundary.
    pub async fn get_all_clients(&self) -> Result<Vec<ServiceClient>, AuthError> {
        let clients = self.store.list_clients().await?;
        Ok(clients.into_iter().map(ServiceClient::from).collect())
    }

    /// Authenticates a client by id and secret. Every failure mode returns
    /// the same error so callers cannot probe which client ids exist.
    pub async fn verify_credentials(
        &self,
        client_id: &str,
        secret: &str,
    ) -> Result<ServiceClient, AuthError> {
        let client: ServiceClient = match self.store.get_client(client_id).await? {
            Some(record) => record.into(),
            None => return Err(invalid_credentials()),
        };
        if !client.lifecycle.is_active() {
            return Err(invalid_credentials());
        }
        if !SecretVerifier::from_stored(&client.secret_verifier).matches(secret) {
            return Err(invalid_credentials());
        }
        Ok(client)
    }

    /// Whether the requester may see this client's metadata.
    pub fn can_view(client: &ServiceClient, requester: &Principal) -> bool {
        requester.admin || client.created_by == requester.id
    }

    async fn require_active(&self, client_id: &str) -> Result<ServiceClient, AuthError> {
        let client = self.get_client(client_id).await?;
        if !client.lifecycle.is_active() {
            return Err(AuthError::NotFound("client"));
        }
        Ok(client)
    }

    fn require_owner(&self, client: &ServiceClient, requester_id: &str) -> Result<(), AuthError> {
        if client.created_by != requester_id {
            return Err(AuthError::NoPermission(
                "only the owning user may modify a client".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid_credentials() -> AuthError {
    AuthError::NoPermission("Invalid client credentials".to_string())
}

fn dedupe_uris(uris: &[String]) -> Vec<String> {
    let mut deduped: Vec<String> = Vec::with_capacity(uris.len());
    for uri in uris {
        let uri = uri.trim();
        if uri.is_empty() {
            continue;
        }
        if !deduped.iter().any(|u| u == uri) {
            deduped.push(uri.to_string());
        }
    }
    deduped
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Every redirect URI host must equal the homepage host. URIs that fail to
/// parse, or any URI when the homepage itself has no host, count as
/// offending. The error lists all offenders at once.
fn validate_redirect_uris(homepage_url: &str, redirect_uris: &[String]) -> Result<(), AuthError> {
    let homepage_host = host_of(homepage_url);
    let offending: Vec<String> = redirect_uris
        .iter()
        .filter(|uri| match (&homepage_host, host_of(uri)) {
            (Some(expected), Some(host)) => host != *expected,
            _ => true,
        })
        .cloned()
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(AuthError::RedirectUriMismatch { uris: offending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn registry() -> ClientRegistry {
        let store = InMemoryStore::new(60, 16).expect("Failed to create store");
        ClientRegistry::new(Arc::new(Store::InMemory(store)))
    }

    fn new_client() -> NewClient {
        NewClient {
            name: "Timelapse Buddy".to_string(),
            description: Some("Renders timelapses".to_string()),
            homepage_url: "https://buddy.example.com".to_string(),
            icon_url: None,
            redirect_uris: vec!["https://buddy.example.com/oauth/callback".to_string()],
            scopes: vec!["timelapse:read".to_string(), "timelapse:write".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_client_returns_secret_once() {
        let registry = registry();
        let (client, secret) = registry.create_client("user-1", new_client()).await.unwrap();

        assert_eq!(client.client_id.len(), 32); // 16 random bytes, hex
        assert_eq!(client.trust_level, TrustLevel::Untrusted);
        assert!(client.lifecycle.is_active());
        assert_eq!(client.version, 1);

        // Only the verifier is stored and it matches the issued secret
        assert!(client.secret_verifier.starts_with("v1$"));
        assert!(!client.secret_verifier.contains(&secret));
        assert!(SecretVerifier::from_stored(&client.secret_verifier).matches(&secret));
        assert!(!SecretVerifier::from_stored(&client.secret_verifier).matches("wrong"));
    }

    #[tokio::test]
    async fn test_create_client_rejects_unknown_scopes_without_partial_write() {
        let registry = registry();
        let mut new = new_client();
        new.scopes.push("martian:read".to_string());
        new.scopes.push("venusian:write".to_string());

        let err = registry.create_client("user-1", new).await.unwrap_err();
        match err {
            AuthError::Scope { scopes } => {
                assert_eq!(scopes, vec!["martian:read", "venusian:write"]);
            }
            other => panic!("expected scope error, got {:?}", other),
        }
        // Nothing was written
        assert!(registry.get_all_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_client_rejects_foreign_redirect_hosts() {
        let registry = registry();
        let mut new = new_client();
        new.redirect_uris = vec![
            "https://buddy.example.com/callback".to_string(),
            "https://evil.example.net/callback".to_string(),
            "not a url".to_string(),
        ];

        let err = registry.create_client("user-1", new).await.unwrap_err();
        match err {
            AuthError::RedirectUriMismatch { uris } => {
                assert_eq!(
                    uris,
                    vec!["https://evil.example.net/callback", "not a url"]
                );
            }
            other => panic!("expected redirect mismatch, got {:?}", other),
        }
        assert!(registry.get_all_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_client_enforces_ownership() {
        let registry = registry();
        let (client, _) = registry.create_client("user-1", new_client()).await.unwrap();

        let update = ClientUpdate {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let err = registry
            .update_client(&client.client_id, "user-2", update.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPermission(_)));

        let updated = registry
            .update_client(&client.client_id, "user-1", update)
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_update_revalidates_redirects_against_merged_homepage() {
        let registry = registry();
        let (client, _) = registry.create_client("user-1", new_client()).await.unwrap();

        // Changing only the homepage must be checked against the existing
        // redirect URIs
        let update = ClientUpdate {
            homepage_url: Some("https://elsewhere.example.org".to_string()),
            ..Default::default()
        };
        let err = registry
            .update_client(&client.client_id, "user-1", update)
            .await
            .unwrap_err();
        match err {
            AuthError::RedirectUriMismatch { uris } => {
                assert_eq!(uris, vec!["https://buddy.example.com/oauth/callback"]);
            }
            other => panic!("expected redirect mismatch, got {:?}", other),
        }

        // Moving homepage and redirects together is fine
        let update = ClientUpdate {
            homepage_url: Some("https://elsewhere.example.org".to_string()),
            redirect_uris: Some(vec!["https://elsewhere.example.org/cb".to_string()]),
            ..Default::default()
        };
        let updated = registry
            .update_client(&client.client_id, "user-1", update)
            .await
            .unwrap();
        assert_eq!(updated.homepage_url, "https://elsewhere.example.org");
    }

    #[tokio::test]
    async fn test_rotate_secret_invalidates_old_secret() {
        let registry = registry();
        let (client, old_secret) = registry.create_client("user-1", new_client()).await.unwrap();

        assert!(registry
            .verify_credentials(&client.client_id, &old_secret)
            .await
            .is_ok());

        let new_secret = registry
            .rotate_secret(&client.client_id, "user-1")
            .await
            .unwrap();
        assert_ne!(new_secret, old_secret);

        assert!(registry
            .verify_credentials(&client.client_id, &old_secret)
            .await
            .is_err());
        assert!(registry
            .verify_credentials(&client.client_id, &new_secret)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rotate_secret_requires_owner() {
        let registry = registry();
        let (client, _) = registry.create_client("user-1", new_client()).await.unwrap();
        let err = registry
            .rotate_secret(&client.client_id, "user-2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPermission(_)));
    }

    #[tokio::test]
    async fn test_revoke_client_is_soft_and_terminal() {
        let registry = registry();
        let (client, secret) = registry.create_client("user-1", new_client()).await.unwrap();

        let revoked = registry
            .revoke_client(&client.client_id, "user-1")
            .await
            .unwrap();
        assert!(!revoked.lifecycle.is_active());

        // Record is retained for audit
        let fetched = registry.get_client(&client.client_id).await.unwrap();
        assert!(!fetched.lifecycle.is_active());

        // But the client can no longer authenticate or be mutated
        assert!(registry
            .verify_credentials(&client.client_id, &secret)
            .await
            .is_err());
        let err = registry
            .revoke_client(&client.client_id, "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
        let err = registry
            .update_client(&client.client_id, "user-1", ClientUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_credentials_is_uniform_across_failures() {
        let registry = registry();
        let (client, _) = registry.create_client("user-1", new_client()).await.unwrap();

        let unknown = registry
            .verify_credentials("does-not-exist", "whatever")
            .await
            .unwrap_err();
        let wrong_secret = registry
            .verify_credentials(&client.client_id, "whatever")
            .await
            .unwrap_err();
        // Same message either way, nothing to enumerate
        assert_eq!(unknown.to_string(), wrong_secret.to_string());
    }

    #[tokio::test]
    async fn test_set_trust_level() {
        let registry = registry();
        let (client, _) = registry.create_client("user-1", new_client()).await.unwrap();
        let updated = registry
            .set_trust_level(&client.client_id, TrustLevel::Trusted)
            .await
            .unwrap();
        assert_eq!(updated.trust_level, TrustLevel::Trusted);
    }

    #[tokio::test]
    async fn test_owned_client_listing() {
        let registry = registry();
        registry.create_client("user-1", new_client()).await.unwrap();
        registry.create_client("user-1", new_client()).await.unwrap();
        registry.create_client("user-2", new_client()).await.unwrap();

        assert_eq!(registry.get_owned_clients("user-1").await.unwrap().len(), 2);
        assert_eq!(registry.get_owned_clients("user-2").await.unwrap().len(), 1);
        assert_eq!(registry.get_all_clients().await.unwrap().len(), 3);
    }

    #[test]
    fn test_secret_verifier_rejects_malformed_stored_values() {
        assert!(!SecretVerifier::from_stored("").matches("secret"));
        assert!(!SecretVerifier::from_stored("v1$onlyonepart").matches("secret"));
        assert!(!SecretVerifier::from_stored("v2$c2FsdA$ZGlnZXN0").matches("secret"));
        assert!(!SecretVerifier::from_stored("v1$!!$!!").matches("secret"));
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert!(a.len() >= 43); // 32 bytes, base64 url-safe no-pad
    }
}
