use super::{AuthStore, ClientRecord, GrantRecord, SessionRecord, StoreError};
use moka::future::Cache as MokaCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Process-local store backend.
///
/// Clients and grants live in plain maps behind one RwLock, so every compound
/// operation is atomic under the write guard. Sessions live in a Moka cache,
/// which provides the TTL expiry the session contract requires.
#[derive(Clone)]
pub struct InMemoryStore {
    records: Arc<RwLock<Tables>>,
    sessions: MokaCache<String, String>,
}

#[derive(Default)]
struct Tables {
    /// Keyed by public client_id
    clients: HashMap<String, ClientRecord>,
    /// Keyed by grant id
    grants: HashMap<String, GrantRecord>,
    /// (user_id, client_id) -> id of the single active grant for the pair
    active_pairs: HashMap<(String, String), String>,
}

impl InMemoryStore {
    /// Creates a new in-memory store.
    ///
    /// `session_ttl_secs` bounds the lifetime of stored sessions and
    /// `capacity_mib` bounds the session cache size in MiB.
    pub fn new(session_ttl_secs: u64, capacity_mib: usize) -> Result<Self, String> {
        if session_ttl_secs == 0 {
            return Err("Session TTL must be greater than 0".to_string());
        }
        if capacity_mib == 0 {
            return Err("Session capacity must be greater than 0".to_string());
        }

        let max_capacity = (capacity_mib * 1024 * 1024) as u64;
        let sessions = MokaCache::builder()
            .time_to_live(Duration::from_secs(session_ttl_secs))
            .weigher(|key: &String, value: &String| -> u32 {
                (key.len() + value.len()).try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(max_capacity)
            .build();

        Ok(Self {
            records: Arc::new(RwLock::new(Tables::default())),
            sessions,
        })
    }
}

#[async_trait::async_trait]
impl AuthStore for InMemoryStore {
    async fn insert_client(&self, record: &ClientRecord) -> Result<bool, StoreError> {
        let mut tables = self.records.write().await;
        if tables.clients.contains_key(&record.client_id) {
            return Ok(false);
        }
        tables
            .clients
            .insert(record.client_id.clone(), record.clone());
        Ok(true)
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError> {
        let tables = self.records.read().await;
        Ok(tables.clients.get(client_id).cloned())
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        let tables = self.records.read().await;
        let mut clients: Vec<ClientRecord> = tables.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(clients)
    }

    async fn update_client(
        &self,
        record: &ClientRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.records.write().await;
        match tables.clients.get_mut(&record.client_id) {
            Some(current) if current.version == expected_version => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_grant(&self, grant_id: &str) -> Result<Option<GrantRecord>, StoreError> {
        let tables = self.records.read().await;
        Ok(tables.grants.get(grant_id).cloned())
    }

    async fn find_active_grant(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<GrantRecord>, StoreError> {
        let tables = self.records.read().await;
        let pair = (user_id.to_string(), client_id.to_string());
        Ok(tables
            .active_pairs
            .get(&pair)
            .and_then(|id| tables.grants.get(id))
            .cloned())
    }

    async fn list_grants(&self, user_id: &str) -> Result<Vec<GrantRecord>, StoreError> {
        let tables = self.records.read().await;
        let mut grants: Vec<GrantRecord> = tables
            .grants
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(grants)
    }

    async fn insert_grant_if_absent(
        &self,
        record: &GrantRecord,
    ) -> Result<Option<String>, StoreError> {
        let mut tables = self.records.write().await;
        let pair = (record.user_id.clone(), record.client_id.clone());
        if let Some(existing) = tables.active_pairs.get(&pair) {
            return Ok(Some(existing.clone()));
        }
        tables.grants.insert(record.id.clone(), record.clone());
        tables.active_pairs.insert(pair, record.id.clone());
        Ok(None)
    }

    async fn update_grant(
        &self,
        record: &GrantRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.records.write().await;
        match tables.grants.get(&record.id) {
            Some(current) if current.version == expected_version => {}
            _ => return Ok(false),
        }
        tables.grants.insert(record.id.clone(), record.clone());
        let pair = (record.user_id.clone(), record.client_id.clone());
        if record.revoked_at.is_some() {
            if tables.active_pairs.get(&pair) == Some(&record.id) {
                tables.active_pairs.remove(&pair);
            }
        } else {
            tables.active_pairs.insert(pair, record.id.clone());
        }
        Ok(true)
    }

    async fn put_session(&self, token: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.sessions.insert(token.to_string(), serialized).await;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        match self.sessions.get(token).await {
            Some(serialized) => serde_json::from_str(&serialized)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        self.sessions.invalidate(token).await;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrustLevel;
    use chrono::Utc;

    fn store() -> InMemoryStore {
        InMemoryStore::new(60, 16).expect("Failed to create store")
    }

    fn client_record(client_id: &str) -> ClientRecord {
        ClientRecord {
            id: format!("row-{client_id}"),
            client_id: client_id.to_string(),
            secret_verifier: "v1$c2FsdA$ZGlnZXN0".to_string(),
            name: "Test Client".to_string(),
            description: None,
            homepage_url: "https://app.example.com".to_string(),
            icon_url: None,
            redirect_uris: vec![],
            scopes: vec!["timelapse:read".to_string()],
            trust_level: TrustLevel::Untrusted,
            created_by: "user-1".to_string(),
            created_at: Utc::now(),
            revoked_at: None,
            version: 1,
        }
    }

    fn grant_record(id: &str, user_id: &str, client_id: &str) -> GrantRecord {
        GrantRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            scopes: vec!["timelapse:read".to_string()],
            created_at: Utc::now(),
            last_used_at: None,
            revoked_at: None,
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_client() {
        let store = store();
        let record = client_record("abc");
        assert!(store.insert_client(&record).await.unwrap());
        let fetched = store.get_client("abc").await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(store.get_client("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_client_rejects_duplicate_id() {
        let store = store();
        let record = client_record("abc");
        assert!(store.insert_client(&record).await.unwrap());
        assert!(!store.insert_client(&record).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_client_is_compare_and_swap() {
        let store = store();
        let record = client_record("abc");
        store.insert_client(&record).await.unwrap();

        let mut updated = record.clone();
        updated.name = "Renamed".to_string();
        updated.version = 2;
        assert!(store.update_client(&updated, 1).await.unwrap());

        // A writer still holding version 1 must lose
        let mut stale = record.clone();
        stale.name = "Stale".to_string();
        stale.version = 2;
        assert!(!store.update_client(&stale, 1).await.unwrap());

        let fetched = store.get_client("abc").await.unwrap().unwrap();
        assert_eq!(fetched.name, "Renamed");
        assert_eq!(fetched.version, 2);
    }

    #[tokio::test]
    async fn test_at_most_one_active_grant_per_pair() {
        let store = store();
        let first = grant_record("grant-1", "user-1", "abc");
        assert!(store.insert_grant_if_absent(&first).await.unwrap().is_none());

        let second = grant_record("grant-2", "user-1", "abc");
        let existing = store.insert_grant_if_absent(&second).await.unwrap();
        assert_eq!(existing, Some("grant-1".to_string()));

        // A different pair is unaffected
        let other = grant_record("grant-3", "user-2", "abc");
        assert!(store.insert_grant_if_absent(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoking_grant_releases_the_pair_slot() {
        let store = store();
        let grant = grant_record("grant-1", "user-1", "abc");
        store.insert_grant_if_absent(&grant).await.unwrap();
        assert!(store
            .find_active_grant("user-1", "abc")
            .await
            .unwrap()
            .is_some());

        let mut revoked = grant.clone();
        revoked.revoked_at = Some(Utc::now());
        revoked.version = 2;
        assert!(store.update_grant(&revoked, 1).await.unwrap());
        assert!(store
            .find_active_grant("user-1", "abc")
            .await
            .unwrap()
            .is_none());

        // The pair is free for a fresh consent
        let fresh = grant_record("grant-2", "user-1", "abc");
        assert!(store.insert_grant_if_absent(&fresh).await.unwrap().is_none());

        // Revoked grant is still readable for audit
        let grants = store.list_grants("user-1").await.unwrap();
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().any(|g| g.revoked_at.is_some()));
    }

    #[tokio::test]
    async fn test_update_grant_is_compare_and_swap() {
        let store = store();
        let grant = grant_record("grant-1", "user-1", "abc");
        store.insert_grant_if_absent(&grant).await.unwrap();

        let mut updated = grant.clone();
        updated.scopes = vec!["user:read".to_string()];
        updated.version = 2;
        assert!(store.update_grant(&updated, 1).await.unwrap());
        assert!(!store.update_grant(&updated, 1).await.unwrap());

        let fetched = store.get_grant("grant-1").await.unwrap().unwrap();
        assert_eq!(fetched.scopes, vec!["user:read"]);
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_delete() {
        let store = store();
        let record = SessionRecord {
            user_id: "user-1".to_string(),
            admin: false,
        };
        store.put_session("tok", &record).await.unwrap();
        assert_eq!(store.get_session("tok").await.unwrap(), Some(record));

        store.delete_session("tok").await.unwrap();
        assert!(store.get_session("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_expires_after_ttl() {
        let store = InMemoryStore::new(1, 16).expect("Failed to create store");
        let record = SessionRecord {
            user_id: "user-1".to_string(),
            admin: false,
        };
        store.put_session("tok", &record).await.unwrap();
        assert!(store.get_session("tok").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.get_session("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_zero_configuration() {
        assert!(InMemoryStore::new(0, 16).is_err());
        assert!(InMemoryStore::new(60, 0).is_err());
    }
}
