use super::{AuthStore, ClientRecord, GrantRecord, SessionRecord, StoreError};
use async_trait::async_trait;
use log::error;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use std::future::Future;
use std::time::Duration;

/// Inserts a client only if its client_id is unused.
/// KEYS: client key, client id set. ARGV: record json, client_id.
const INSERT_CLIENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SADD', KEYS[2], ARGV[2])
return 1
"#;

/// Compare-and-swap write keyed on the stored record version.
/// KEYS: record key. ARGV: expected version, record json.
const UPDATE_IF_VERSION: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then return 0 end
if tonumber(cjson.decode(cur)['version']) ~= tonumber(ARGV[1]) then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// Claims the (user, client) active slot and inserts the grant, or returns the
/// id of the active grant already holding the slot.
/// KEYS: pair key, grant key, user grant set. ARGV: grant id, record json.
const INSERT_GRANT_IF_ABSENT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then return existing end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[1])
return ''
"#;

/// Compare-and-swap a grant and keep the active-pair slot in sync: a write
/// that revokes the grant releases the slot.
/// KEYS: grant key, pair key. ARGV: expected version, record json, revoked
/// flag, grant id.
const UPDATE_GRANT_IF_VERSION: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then return 0 end
if tonumber(cjson.decode(cur)['version']) ~= tonumber(ARGV[1]) then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
if ARGV[3] == '1' then
  if redis.call('GET', KEYS[2]) == ARGV[4] then redis.call('DEL', KEYS[2]) end
else
  redis.call('SET', KEYS[2], ARGV[4])
end
return 1
"#;

fn client_key(client_id: &str) -> String {
    format!("client:{client_id}")
}

fn grant_key(grant_id: &str) -> String {
    format!("grant:{grant_id}")
}

fn grant_pair_key(user_id: &str, client_id: &str) -> String {
    format!("grantpair:{user_id}:{client_id}")
}

fn user_grants_key(user_id: &str) -> String {
    format!("grants:{user_id}")
}

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

const CLIENTS_KEY: &str = "clients";

// TODO derive Debug - https://stackoverflow.com/questions/78870773/skip-struct-field-when-deriving-debug
#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    conn_manager: ConnectionManager,
    session_ttl_secs: u64,
    timeout_secs: u64,
}

impl RedisStore {
    /// Initialize a new Redis store instance
    pub async fn new(
        redis_url: &str,
        session_ttl_secs: u64,
        timeout_secs: u64,
    ) -> Result<Self, String> {
        let client = match Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        // Test the connection to ensure it's working
        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            _client: client,
            conn_manager,
            session_ttl_secs,
            timeout_secs,
        })
    }

    /// Bounds a single store operation so a stalled Redis surfaces as a
    /// transient error instead of a hung request.
    async fn timed<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout_secs)),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => {
                error!("Redis error while getting key {}: {}", key, err);
                return Err(StoreError::Redis(err.to_string()));
            }
        };
        match value {
            Some(serialized) => serde_json::from_str(&serialized)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AuthStore for RedisStore {
    async fn insert_client(&self, record: &ClientRecord) -> Result<bool, StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            let inserted: i64 = Script::new(INSERT_CLIENT)
                .key(client_key(&record.client_id))
                .key(CLIENTS_KEY)
                .arg(serialized)
                .arg(&record.client_id)
                .invoke_async(&mut conn)
                .await
                .map_err(|err| {
                    error!("Redis error while inserting client: {}", err);
                    StoreError::Redis(err.to_string())
                })?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError> {
        self.timed(self.get_json(&client_key(client_id))).await
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            let ids: Vec<String> = conn
                .smembers(CLIENTS_KEY)
                .await
                .map_err(|err| StoreError::Redis(err.to_string()))?;
            let mut clients = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(record) = self.get_json::<ClientRecord>(&client_key(&id)).await? {
                    clients.push(record);
                }
            }
            clients.sort_by(|a: &ClientRecord, b: &ClientRecord| {
                a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
            });
            Ok(clients)
        })
        .await
    }

    async fn update_client(
        &self,
        record: &ClientRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            let written: i64 = Script::new(UPDATE_IF_VERSION)
                .key(client_key(&record.client_id))
                .arg(expected_version)
                .arg(serialized)
                .invoke_async(&mut conn)
                .await
                .map_err(|err| {
                    error!("Redis error while updating client: {}", err);
                    StoreError::Redis(err.to_string())
                })?;
            Ok(written == 1)
        })
        .await
    }

    async fn get_grant(&self, grant_id: &str) -> Result<Option<GrantRecord>, StoreError> {
        self.timed(self.get_json(&grant_key(grant_id))).await
    }

    async fn find_active_grant(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<GrantRecord>, StoreError> {
        self.timed(async {
            // The pair key holds a raw grant id, not JSON
            let mut conn = self.conn_manager.clone();
            let grant_id: Option<String> = conn
                .get(grant_pair_key(user_id, client_id))
                .await
                .map_err(|err| StoreError::Redis(err.to_string()))?;
            match grant_id {
                Some(id) => self.get_json(&grant_key(&id)).await,
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_grants(&self, user_id: &str) -> Result<Vec<GrantRecord>, StoreError> {
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            let ids: Vec<String> = conn
                .smembers(user_grants_key(user_id))
                .await
                .map_err(|err| StoreError::Redis(err.to_string()))?;
            let mut grants = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(record) = self.get_json::<GrantRecord>(&grant_key(&id)).await? {
                    grants.push(record);
                }
            }
            grants.sort_by(|a: &GrantRecord, b: &GrantRecord| {
                a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
            });
            Ok(grants)
        })
        .await
    }

    async fn insert_grant_if_absent(
        &self,
        record: &GrantRecord,
    ) -> Result<Option<String>, StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            let existing: String = Script::new(INSERT_GRANT_IF_ABSENT)
                .key(grant_pair_key(&record.user_id, &record.client_id))
                .key(grant_key(&record.id))
                .key(user_grants_key(&record.user_id))
                .arg(&record.id)
                .arg(serialized)
                .invoke_async(&mut conn)
                .await
                .map_err(|err| {
                    error!("Redis error while inserting grant: {}", err);
                    StoreError::Redis(err.to_string())
                })?;
            if existing.is_empty() {
                Ok(None)
            } else {
                Ok(Some(existing))
            }
        })
        .await
    }

    async fn update_grant(
        &self,
        record: &GrantRecord,
        expected_version: u64,
    ) -> Result<bool, StoreError> {
        let serialized = serde_json::to_string(record)?;
        let revoked_flag = if record.revoked_at.is_some() { "1" } else { "0" };
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            let written: i64 = Script::new(UPDATE_GRANT_IF_VERSION)
                .key(grant_key(&record.id))
                .key(grant_pair_key(&record.user_id, &record.client_id))
                .arg(expected_version)
                .arg(serialized)
                .arg(revoked_flag)
                .arg(&record.id)
                .invoke_async(&mut conn)
                .await
                .map_err(|err| {
                    error!("Redis error while updating grant: {}", err);
                    StoreError::Redis(err.to_string())
                })?;
            Ok(written == 1)
        })
        .await
    }

    async fn put_session(&self, token: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            conn.set_ex::<_, _, ()>(session_key(token), serialized, self.session_ttl_secs)
                .await
                .map_err(|err| {
                    error!("Redis error while storing session: {}", err);
                    StoreError::Redis(err.to_string())
                })
        })
        .await
    }

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.timed(self.get_json(&session_key(token))).await
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        self.timed(async {
            let mut conn = self.conn_manager.clone();
            conn.del::<_, ()>(session_key(token)).await.map_err(|err| {
                error!("Redis error while deleting session: {}", err);
                StoreError::Redis(err.to_string())
            })
        })
        .await
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        let cmd = redis::cmd("PING");
        let ping = cmd.query_async::<String>(&mut conn);
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(format!("Redis health check failed: {}", err)),
            Err(_) => Err(format!(
                "Redis health check timed out after {}s",
                self.timeout_secs
            )),
        }
    }
}
