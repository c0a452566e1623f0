//! Record store configuration

use confique::Config;
use serde::Deserialize;

/// Specifies which record store backend to use
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    InMemory,
    Redis,
}

/// Configuration for the record store backing clients, grants, and sessions
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Store backend: "in-memory" or "redis" (default: "in-memory")
    #[config(env = "OBO_STORE_BACKEND", default = "in-memory")]
    pub backend: StoreBackend,

    /// Session token TTL in seconds (default: 86400 = 24 hours)
    #[config(env = "OBO_STORE_SESSION_TTL", default = 86400)]
    pub session_ttl_secs: u64,

    /// Timeout for a single store operation in seconds (default: 5)
    #[config(env = "OBO_STORE_TIMEOUT", default = 5)]
    pub timeout_secs: u64,

    /// In-memory store specific configuration
    #[config(nested)]
    pub in_memory: InMemoryStoreConfig,

    /// Redis store specific configuration
    #[config(nested)]
    pub redis: RedisStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            session_ttl_secs: 86400,
            timeout_secs: 5,
            in_memory: InMemoryStoreConfig::default(),
            redis: RedisStoreConfig::default(),
        }
    }
}

/// In-memory store configuration options
#[derive(Debug, Config, Clone)]
pub struct InMemoryStoreConfig {
    /// Maximum session cache capacity in MiB (default: 128)
    #[config(env = "OBO_STORE_MEMORY_CAPACITY_MIB", default = 128)]
    pub capacity_mib: usize,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self { capacity_mib: 128 }
    }
}

/// Redis store configuration options
#[derive(Debug, Config, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection string, e.g. "redis://localhost:6379"
    #[config(env = "OBO_STORE_REDIS_URL", default = "")]
    pub url: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self { url: String::new() }
    }
}
