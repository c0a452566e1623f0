pub(crate) use crate::config::store::{
    InMemoryStoreConfig, RedisStoreConfig, StoreBackend, StoreConfig,
};
pub(crate) use crate::config::token::TokenConfig;
use confique::Config;

pub mod store;
pub mod token;

/// Optional configuration file read alongside environment variables.
const CONFIG_FILE: &str = "obo-server.toml";

/// Main configuration structure for the authorization server
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The address the server binds to (default: "0.0.0.0")
    #[config(env = "OBO_HOST", default = "0.0.0.0")]
    pub host: String,

    /// The port the server listens on (default: 8088)
    #[config(env = "OBO_PORT", default = 8088)]
    pub port: u16,

    /// Record store configuration
    #[config(nested)]
    pub store: StoreConfig,

    /// Delegated token configuration
    #[config(nested)]
    pub token: TokenConfig,
}

impl Settings {
    /// Loads configuration from the environment, with `obo-server.toml` as a
    /// lower-priority fallback when present.
    pub fn load() -> Result<Self, confique::Error> {
        Self::builder().env().file(CONFIG_FILE).load()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            store: StoreConfig::default(),
            token: TokenConfig::default(),
        }
    }
}
