//! Delegated token configuration

use confique::Config;

/// Configuration for minting and verifying delegated access tokens
#[derive(Debug, Config, Clone)]
pub struct TokenConfig {
    /// HMAC signing key for delegated tokens. When unset, an ephemeral key is
    /// generated at startup and all tokens become invalid on restart.
    #[config(env = "OBO_TOKEN_SIGNING_KEY")]
    pub signing_key: Option<String>,

    /// Issuer identifier embedded in minted tokens (default: "obo-server")
    #[config(env = "OBO_TOKEN_ISSUER", default = "obo-server")]
    pub issuer: String,

    /// TTL in seconds applied to tokens minted by the exchange endpoint
    /// (default: 3600 = 1 hour)
    #[config(env = "OBO_TOKEN_TTL", default = 3600)]
    pub ttl_secs: u64,

    /// Upper bound on any requested token TTL in seconds
    /// (default: 86400 = 24 hours)
    #[config(env = "OBO_TOKEN_MAX_TTL", default = 86400)]
    pub max_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            issuer: "obo-server".to_string(),
            ttl_secs: 3600,
            max_ttl_secs: 86400,
        }
    }
}
