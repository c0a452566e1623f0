use crate::config::Settings;
use crate::grants::GrantService;
use crate::registry::ClientRegistry;
use crate::store::{AuthStore, Store, create_store};
use crate::tokens::TokenService;
use std::sync::Arc;

/// Shared application state,
/// created once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<Store>,
    pub registry: ClientRegistry,
    pub grants: GrantService,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, String> {
        let store = create_store(&settings).await.map_err(|e| e.to_string())?;
        Ok(Self::with_store(settings, store))
    }

    /// Wires the services around an existing store. Tests use this to share
    /// one in-memory store between the fixture and the app under test.
    pub fn with_store(settings: Settings, store: Store) -> Self {
        let settings = Arc::new(settings);
        let store = Arc::new(store);
        let registry = ClientRegistry::new(store.clone());
        let grants = GrantService::new(store.clone());
        let tokens = Arc::new(TokenService::new(
            &settings.token,
            store.clone(),
            registry.clone(),
            grants.clone(),
        ));
        Self {
            settings,
            store,
            registry,
            grants,
            tokens,
        }
    }

    pub async fn health_check(&self) -> Result<(), String> {
        self.store.health_check().await
    }
}
