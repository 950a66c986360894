// src/provider.rs

use crate::clock::{Clock, SystemClock};
use crate::config::ProviderConfig;
use crate::error::ForwardOidcError;
use crate::generator::keys::KeyManager;
use crate::generator::Generator;
use crate::registry::ClientRegistry;
use crate::session::{ForwardAuthBridge, SessionBridge};
use crate::store::AuthorizationCodeStore;
use crate::validator::Validator;
use std::sync::Arc;

/// The OIDC provider: every collaborator the protocol endpoints need.
///
/// Created once at startup and shared behind an `Arc`; the code store is the
/// only part with mutable state.
pub struct Provider {
    pub(crate) config: ProviderConfig,
    pub(crate) registry: ClientRegistry,
    pub(crate) keys: Arc<KeyManager>,
    pub(crate) codes: Arc<AuthorizationCodeStore>,
    pub(crate) bridge: Arc<dyn SessionBridge>,
    pub(crate) generator: Generator,
    pub(crate) validator: Validator,
}

impl Provider {
    /// Builds the production provider: keys from `config.key_path`, a forward-auth
    /// session bridge and the system clock.
    ///
    /// # Errors
    ///
    /// Fails when the signing key cannot be loaded or generated, when the client
    /// list contains a duplicate id, or when the verification URL is unusable.
    /// The provider cannot run without a signing key, so callers should treat
    /// this as fatal.
    pub fn new(config: ProviderConfig) -> Result<Self, ForwardOidcError> {
        let keys = KeyManager::load_or_generate(&config.key_path)?;
        let bridge = ForwardAuthBridge::new(&config.verify_url, config.session_timeout())?;
        Self::from_parts(config, keys, Arc::new(bridge), Arc::new(SystemClock))
    }

    /// Builds a provider from injected collaborators.
    pub fn from_parts(
        config: ProviderConfig,
        keys: KeyManager,
        bridge: Arc<dyn SessionBridge>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ForwardOidcError> {
        let registry = ClientRegistry::from_config(&config.clients)?;
        let keys = Arc::new(keys);
        let codes = Arc::new(AuthorizationCodeStore::new(config.code_ttl(), clock.clone()));
        let generator = Generator::new(config.issuer(), keys.clone(), clock);
        let validator = Validator::new(config.issuer(), keys.clone());

        tracing::info!(
            issuer = %config.issuer(),
            clients = registry.len(),
            kid = %keys.kid(),
            "OIDC provider initialised."
        );

        Ok(Self {
            config,
            registry,
            keys,
            codes,
            bridge,
            generator,
            validator,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn codes(&self) -> &Arc<AuthorizationCodeStore> {
        &self.codes
    }

    /// Starts the periodic sweep of expired codes if one is configured.
    pub fn start_background_tasks(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.code_sweep_interval()?;
        tracing::info!(?interval, "Expired authorization codes will be swept periodically.");
        Some(Arc::clone(&self.codes).start_sweep_task(interval))
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("issuer", &self.config.issuer())
            .field("kid", &self.keys.kid())
            .finish()
    }
}
