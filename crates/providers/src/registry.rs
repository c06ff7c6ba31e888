//! Provider registry and strategy-to-provider routing.
//!
//! Built once at startup from the settings source: an adapter is present
//! exactly when its API key is configured. The orchestrator consults the
//! registry both at submission time (route a strategy to an adapter) and
//! when resuming a persisted job (find the adapter that owns it).

use std::collections::HashMap;
use std::sync::Arc;

use clipchain_core::error::CoreError;
use clipchain_core::job::ProviderId;
use clipchain_core::settings::SettingsSource;
use clipchain_core::strategy::GenerationStrategy;

use crate::adapter::ProviderAdapter;
use crate::avatar::{self, AvatarStudioAdapter};
use crate::motion::{self, MotionFrameAdapter};
use crate::replica::{self, ReplicaForgeAdapter};

/// Lookup seam between the orchestrator and the concrete adapters.
/// Tests substitute mock registries through this trait.
pub trait AdapterRegistry: Send + Sync {
    /// Adapter for a specific provider, when configured.
    fn get(&self, id: ProviderId) -> Option<Arc<dyn ProviderAdapter>>;

    /// Route a strategy to an adapter, honoring an explicit provider pin.
    fn select(
        &self,
        strategy: &GenerationStrategy,
        preferred: Option<ProviderId>,
    ) -> Result<Arc<dyn ProviderAdapter>, CoreError>;
}

/// Registry of all configured provider adapters.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Build the registry from settings. Each adapter is enabled by the
    /// presence of its API key; base URLs default per provider.
    pub fn from_settings(settings: &dyn SettingsSource) -> Self {
        let client = reqwest::Client::new();
        let mut adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = HashMap::new();

        if let Some(key) = settings.get(avatar::SETTING_API_KEY) {
            let url = settings
                .get(avatar::SETTING_API_URL)
                .unwrap_or_else(|| avatar::DEFAULT_API_URL.to_string());
            adapters.insert(
                ProviderId::AvatarStudio,
                Arc::new(AvatarStudioAdapter::with_client(client.clone(), url, key)),
            );
        }

        if let Some(key) = settings.get(replica::SETTING_API_KEY) {
            let url = settings
                .get(replica::SETTING_API_URL)
                .unwrap_or_else(|| replica::DEFAULT_API_URL.to_string());
            adapters.insert(
                ProviderId::ReplicaForge,
                Arc::new(ReplicaForgeAdapter::new(url, key)),
            );
        }

        if let Some(key) = settings.get(motion::SETTING_API_KEY) {
            let url = settings
                .get(motion::SETTING_API_URL)
                .unwrap_or_else(|| motion::DEFAULT_API_URL.to_string());
            adapters.insert(
                ProviderId::MotionFrame,
                Arc::new(MotionFrameAdapter::new(url, key)),
            );
        }

        tracing::info!(
            providers = adapters.len(),
            "Provider registry initialized",
        );

        Self { adapters }
    }

    /// Registry with explicit adapters. Used by tests and embedders that
    /// construct adapters themselves.
    pub fn with_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.id(), a)).collect(),
        }
    }

    /// Ids of all configured providers.
    pub fn configured_ids(&self) -> Vec<ProviderId> {
        self.adapters.keys().copied().collect()
    }

    fn first_available(
        &self,
        order: &[ProviderId],
        needed_for: &str,
    ) -> Result<Arc<dyn ProviderAdapter>, CoreError> {
        order
            .iter()
            .find_map(|id| self.adapters.get(id).cloned())
            .ok_or_else(|| {
                CoreError::Configuration(format!(
                    "no provider configured for {needed_for} (need one of: {})",
                    order
                        .iter()
                        .map(|id| id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

impl AdapterRegistry for ProviderRegistry {
    fn get(&self, id: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&id).cloned()
    }

    fn select(
        &self,
        strategy: &GenerationStrategy,
        preferred: Option<ProviderId>,
    ) -> Result<Arc<dyn ProviderAdapter>, CoreError> {
        if let Some(id) = preferred {
            return self.get(id).ok_or_else(|| {
                CoreError::Configuration(format!("preferred provider '{id}' is not configured"))
            });
        }

        match strategy {
            GenerationStrategy::Template { .. } | GenerationStrategy::AvatarPair { .. } => {
                self.first_available(&[ProviderId::AvatarStudio], strategy.kind())
            }
            GenerationStrategy::AvatarSolo { .. } => self.first_available(
                &[ProviderId::ReplicaForge, ProviderId::AvatarStudio],
                strategy.kind(),
            ),
        }
    }
}
