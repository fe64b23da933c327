//! Static mapping from provider identity to a ready-to-call adapter

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::{create_provider, LlmProvider, ProviderAdapter, ProviderId};

/// Adapters resolved once at startup, shared by every dispatch
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<ProviderId, ProviderAdapter>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every enabled provider that has credentials
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        for id in ProviderId::ALL {
            let Some(provider_config) = config.provider(id) else {
                continue;
            };
            if !provider_config.enabled {
                debug!(provider = id.key(), "provider disabled in config");
                continue;
            }

            let api_key = config.resolve_api_key(id);
            match create_provider(id, provider_config.clone(), api_key) {
                Ok(provider) => {
                    let adapter = ProviderAdapter::new(provider).with_timeout(config.timeout_for(id));
                    registry.insert(adapter);
                }
                Err(e) => {
                    warn!(provider = id.key(), "skipping provider: {}", e);
                }
            }
        }

        registry
    }

    /// Register an adapter, replacing any previous one for the same provider
    pub fn insert(&mut self, adapter: ProviderAdapter) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.insert(ProviderAdapter::new(provider));
        self
    }

    pub fn with_adapter(mut self, adapter: ProviderAdapter) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderAdapter> {
        self.adapters.get(&id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
