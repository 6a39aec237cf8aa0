use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Provider;
use crate::traits::AtsAdapter;

/// Fixed set of ATS adapters keyed by provider.
///
/// Adding a provider means registering one more adapter here; the
/// orchestrator never branches on provider itself.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn AtsAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the provider it reports. Replaces any
    /// adapter previously registered for that provider.
    pub fn register(&mut self, adapter: Arc<dyn AtsAdapter>) -> &mut Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn AtsAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn AtsAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn supports(&self, provider: Provider) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Registered providers, sorted.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.adapters.keys().copied().collect();
        providers.sort();
        providers
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
