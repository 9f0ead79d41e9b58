//! Provider registry and corridor routing.
//!
//! Ordering is always by configured priority with a name tiebreak, never by
//! map iteration order, so the same corridor input yields the same adapter
//! list on every call and every process.

use std::sync::Arc;

use crate::domain::PaymentMethod;
use crate::providers::ProviderAdapter;

/// A corridor is the (country, currency, method) triple used for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corridor {
    pub country: String,
    pub currency: String,
    pub method: PaymentMethod,
}

impl std::fmt::Display for Corridor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.country, self.currency, self.method)
    }
}

struct Registered {
    adapter: Arc<dyn ProviderAdapter>,
    priority: u32,
}

pub struct ProviderRegistry {
    providers: Vec<Registered>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>, priority: u32) {
        self.providers.push(Registered { adapter, priority });
        self.providers
            .sort_by(|a, b| (a.priority, a.adapter.name()).cmp(&(b.priority, b.adapter.name())));
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers
            .iter()
            .find(|r| r.adapter.name() == name)
            .map(|r| Arc::clone(&r.adapter))
    }

    pub fn all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers.iter().map(|r| Arc::clone(&r.adapter)).collect()
    }

    /// Ordered list of adapters eligible for a corridor. Empty means the
    /// caller must fail fast with NoProviderAvailable.
    pub fn eligible(&self, corridor: &Corridor) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers
            .iter()
            .filter(|r| {
                r.adapter
                    .supported_methods(&corridor.country)
                    .contains(&corridor.method)
                    && r.adapter
                        .supported_currencies()
                        .iter()
                        .any(|c| c == &corridor.currency)
            })
            .map(|r| Arc::clone(&r.adapter))
            .collect()
    }

    /// Union of methods offered for a country, in priority order, deduped.
    pub fn methods_for_country(&self, country: &str) -> Vec<PaymentMethod> {
        let mut methods = Vec::new();
        for r in &self.providers {
            for m in r.adapter.supported_methods(country) {
                if !methods.contains(&m) {
                    methods.push(m);
                }
            }
        }
        methods
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
