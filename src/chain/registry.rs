use std::collections::HashMap;
use std::sync::Arc;

use super::ChainAdapter;
use crate::domain::ChainKind;
use crate::error::{Result, WardenError};

/// Adapter lookup by chain. Built once at startup; lookups are
/// read-only afterwards.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainKind, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: ChainKind) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| WardenError::AdapterNotFound(chain.to_string()))
    }

    pub fn chains(&self) -> Vec<ChainKind> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
