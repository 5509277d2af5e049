//! Store registry for resolving a persistence substrate from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::KeyValueStore;
use fieldsync_common::{Error, Result};

/// Factory function type for creating stores.
pub type StoreFactory = Box<dyn Fn(Value) -> Result<Arc<dyn KeyValueStore>> + Send + Sync>;

/// Registry for key-value store factories.
///
/// Allows dynamic registration and resolution of stores by name and
/// configuration.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a store factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StoreFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Store '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a store by name and configuration.
    ///
    /// # Errors
    /// - Store not registered
    /// - Configuration invalid for the store
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn KeyValueStore>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Store '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered store names.
    pub fn stores(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a store is registered.
    pub fn has_store(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in stores.
///
/// - `memory`: no configuration
/// - `file`: `{"root": "<directory>"}`
pub fn create_default_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::new();

    registry.factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryStore::new()))),
    );

    registry.factories.insert(
        "file".to_string(),
        Box::new(|config| {
            let root = config
                .get("root")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::InvalidInput("File store requires 'root' path".to_string())
                })?;
            Ok(Arc::new(crate::local::FileStore::new(root)?))
        }),
    );

    registry
}
