//! Persistence substrate trait definition.

use async_trait::async_trait;

use fieldsync_common::Result;

/// Async string-keyed key-value store the Local Store is built on.
///
/// Implementations hold whole serialized collections under fixed keys; they
/// know nothing about records. A write must be visible to every subsequent
/// read in the same process.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the substrate name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// `None` when nothing has been written under the key yet.
    ///
    /// # Errors
    /// - I/O or backend failures
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    ///
    /// # Postconditions
    /// - A following `get(key)` returns `value`
    ///
    /// # Errors
    /// - I/O or backend failures
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove the value stored under `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
