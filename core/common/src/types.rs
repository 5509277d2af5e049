//! Common types used throughout FieldSync.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a persisted record (project, task or evidence).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new RecordId from a string.
    ///
    /// # Preconditions
    /// - `id` must be non-empty and not only whitespace
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "RecordId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<str> for RecordId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// The persisted collections, one substrate key each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Projects,
    Tasks,
    Evidence,
    SyncQueue,
}

impl Collection {
    /// All collections, in a stable order.
    pub const ALL: [Collection; 4] = [
        Collection::Projects,
        Collection::Tasks,
        Collection::Evidence,
        Collection::SyncQueue,
    ];

    /// Substrate key under which the collection is stored.
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Tasks => "tasks",
            Collection::Evidence => "evidence",
            Collection::SyncQueue => "sync_queue",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
