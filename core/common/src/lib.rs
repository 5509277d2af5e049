//! Common utilities and types shared across FieldSync modules.
//!
//! This module provides the error taxonomy and the persisted domain records
//! (projects, tasks, evidence, the sync queue) used by the store and the
//! sync engine.

pub mod error;
pub mod model;
pub mod types;

pub use error::{Error, Result};
pub use model::{
    BucketKind, Evidence, EvidenceType, Project, ProjectStatus, Record, SyncItem, SyncMetadata,
    SyncQueue, SyncStatus, Syncable, Task, TaskStatus,
};
pub use types::{Collection, RecordId};
