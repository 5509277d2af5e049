//! Local persistence for FieldSync.
//!
//! This module provides a trait-based interface over the async key-value
//! substrate (in-memory, local files), a registry for resolving a substrate
//! from configuration, and the typed [`LocalStore`] that the sync engine and
//! UI code read and write through.
//!
//! # Design Principles
//! - Whole-collection JSON documents, one fixed key per collection
//! - Async operations: all substrate I/O is async
//! - Strict reads on every read-modify-write path; lenient reads report the
//!   error they masked

pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod store;

pub use local::FileStore;
pub use memory::MemoryStore;
pub use provider::KeyValueStore;
pub use registry::{create_default_registry, StoreFactory, StoreRegistry};
pub use store::{LocalStore, PendingItems, ReadOutcome};
