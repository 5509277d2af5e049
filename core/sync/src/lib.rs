//! FieldSync Sync Engine
//!
//! This module provides offline-first synchronization of field records:
//! - A sync orchestrator with a single in-flight cycle at a time
//! - Independent task and evidence buckets per cycle
//! - Automatic sync when connectivity returns
//! - A timeout on every bucket push
//! - A read-only status summary for UI code

pub mod engine;
pub mod network;
pub mod remote;
pub mod scheduler;
pub mod state;
pub mod status;

// Re-export main types
pub use engine::{CallbackId, SyncConfig, SyncEngine};
pub use network::{
    subscribe, ManualMonitor, NetworkMonitor, NetworkStatus, ProbeConfig, ProbeMonitor,
    Subscription,
};
pub use remote::{HttpRemote, PushBatch, PushResponse, RemotePush};
pub use scheduler::{AutoSync, SyncMode};
pub use state::{EngineState, InFlight, SyncFlag, SyncResult};
pub use status::{StatusAggregator, StatusCounts, SyncStatusData};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let config = SyncConfig::default();
        assert_eq!(config.sync_mode, SyncMode::OnReconnect);
        assert_eq!(config.push_timeout, Some(std::time::Duration::from_secs(30)));
        let _state = InFlight::new();
        let _result = SyncResult::new();
    }
}
