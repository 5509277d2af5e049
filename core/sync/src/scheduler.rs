//! Automatic sync on reconnect.
//!
//! The only automatic trigger is a disconnected-to-connected transition of
//! the network monitor. There is no timer-driven sync.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;
use crate::network::{subscribe, NetworkMonitor, Subscription};

/// Sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Manual sync only.
    Manual,
    /// Manual sync, plus a cycle whenever connectivity returns.
    OnReconnect,
}

/// Live reconnect subscription owned by the engine.
pub struct AutoSync {
    subscription: Subscription,
    triggers: Arc<AtomicU64>,
}

impl AutoSync {
    /// Subscribe to `monitor`. `connected` is the state the first
    /// notification is compared against.
    pub(crate) fn start(
        engine: Weak<SyncEngine>,
        monitor: &dyn NetworkMonitor,
        connected: bool,
    ) -> Self {
        let was_connected = AtomicBool::new(connected);
        let triggers = Arc::new(AtomicU64::new(0));
        let counter = triggers.clone();

        let subscription = subscribe(monitor, move |status| {
            let previous = was_connected.swap(status.is_connected, Ordering::AcqRel);
            if !status.is_connected {
                if previous {
                    info!("Connectivity lost");
                }
                return;
            }
            if previous {
                // Redundant "connected" notification
                return;
            }

            let Some(engine) = engine.upgrade() else {
                debug!("Engine dropped, ignoring reconnect");
                return;
            };
            counter.fetch_add(1, Ordering::Relaxed);
            info!("Connectivity restored ({}), starting sync", status.connection_type);

            // Fire and forget
            tokio::spawn(async move {
                let result = engine.manual_sync().await;
                if !result.success {
                    warn!("Automatic sync did not complete cleanly: {:?}", result.errors);
                }
            });
        });

        Self {
            subscription,
            triggers,
        }
    }

    /// Number of cycles this subscription has started.
    pub fn triggers(&self) -> u64 {
        self.triggers.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&SyncMode::OnReconnect).unwrap();
        assert_eq!(json, "\"OnReconnect\"");
        let mode: SyncMode = serde_json::from_str("\"Manual\"").unwrap();
        assert_eq!(mode, SyncMode::Manual);
    }
}
