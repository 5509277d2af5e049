//! Read-only sync summary for UI consumption.
//!
//! Safe to call at any time, including mid-cycle, where records in
//! `syncing` are reported as such rather than hidden.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fieldsync_common::{Evidence, SyncMetadata, SyncStatus, Task};
use fieldsync_storage::LocalStore;

use crate::network::NetworkMonitor;

/// The one bucket each record is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl StatusClass {
    pub fn of(meta: &SyncMetadata) -> Self {
        match meta.sync_status {
            SyncStatus::Failed => StatusClass::Failed,
            SyncStatus::Syncing => StatusClass::Syncing,
            SyncStatus::Synced if !meta.needs_sync => StatusClass::Synced,
            _ => StatusClass::Pending,
        }
    }
}

/// Counts over the full task and evidence collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total_items: usize,
    pub pending_items: usize,
    pub syncing_items: usize,
    pub synced_items: usize,
    pub failed_items: usize,
}

impl StatusCounts {
    pub fn add(&mut self, meta: &SyncMetadata) {
        self.total_items += 1;
        match StatusClass::of(meta) {
            StatusClass::Pending => self.pending_items += 1,
            StatusClass::Syncing => self.syncing_items += 1,
            StatusClass::Synced => self.synced_items += 1,
            StatusClass::Failed => self.failed_items += 1,
        }
    }

    pub fn tally<'a>(metas: impl IntoIterator<Item = &'a SyncMetadata>) -> Self {
        let mut counts = Self::default();
        for meta in metas {
            counts.add(meta);
        }
        counts
    }
}

/// Summary returned by `get_sync_status_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusData {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Set when a collection could not be read and counts are incomplete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
}

/// Derives [`SyncStatusData`] from the Local Store and the network monitor.
pub struct StatusAggregator {
    store: Arc<LocalStore>,
    network: Arc<dyn NetworkMonitor>,
}

impl StatusAggregator {
    pub fn new(store: Arc<LocalStore>, network: Arc<dyn NetworkMonitor>) -> Self {
        Self { store, network }
    }

    /// Recompute the summary. Never writes.
    pub async fn snapshot(&self) -> SyncStatusData {
        let tasks = self.store.read_all_lenient::<Task>(None).await;
        let evidence = self.store.read_all_lenient::<Evidence>(None).await;
        let last_sync = self.store.last_sync_timestamp_lenient().await;
        let network = self.network.status().await;

        let counts = StatusCounts::tally(
            tasks
                .value
                .iter()
                .map(|t| &t.sync)
                .chain(evidence.value.iter().map(|e| &e.sync)),
        );

        let errors: Vec<String> = [tasks.error, evidence.error, last_sync.error]
            .into_iter()
            .flatten()
            .collect();

        SyncStatusData {
            counts,
            is_online: network.is_connected,
            last_sync_at: last_sync.value,
            read_error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ManualMonitor;
    use fieldsync_common::{EvidenceType, RecordId};
    use fieldsync_storage::MemoryStore;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_snapshot_counts() {
        let kv = Arc::new(MemoryStore::new());
        let store = Arc::new(LocalStore::new(kv.clone()));
        let network = Arc::new(ManualMonitor::online());
        let aggregator = StatusAggregator::new(store.clone(), network.clone());

        let p = RecordId::new("p1").unwrap();
        let a = store.add_task(Task::new(p.clone(), "a", "")).await.unwrap();
        let b = store.add_task(Task::new(p.clone(), "b", "")).await.unwrap();
        store
            .add_evidence(Evidence::new(a.id.clone(), EvidenceType::Photo, "x", "/x"))
            .await
            .unwrap();
        store
            .update_many::<Task, _>(&[a.id.clone()], |t| t.sync.mark_synced(Utc::now()))
            .await
            .unwrap();
        store
            .update_many::<Task, _>(&[b.id.clone()], |t| t.sync.mark_failed("nope"))
            .await
            .unwrap();

        let writes_before = kv.write_count();
        let data = aggregator.snapshot().await;
        assert_eq!(kv.write_count(), writes_before);

        assert_eq!(data.counts.total_items, 3);
        assert_eq!(data.counts.synced_items, 1);
        assert_eq!(data.counts.failed_items, 1);
        assert_eq!(data.counts.pending_items, 1);
        assert!(data.is_online);
        assert!(data.read_error.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reports_read_errors() {
        let kv = Arc::new(MemoryStore::new());
        let store = Arc::new(LocalStore::new(kv.clone()));
        let aggregator = StatusAggregator::new(store, Arc::new(ManualMonitor::offline()));

        kv.fail_reads(true);
        let data = aggregator.snapshot().await;
        assert_eq!(data.counts, StatusCounts::default());
        assert!(!data.is_online);
        assert!(data.read_error.unwrap().contains("injected read failure"));
    }

    #[test]
    fn test_syncing_is_reported_separately() {
        let mut meta = SyncMetadata::new_local();
        meta.mark_syncing();
        let counts = StatusCounts::tally([&meta]);
        assert_eq!(counts.syncing_items, 1);
        assert_eq!(counts.pending_items + counts.synced_items + counts.failed_items, 0);
    }

    fn any_meta() -> impl Strategy<Value = SyncMetadata> {
        (
            prop_oneof![
                Just(SyncStatus::Pending),
                Just(SyncStatus::Syncing),
                Just(SyncStatus::Synced),
                Just(SyncStatus::Failed),
            ],
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(sync_status, needs_sync, is_offline)| SyncMetadata {
                is_offline,
                needs_sync,
                sync_status,
                last_synced_at: None,
                sync_error: None,
            })
    }

    proptest! {
        #[test]
        fn prop_counts_never_exceed_total(metas in proptest::collection::vec(any_meta(), 0..64)) {
            let counts = StatusCounts::tally(metas.iter());
            let classified = counts.pending_items + counts.synced_items + counts.failed_items;
            prop_assert!(classified <= counts.total_items);
            prop_assert_eq!(classified + counts.syncing_items, counts.total_items);
            if counts.syncing_items == 0 {
                prop_assert_eq!(classified, counts.total_items);
            }
        }
    }
}
