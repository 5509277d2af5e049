//! Core sync engine that orchestrates sync cycles.
//!
//! Each bucket claims its dirty records (marking them `syncing` in the same
//! locked write that reads them), pushes that snapshot once, and writes the
//! outcome back through the Local Store. The two buckets run concurrently and
//! never affect each other. Records edited or queued while a cycle is in
//! flight are picked up by the next cycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use fieldsync_common::{
    BucketKind, Error, Evidence, RecordId, Result, SyncItem, SyncStatus, Syncable, Task,
};
use fieldsync_storage::LocalStore;

use crate::network::NetworkMonitor;
use crate::remote::{PushBatch, RemotePush};
use crate::scheduler::{AutoSync, SyncMode};
use crate::state::{EngineState, InFlight, SyncFlag, SyncResult};
use crate::status::{StatusAggregator, SyncStatusData};

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether reconnect events trigger cycles.
    pub sync_mode: SyncMode,
    /// Upper bound on a single bucket push. `None` waits indefinitely.
    pub push_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::OnReconnect,
            push_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Handle returned by [`SyncEngine::on_sync_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type CompletionCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Default)]
struct BucketOutcome {
    /// Records whose snapshot reached the remote.
    pushed: Vec<RecordId>,
    /// Pushed records that were still `syncing` and are now `synced`.
    confirmed: Vec<RecordId>,
    failed: Vec<RecordId>,
    error: Option<String>,
}

impl BucketOutcome {
    fn failed(ids: Vec<RecordId>, error: String) -> Self {
        Self {
            failed: ids,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Offline-first sync orchestrator.
///
/// Construct once per process (or per test) and share behind an `Arc`.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    network: Arc<dyn NetworkMonitor>,
    remote: Arc<dyn RemotePush>,
    status: StatusAggregator,
    in_flight: InFlight,
    callbacks: Mutex<Vec<(CallbackId, CompletionCallback)>>,
    next_callback: AtomicU64,
    auto_sync: Mutex<Option<AutoSync>>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        store: Arc<LocalStore>,
        network: Arc<dyn NetworkMonitor>,
        remote: Arc<dyn RemotePush>,
        config: SyncConfig,
    ) -> Self {
        Self {
            status: StatusAggregator::new(store.clone(), network.clone()),
            store,
            network,
            remote,
            in_flight: InFlight::new(),
            callbacks: Mutex::new(Vec::new()),
            next_callback: AtomicU64::new(1),
            auto_sync: Mutex::new(None),
            config,
        }
    }

    /// Get a reference to the Local Store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.in_flight.state()
    }

    /// Whether a cycle is running right now.
    pub fn get_sync_status(&self) -> SyncFlag {
        SyncFlag {
            is_syncing: self.state() == EngineState::Syncing,
        }
    }

    /// Read-only summary of the collections. Never triggers a cycle.
    pub async fn get_sync_status_data(&self) -> SyncStatusData {
        self.status.snapshot().await
    }

    /// Register a callback invoked with the outcome of every completed cycle.
    pub fn on_sync_complete<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed));
        lock(&self.callbacks).push((id, Arc::new(callback)));
        id
    }

    /// Remove a completion callback. Returns whether it was registered.
    pub fn remove_sync_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = lock(&self.callbacks);
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    /// Flag a record for the next cycle without starting one.
    ///
    /// Tasks are marked `needs_sync` and offline. Evidence is marked the same
    /// way and its id is appended to the queue index. Records missing from
    /// their collection are inserted. Safe to call repeatedly.
    pub async fn queue_for_sync(&self, item: SyncItem) -> Result<()> {
        let queued = self.store.queue_item(item).await?;
        debug!("Queued {} {} for sync", queued.bucket(), queued.id());
        Ok(())
    }

    /// Run one sync cycle now.
    ///
    /// Never fails: every error ends up in [`SyncResult::errors`] and in the
    /// affected records' `sync_error`. Returns immediately with
    /// "Sync already in progress" if another cycle holds the flag.
    pub async fn manual_sync(&self) -> SyncResult {
        let Some(guard) = self.in_flight.try_acquire() else {
            debug!("Sync requested while another cycle is running");
            return SyncResult::aborted(&Error::SyncInProgress);
        };

        let start = Instant::now();
        info!("Starting sync cycle");
        let result = self.run_cycle().await;
        drop(guard);

        info!(
            "Sync cycle finished in {:?}: success={}, {} tasks and {} evidence synced, {} failed",
            start.elapsed(),
            result.success,
            result.synced_tasks,
            result.synced_evidence,
            result.failed_tasks.len() + result.failed_evidence.len()
        );

        self.notify_complete(result.success);
        result
    }

    /// Subscribe to the network monitor and run a cycle on every
    /// disconnected-to-connected transition.
    ///
    /// Replaces a previous subscription. A no-op in [`SyncMode::Manual`].
    /// Must be called from within a tokio runtime.
    pub async fn start_auto_sync(self: &Arc<Self>) {
        if matches!(self.config.sync_mode, SyncMode::Manual) {
            info!("Auto-sync disabled by configuration");
            return;
        }
        let connected = self.network.status().await.is_connected;
        let auto = AutoSync::start(Arc::downgrade(self), self.network.as_ref(), connected);
        if lock(&self.auto_sync).replace(auto).is_some() {
            debug!("Replaced existing auto-sync subscription");
        }
        info!("Auto-sync started (currently {})", if connected { "online" } else { "offline" });
    }

    /// Stop reacting to connectivity changes.
    pub fn stop_auto_sync(&self) {
        if lock(&self.auto_sync).take().is_some() {
            info!("Auto-sync stopped");
        }
    }

    pub fn is_auto_sync_active(&self) -> bool {
        lock(&self.auto_sync)
            .as_ref()
            .is_some_and(|auto| auto.is_active())
    }

    /// Cycles started by the current auto-sync subscription.
    pub fn auto_sync_triggers(&self) -> u64 {
        lock(&self.auto_sync)
            .as_ref()
            .map_or(0, |auto| auto.triggers())
    }

    async fn run_cycle(&self) -> SyncResult {
        if !self.network.status().await.is_connected {
            warn!("Sync skipped: no network connection");
            return SyncResult::aborted(&Error::NetworkUnavailable);
        }

        let (tasks, evidence) = tokio::join!(
            self.sync_bucket::<Task>(BucketKind::Tasks),
            self.sync_bucket::<Evidence>(BucketKind::Evidence),
        );

        let mut result = SyncResult::new();
        result.synced_tasks = tasks.pushed.len();
        result.failed_tasks = tasks.failed;
        if let Some(e) = tasks.error {
            result.fail(e);
        }
        result.synced_evidence = evidence.pushed.len();
        result.failed_evidence = evidence.failed;
        if let Some(e) = evidence.error {
            result.fail(e);
        }

        let success = result.success;
        let confirmed_evidence = evidence.confirmed;
        if success || !confirmed_evidence.is_empty() {
            let now = Utc::now();
            let written = self
                .store
                .update_sync_queue(|queue| {
                    queue.dequeue_evidence(&confirmed_evidence);
                    if success {
                        queue.last_sync_at = Some(now);
                    }
                })
                .await;
            if let Err(e) = written {
                error!("Failed to update sync queue: {}", e);
                result.fail(format!("Failed to update sync queue: {}", e));
            }
        }

        result
    }

    async fn sync_bucket<T>(&self, kind: BucketKind) -> BucketOutcome
    where
        T: Syncable + Into<SyncItem>,
    {
        let items: Vec<T> = match self.store.claim_pending::<T>().await {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to read pending {}: {}", kind, e);
                return BucketOutcome::failed(
                    Vec::new(),
                    format!("Failed to read pending items ({}): {}", kind, e),
                );
            }
        };
        if items.is_empty() {
            return BucketOutcome::default();
        }
        let ids: Vec<RecordId> = items.iter().map(|item| item.id().clone()).collect();
        debug!("Claimed {} {} for push", ids.len(), kind);

        let batch = PushBatch::new(kind, items.into_iter().map(Into::into).collect());
        match self.push(batch).await {
            Ok(()) => {
                let now = Utc::now();
                let mut confirmed = Vec::new();
                let written = self
                    .store
                    .update_many::<T, _>(&ids, |record| {
                        // Edited or re-queued mid-cycle: leave dirty for the next cycle
                        if record.sync().sync_status == SyncStatus::Syncing {
                            record.sync_mut().mark_synced(now);
                            confirmed.push(record.id().clone());
                        }
                    })
                    .await;
                match written {
                    Ok(_) => {
                        if confirmed.len() != ids.len() {
                            debug!(
                                "{} of {} pushed {} changed during the cycle",
                                ids.len() - confirmed.len(),
                                ids.len(),
                                kind
                            );
                        }
                        info!("Synced {} {}", ids.len(), kind);
                        BucketOutcome {
                            pushed: ids,
                            confirmed,
                            ..BucketOutcome::default()
                        }
                    }
                    Err(e) => {
                        // Records stay dirty and are pushed again next cycle
                        error!("Pushed {} but failed to record the outcome: {}", kind, e);
                        BucketOutcome::failed(
                            ids,
                            format!("Failed to record {} sync outcome: {}", kind, e),
                        )
                    }
                }
            }
            Err(push_error) => {
                let message = push_error.to_string();
                warn!("Pushing {} {} failed: {}", ids.len(), kind, message);
                if let Err(e) = self
                    .store
                    .update_many::<T, _>(&ids, |record| record.sync_mut().mark_failed(message.clone()))
                    .await
                {
                    error!("Failed to mark {} as failed: {}", kind, e);
                }
                BucketOutcome::failed(ids, format!("Failed to sync {}: {}", kind, message))
            }
        }
    }

    /// One push of one bucket, bounded by the configured timeout.
    async fn push(&self, batch: PushBatch) -> Result<()> {
        let response = match self.config.push_timeout {
            Some(limit) => tokio::time::timeout(limit, self.remote.push(batch))
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => self.remote.push(batch).await?,
        };
        response.into_result()
    }

    fn notify_complete(&self, success: bool) {
        let callbacks: Vec<CompletionCallback> = lock(&self.callbacks)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(success);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ManualMonitor;
    use crate::remote::PushResponse;
    use async_trait::async_trait;
    use fieldsync_common::EvidenceType;
    use fieldsync_storage::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    struct SlowRemote {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl RemotePush for SlowRemote {
        async fn push(&self, _batch: PushBatch) -> Result<PushResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(PushResponse::ok())
        }
    }

    fn engine(remote: Arc<dyn RemotePush>, config: SyncConfig) -> Arc<SyncEngine> {
        let store = Arc::new(LocalStore::new(Arc::new(MemoryStore::new())));
        Arc::new(SyncEngine::new(
            store,
            Arc::new(ManualMonitor::online()),
            remote,
            config,
        ))
    }

    #[tokio::test]
    async fn test_push_timeout_releases_flag() {
        let remote = Arc::new(SlowRemote {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(60),
        });
        let config = SyncConfig {
            push_timeout: Some(Duration::from_millis(50)),
            ..SyncConfig::default()
        };
        let engine = engine(remote.clone(), config);
        let task = engine
            .store()
            .add_task(Task::new(RecordId::new("p1").unwrap(), "slow", ""))
            .await
            .unwrap();

        let result = engine.manual_sync().await;
        assert!(!result.success);
        assert_eq!(result.failed_tasks, vec![task.id.clone()]);
        assert!(result.errors[0].contains("timed out"));
        assert_eq!(engine.state(), EngineState::Idle);

        let stored: Task = engine.store().get_one(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.sync.sync_status, SyncStatus::Failed);
        assert!(stored.sync.sync_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_callbacks_receive_outcome() {
        let remote = Arc::new(SlowRemote {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let engine = engine(remote, SyncConfig::default());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = engine.on_sync_complete(move |ok| sink.lock().unwrap().push(ok));

        engine.manual_sync().await;
        assert!(engine.remove_sync_callback(id));
        assert!(!engine.remove_sync_callback(id));
        engine.manual_sync().await;

        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_queue_evidence_updates_index() {
        let remote = Arc::new(SlowRemote {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let engine = engine(remote, SyncConfig::default());
        let evidence = Evidence::new(
            RecordId::new("t1").unwrap(),
            EvidenceType::Document,
            "permit.pdf",
            "/docs/permit.pdf",
        );

        engine.queue_for_sync(evidence.clone().into()).await.unwrap();
        engine.queue_for_sync(evidence.clone().into()).await.unwrap();

        let queue = engine.store().get_sync_queue().await.unwrap();
        assert_eq!(queue.queued_evidence, vec![evidence.id.clone()]);
        assert_eq!(engine.store().get_evidence(None).await.unwrap().len(), 1);

        let result = engine.manual_sync().await;
        assert!(result.success);
        assert_eq!(result.synced_evidence, 1);
        let queue = engine.store().get_sync_queue().await.unwrap();
        assert!(queue.queued_evidence.is_empty());
        assert!(queue.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_manual_mode_disables_auto_sync() {
        let remote = Arc::new(SlowRemote {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let config = SyncConfig {
            sync_mode: SyncMode::Manual,
            ..SyncConfig::default()
        };
        let engine = engine(remote, config);
        engine.start_auto_sync().await;
        assert!(!engine.is_auto_sync_active());
    }

    #[tokio::test]
    async fn test_requeue_during_flight_stays_dirty() {
        let remote = Arc::new(SlowRemote {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
        });
        let engine = engine(remote.clone(), SyncConfig::default());
        let task = engine
            .store()
            .add_task(Task::new(RecordId::new("p1").unwrap(), "edited", ""))
            .await
            .unwrap();

        let cycle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.manual_sync().await })
        };
        while remote.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        engine
            .store()
            .update_task(&task.id, |t| t.title = "edited again".into())
            .await
            .unwrap();

        let result = cycle.await.unwrap();
        assert!(result.success);
        assert_eq!(result.synced_tasks, 1);

        let pending = engine.store().get_pending_sync_items().await.unwrap();
        assert_eq!(pending.tasks.len(), 1);
        assert_eq!(pending.tasks[0].title, "edited again");
        assert_eq!(pending.tasks[0].sync.sync_status, SyncStatus::Pending);
    }
}
