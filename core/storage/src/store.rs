//! Typed Local Store over a [`KeyValueStore`].
//!
//! Each collection is serialized as one JSON document under its fixed key and
//! rewritten whole on every modification. Read-modify-write cycles on the
//! same collection are serialized by a per-collection async mutex, so two
//! writers in this process never lose each other's updates.
//!
//! Reads come in two flavours:
//! - strict (`get_all`, `get_pending_sync_items`, ...) propagate storage
//!   errors and are used by every read-modify-write path;
//! - lenient (`read_all_lenient`, `last_sync_timestamp_lenient`) substitute
//!   the empty value but report the failure in [`ReadOutcome::error`].
//!
//! Writes always propagate errors.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use fieldsync_common::{
    Collection, Error, Evidence, Project, Record, RecordId, Result, SyncItem, SyncQueue, Syncable,
    Task, TaskStatus,
};

use crate::provider::KeyValueStore;

/// Result of a lenient read: the value, plus the error it replaced, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome<T> {
    pub value: T,
    pub error: Option<String>,
}

impl<T> ReadOutcome<T> {
    /// Whether the value is a substitute for a failed read.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// The dirty set of both buckets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingItems {
    pub tasks: Vec<Task>,
    pub evidence: Vec<Evidence>,
}

impl PendingItems {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.evidence.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len() + self.evidence.len()
    }
}

struct CollectionLocks {
    projects: Mutex<()>,
    tasks: Mutex<()>,
    evidence: Mutex<()>,
    sync_queue: Mutex<()>,
}

impl CollectionLocks {
    fn new() -> Self {
        Self {
            projects: Mutex::new(()),
            tasks: Mutex::new(()),
            evidence: Mutex::new(()),
            sync_queue: Mutex::new(()),
        }
    }

    fn get(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Projects => &self.projects,
            Collection::Tasks => &self.tasks,
            Collection::Evidence => &self.evidence,
            Collection::SyncQueue => &self.sync_queue,
        }
    }
}

/// Typed access to the persisted collections.
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    locks: CollectionLocks,
}

impl LocalStore {
    /// Create a store over the given substrate.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            locks: CollectionLocks::new(),
        }
    }

    /// The underlying substrate.
    pub fn substrate(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    async fn load<T: DeserializeOwned + Default>(&self, collection: Collection) -> Result<T> {
        let raw = self.kv.get(collection.key()).await?;
        match raw {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(&json).map_err(|e| {
                Error::Serialization(format!("corrupt '{}' collection: {}", collection, e))
            }),
            _ => Ok(T::default()),
        }
    }

    async fn persist<T: Serialize + ?Sized>(&self, collection: Collection, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.kv.set(collection.key(), json).await
    }

    // ---- generic collection access -------------------------------------

    /// Read every record of a collection, optionally filtered by owner.
    pub async fn get_all<T: Record>(&self, owner: Option<&RecordId>) -> Result<Vec<T>> {
        let mut items: Vec<T> = self.load(T::COLLECTION).await?;
        if let Some(owner) = owner {
            items.retain(|item| item.owner_id() == Some(owner));
        }
        Ok(items)
    }

    /// Like [`get_all`](Self::get_all), but a failed read yields an empty
    /// list flagged with the error.
    pub async fn read_all_lenient<T: Record>(&self, owner: Option<&RecordId>) -> ReadOutcome<Vec<T>> {
        match self.get_all(owner).await {
            Ok(value) => ReadOutcome { value, error: None },
            Err(e) => {
                warn!("Reading '{}' failed, using empty collection: {}", T::COLLECTION, e);
                ReadOutcome {
                    value: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Read a single record by id.
    pub async fn get_one<T: Record>(&self, id: &RecordId) -> Result<Option<T>> {
        let items: Vec<T> = self.get_all(None).await?;
        Ok(items.into_iter().find(|item| item.id() == id))
    }

    /// Overwrite a whole collection.
    pub async fn save_all<T: Record>(&self, items: &[T]) -> Result<()> {
        let _guard = self.locks.get(T::COLLECTION).lock().await;
        self.persist(T::COLLECTION, items).await
    }

    /// Append a new record.
    ///
    /// # Errors
    /// - `AlreadyExists` if a record with the same id is stored
    /// - storage read/write failures
    pub async fn insert_one<T: Record>(&self, record: T) -> Result<T> {
        let _guard = self.locks.get(T::COLLECTION).lock().await;
        let mut items: Vec<T> = self.load(T::COLLECTION).await?;
        if items.iter().any(|item| item.id() == record.id()) {
            return Err(Error::AlreadyExists(format!(
                "{} record {}",
                T::COLLECTION,
                record.id()
            )));
        }
        items.push(record.clone());
        self.persist(T::COLLECTION, &items).await?;
        Ok(record)
    }

    /// Find a record by id, apply `patch`, stamp its modification time and
    /// write the collection back.
    ///
    /// # Errors
    /// - `NotFound` if no record has the id
    /// - storage read/write failures
    pub async fn upsert_one<T, F>(&self, id: &RecordId, patch: F) -> Result<T>
    where
        T: Record,
        F: FnOnce(&mut T),
    {
        let _guard = self.locks.get(T::COLLECTION).lock().await;
        let mut items: Vec<T> = self.load(T::COLLECTION).await?;
        let item = items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| Error::NotFound(format!("{} record {}", T::COLLECTION, id)))?;
        patch(item);
        item.touch(Utc::now());
        let updated = item.clone();
        self.persist(T::COLLECTION, &items).await?;
        Ok(updated)
    }

    /// Apply `patch` to every record whose id is in `ids`, in one write.
    ///
    /// Returns the ids that were found and patched, in collection order.
    pub async fn update_many<T, F>(&self, ids: &[RecordId], mut patch: F) -> Result<Vec<RecordId>>
    where
        T: Record,
        F: FnMut(&mut T),
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.locks.get(T::COLLECTION).lock().await;
        let mut items: Vec<T> = self.load(T::COLLECTION).await?;
        let now = Utc::now();
        let mut touched = Vec::new();
        for item in items.iter_mut().filter(|item| ids.contains(item.id())) {
            patch(item);
            item.touch(now);
            touched.push(item.id().clone());
        }
        if touched.len() != ids.len() {
            debug!(
                "{} of {} {} records vanished before update",
                ids.len() - touched.len(),
                ids.len(),
                T::COLLECTION
            );
        }
        self.persist(T::COLLECTION, &items).await?;
        Ok(touched)
    }

    /// Flag a record dirty, inserting it first if the collection lacks it.
    ///
    /// Calling this repeatedly has the same effect as calling it once.
    pub async fn mark_dirty<T: Syncable>(&self, record: T) -> Result<T> {
        let _guard = self.locks.get(T::COLLECTION).lock().await;
        let mut items: Vec<T> = self.load(T::COLLECTION).await?;
        let now = Utc::now();
        let marked = match items.iter_mut().find(|item| item.id() == record.id()) {
            Some(existing) => {
                existing.sync_mut().mark_dirty();
                existing.touch(now);
                existing.clone()
            }
            None => {
                let mut record = record;
                record.sync_mut().mark_dirty();
                items.push(record.clone());
                record
            }
        };
        self.persist(T::COLLECTION, &items).await?;
        Ok(marked)
    }

    /// Flag a task or evidence record for the next sync cycle.
    ///
    /// Evidence ids are also kept in the queue's evidence index, once each.
    pub async fn queue_item(&self, item: SyncItem) -> Result<SyncItem> {
        match item {
            SyncItem::Task(task) => Ok(self.mark_dirty(task).await?.into()),
            SyncItem::Evidence(evidence) => {
                let evidence = self.mark_dirty(evidence).await?;
                let id = evidence.id.clone();
                self.update_sync_queue(|queue| {
                    if !queue.enqueue_evidence(id) {
                        debug!("Evidence {} already in the queue index", evidence.id);
                    }
                })
                .await?;
                Ok(evidence.into())
            }
        }
    }

    // ---- dirty set -------------------------------------------------------

    /// Tasks and evidence whose `needs_sync` is set or whose status is
    /// pending or failed.
    pub async fn get_pending_sync_items(&self) -> Result<PendingItems> {
        let tasks: Vec<Task> = self.get_all(None).await?;
        let evidence: Vec<Evidence> = self.get_all(None).await?;
        Ok(PendingItems {
            tasks: tasks.into_iter().filter(|t| t.sync.is_dirty()).collect(),
            evidence: evidence.into_iter().filter(|e| e.sync.is_dirty()).collect(),
        })
    }

    /// Mark every dirty record of a collection `syncing` and return the
    /// marked copies, in one locked read-modify-write.
    ///
    /// The returned records are exactly what was marked: an edit that lands
    /// afterwards moves its record back to `pending`, so a push of these
    /// copies can never hide it.
    pub async fn claim_pending<T: Syncable>(&self) -> Result<Vec<T>> {
        let _guard = self.locks.get(T::COLLECTION).lock().await;
        let mut items: Vec<T> = self.load(T::COLLECTION).await?;
        let mut claimed = Vec::new();
        for item in items.iter_mut().filter(|item| item.sync().is_dirty()) {
            item.sync_mut().mark_syncing();
            claimed.push(item.clone());
        }
        if !claimed.is_empty() {
            self.persist(T::COLLECTION, &items).await?;
        }
        Ok(claimed)
    }

    // ---- sync queue --------------------------------------------------------

    /// Read the queue record.
    ///
    /// Before the first [`update_sync_queue`](Self::update_sync_queue) the
    /// record does not exist yet and reads as the default; reading never
    /// writes it.
    pub async fn get_sync_queue(&self) -> Result<SyncQueue> {
        self.load(Collection::SyncQueue).await
    }

    /// Modify and persist the queue record.
    pub async fn update_sync_queue<F>(&self, update: F) -> Result<SyncQueue>
    where
        F: FnOnce(&mut SyncQueue),
    {
        let _guard = self.locks.get(Collection::SyncQueue).lock().await;
        let mut queue: SyncQueue = self.load(Collection::SyncQueue).await?;
        update(&mut queue);
        self.persist(Collection::SyncQueue, &queue).await?;
        Ok(queue)
    }

    pub async fn get_last_sync_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get_sync_queue().await?.last_sync_at)
    }

    pub async fn last_sync_timestamp_lenient(&self) -> ReadOutcome<Option<DateTime<Utc>>> {
        match self.get_last_sync_timestamp().await {
            Ok(value) => ReadOutcome { value, error: None },
            Err(e) => {
                warn!("Reading sync queue failed: {}", e);
                ReadOutcome {
                    value: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn set_last_sync_timestamp(&self, at: DateTime<Utc>) -> Result<()> {
        self.update_sync_queue(|queue| queue.last_sync_at = Some(at))
            .await
            .map(|_| ())
    }

    // ---- mutation API --------------------------------------------------------

    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        self.get_all(None).await
    }

    pub async fn add_project(&self, project: Project) -> Result<Project> {
        self.insert_one(project).await
    }

    pub async fn update_project<F>(&self, id: &RecordId, edit: F) -> Result<Project>
    where
        F: FnOnce(&mut Project),
    {
        self.upsert_one(id, edit).await
    }

    pub async fn get_tasks(&self, project_id: Option<&RecordId>) -> Result<Vec<Task>> {
        self.get_all(project_id).await
    }

    /// Store a new task, flagged dirty and offline.
    pub async fn add_task(&self, mut task: Task) -> Result<Task> {
        let now = Utc::now();
        task.created_at = now;
        task.updated_at = now;
        task.sync.mark_dirty();
        self.insert_one(task).await
    }

    /// Edit a task and flag it dirty.
    pub async fn update_task<F>(&self, id: &RecordId, edit: F) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        self.upsert_one(id, |task: &mut Task| {
            edit(task);
            task.sync.mark_dirty();
        })
        .await
    }

    pub async fn set_task_status(&self, id: &RecordId, status: TaskStatus) -> Result<Task> {
        self.update_task(id, |task| task.status = status).await
    }

    pub async fn get_evidence(&self, task_id: Option<&RecordId>) -> Result<Vec<Evidence>> {
        self.get_all(task_id).await
    }

    /// Store a new evidence record and attach it to its task when present.
    pub async fn add_evidence(&self, mut evidence: Evidence) -> Result<Evidence> {
        evidence.sync.mark_dirty();
        let evidence = self.insert_one(evidence).await?;

        let evidence_id = evidence.id.clone();
        match self
            .update_task(&evidence.task_id, |task| task.attach_evidence(evidence_id))
            .await
        {
            Ok(_) => {}
            Err(Error::NotFound(_)) => {
                debug!("Evidence {} references unknown task {}", evidence.id, evidence.task_id);
            }
            Err(e) => return Err(e),
        }
        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use fieldsync_common::{EvidenceType, SyncStatus};

    fn store() -> (Arc<MemoryStore>, LocalStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = LocalStore::new(kv.clone());
        (kv, store)
    }

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_empty_collections() {
        let (_, store) = store();
        assert!(store.get_tasks(None).await.unwrap().is_empty());
        assert!(store.get_pending_sync_items().await.unwrap().is_empty());
        assert_eq!(store.get_sync_queue().await.unwrap(), SyncQueue::default());
    }

    #[tokio::test]
    async fn test_add_and_filter_tasks() {
        let (_, store) = store();
        store.add_task(Task::new(id("p1"), "A", "")).await.unwrap();
        store.add_task(Task::new(id("p1"), "B", "")).await.unwrap();
        store.add_task(Task::new(id("p2"), "C", "")).await.unwrap();

        assert_eq!(store.get_tasks(None).await.unwrap().len(), 3);
        let p1 = store.get_tasks(Some(&id("p1"))).await.unwrap();
        assert_eq!(p1.len(), 2);
        assert!(p1.iter().all(|t| t.project_id == id("p1")));
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        let (_, store) = store();
        let task = store.add_task(Task::new(id("p1"), "A", "")).await.unwrap();
        assert!(matches!(
            store.insert_one(task).await,
            Err(Error::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_stamps_updated_at() {
        let (_, store) = store();
        let task = store.add_task(Task::new(id("p1"), "A", "")).await.unwrap();
        let before = task.updated_at;

        let updated: Task = store
            .upsert_one(&task.id, |t: &mut Task| t.title = "Renamed".into())
            .await
            .unwrap();

        assert_eq!(updated.title, "Renamed");
        assert!(updated.updated_at >= before);
        let stored: Task = store.get_one(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
    }

    #[tokio::test]
    async fn test_upsert_missing_is_not_found() {
        let (_, store) = store();
        let result = store.upsert_one(&id("nope"), |_t: &mut Task| {}).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_task_marks_dirty() {
        let (_, store) = store();
        let task = store.add_task(Task::new(id("p1"), "A", "")).await.unwrap();
        store
            .update_many::<Task, _>(&[task.id.clone()], |t| t.sync.mark_synced(Utc::now()))
            .await
            .unwrap();
        assert!(store.get_pending_sync_items().await.unwrap().is_empty());

        let updated = store
            .set_task_status(&task.id, TaskStatus::Completed)
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.sync.sync_status, SyncStatus::Pending);
        assert!(updated.sync.needs_sync);
        assert_eq!(store.get_pending_sync_items().await.unwrap().tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_items_selection() {
        let (_, store) = store();
        let a = store.add_task(Task::new(id("p1"), "dirty", "")).await.unwrap();
        let b = store.add_task(Task::new(id("p1"), "clean", "")).await.unwrap();
        let c = store.add_task(Task::new(id("p1"), "failed", "")).await.unwrap();

        store
            .update_many::<Task, _>(&[b.id.clone()], |t| t.sync.mark_synced(Utc::now()))
            .await
            .unwrap();
        store
            .update_many::<Task, _>(&[c.id.clone()], |t| t.sync.mark_failed("x"))
            .await
            .unwrap();

        let pending = store.get_pending_sync_items().await.unwrap();
        let ids: Vec<_> = pending.tasks.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn test_claim_pending_marks_and_returns_snapshot() {
        let (kv, store) = store();
        let dirty = store.add_task(Task::new(id("p1"), "dirty", "")).await.unwrap();
        let clean = store.add_task(Task::new(id("p1"), "clean", "")).await.unwrap();
        store
            .update_many::<Task, _>(&[clean.id.clone()], |t| t.sync.mark_synced(Utc::now()))
            .await
            .unwrap();

        let claimed: Vec<Task> = store.claim_pending().await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, dirty.id);
        assert_eq!(claimed[0].sync.sync_status, SyncStatus::Syncing);

        let stored: Task = store.get_one(&dirty.id).await.unwrap().unwrap();
        assert_eq!(stored, claimed[0]);
        let untouched: Task = store.get_one(&clean.id).await.unwrap().unwrap();
        assert_eq!(untouched.sync.sync_status, SyncStatus::Synced);

        // An edit after the claim reopens the record
        store
            .update_task(&dirty.id, |t| t.title = "edited".into())
            .await
            .unwrap();
        let reopened: Task = store.get_one(&dirty.id).await.unwrap().unwrap();
        assert_eq!(reopened.sync.sync_status, SyncStatus::Pending);

        // Nothing dirty in evidence: no write
        let writes = kv.write_count();
        let none: Vec<Evidence> = store.claim_pending().await.unwrap();
        assert!(none.is_empty());
        assert_eq!(kv.write_count(), writes);
    }

    #[tokio::test]
    async fn test_add_evidence_attaches_to_task() {
        let (_, store) = store();
        let task = store.add_task(Task::new(id("p1"), "A", "")).await.unwrap();
        let ev = store
            .add_evidence(Evidence::new(task.id.clone(), EvidenceType::Photo, "a.jpg", "/a.jpg"))
            .await
            .unwrap();

        let stored: Task = store.get_one(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.evidence, Some(vec![ev.id.clone()]));
        assert_eq!(store.get_evidence(Some(&task.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_evidence_for_unknown_task() {
        let (_, store) = store();
        let ev = store
            .add_evidence(Evidence::new(id("ghost"), EvidenceType::File, "f", "/f"))
            .await
            .unwrap();
        assert_eq!(store.get_evidence(None).await.unwrap(), vec![ev]);
    }

    #[tokio::test]
    async fn test_mark_dirty_inserts_or_updates() {
        let (_, store) = store();
        let mut task = Task::new(id("p1"), "external", "");
        task.sync.mark_synced(Utc::now());

        let marked = store.mark_dirty(task.clone()).await.unwrap();
        assert!(marked.sync.needs_sync);
        assert!(marked.sync.is_offline);

        // Second call is a no-op on the persisted state
        store.mark_dirty(task).await.unwrap();
        let all = store.get_tasks(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sync.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_sync_queue_reads_default_until_first_update() {
        let (kv, store) = store();
        assert_eq!(store.get_sync_queue().await.unwrap(), SyncQueue::default());
        assert_eq!(kv.write_count(), 0);
        assert!(kv.get(Collection::SyncQueue.key()).await.unwrap().is_none());

        store.update_sync_queue(|_| {}).await.unwrap();
        assert!(kv.get(Collection::SyncQueue.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_sync_timestamp() {
        let (_, store) = store();
        assert!(store.get_last_sync_timestamp().await.unwrap().is_none());
        let now = Utc::now();
        store.set_last_sync_timestamp(now).await.unwrap();
        assert_eq!(store.get_last_sync_timestamp().await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn test_read_failure_policy() {
        let (kv, store) = store();
        store.add_task(Task::new(id("p1"), "A", "")).await.unwrap();

        kv.fail_reads(true);
        assert!(matches!(store.get_tasks(None).await, Err(Error::Storage(_))));

        let lenient = store.read_all_lenient::<Task>(None).await;
        assert!(lenient.is_degraded());
        assert!(lenient.value.is_empty());
        assert!(store.last_sync_timestamp_lenient().await.is_degraded());

        // A read-modify-write refuses to proceed rather than persisting an empty list
        let result = store.add_task(Task::new(id("p1"), "B", "")).await;
        assert!(result.is_err());

        kv.fail_reads(false);
        assert_eq!(store.get_tasks(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let (kv, store) = store();
        kv.fail_writes(true);
        assert!(matches!(
            store.add_project(Project::new("Site", "")).await,
            Err(Error::Storage(_))
        ));
        assert!(store.set_last_sync_timestamp(Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_collection_is_an_error() {
        let (kv, store) = store();
        kv.set("tasks", "{not json".to_string()).await.unwrap();
        assert!(matches!(
            store.get_tasks(None).await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_not_lost() {
        let (_, store) = store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add_task(Task::new(id("p1"), format!("task {}", i), ""))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get_tasks(None).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_update_project() {
        let (_, store) = store();
        let project = store.add_project(Project::new("Site", "")).await.unwrap();
        let updated = store
            .update_project(&project.id, |p| p.set_progress(150))
            .await
            .unwrap();
        assert_eq!(updated.progress, 100);
        assert_eq!(store.get_projects().await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn test_queue_item_indexes_evidence_once() {
        let (_, store) = store();
        let mut evidence = Evidence::new(id("t1"), EvidenceType::File, "log.txt", "/log.txt");
        evidence.sync.mark_synced(Utc::now());
        let task = Task::new(id("p1"), "Queued directly", "");

        store.queue_item(evidence.clone().into()).await.unwrap();
        let queued = store.queue_item(evidence.clone().into()).await.unwrap();
        store.queue_item(task.clone().into()).await.unwrap();

        assert_eq!(queued.sync().sync_status, SyncStatus::Pending);
        assert!(queued.sync().needs_sync);
        let queue = store.get_sync_queue().await.unwrap();
        assert_eq!(queue.queued_evidence, vec![evidence.id.clone()]);
        let pending = store.get_pending_sync_items().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.tasks[0].id, task.id);
    }
}
