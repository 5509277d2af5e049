//! Persisted domain records and their embedded sync metadata.
//!
//! Records are stored as whole JSON collections, one substrate key per
//! collection. Field names are camelCase on the wire so collections written by
//! other clients of the same store stay readable.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Collection, RecordId};

/// Sync status of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local changes waiting for the next cycle.
    #[default]
    Pending,
    /// Currently part of an in-flight push.
    Syncing,
    /// Remote holds the latest local version.
    Synced,
    /// Last push of this record failed.
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Sync bookkeeping embedded in every task and evidence record.
///
/// `needs_sync` is true whenever the status is `Pending` or `Failed`, and
/// false exactly when the status is `Synced`. `Syncing` keeps `needs_sync`
/// set so an interrupted cycle leaves the record dirty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    #[serde(default)]
    pub is_offline: bool,
    #[serde(default)]
    pub needs_sync: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

impl SyncMetadata {
    /// Metadata for a record created while offline.
    pub fn new_local() -> Self {
        Self {
            is_offline: true,
            needs_sync: true,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            sync_error: None,
        }
    }

    /// Metadata for a record already known to the remote.
    pub fn new_synced(at: DateTime<Utc>) -> Self {
        Self {
            is_offline: false,
            needs_sync: false,
            sync_status: SyncStatus::Synced,
            last_synced_at: Some(at),
            sync_error: None,
        }
    }

    /// Flag the record for the next cycle. Idempotent.
    ///
    /// A `Failed` record keeps its status and error until the next push.
    pub fn mark_dirty(&mut self) {
        self.needs_sync = true;
        self.is_offline = true;
        if matches!(self.sync_status, SyncStatus::Synced | SyncStatus::Syncing) {
            self.sync_status = SyncStatus::Pending;
        }
    }

    /// Mark as part of an in-flight push.
    pub fn mark_syncing(&mut self) {
        self.sync_status = SyncStatus::Syncing;
        self.needs_sync = true;
    }

    /// Mark as synced successfully.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.sync_status = SyncStatus::Synced;
        self.needs_sync = false;
        self.is_offline = false;
        self.last_synced_at = Some(at);
        self.sync_error = None;
    }

    /// Mark as failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.sync_status = SyncStatus::Failed;
        self.needs_sync = true;
        self.sync_error = Some(error.into());
    }

    /// Whether the record belongs to the dirty set.
    pub fn is_dirty(&self) -> bool {
        self.needs_sync || matches!(self.sync_status, SyncStatus::Pending | SyncStatus::Failed)
    }

    /// Whether `needs_sync` agrees with `sync_status`.
    pub fn is_consistent(&self) -> bool {
        match self.sync_status {
            SyncStatus::Synced => !self.needs_sync,
            SyncStatus::Pending | SyncStatus::Failed | SyncStatus::Syncing => self.needs_sync,
        }
    }
}

impl Default for SyncMetadata {
    fn default() -> Self {
        Self::new_local()
    }
}

/// A record persisted in one of the whole-collection keys.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the record lives in.
    const COLLECTION: Collection;

    fn id(&self) -> &RecordId;

    /// Owning record id, used for filtered reads.
    fn owner_id(&self) -> Option<&RecordId>;

    /// Stamp the modification time, if the record carries one.
    fn touch(&mut self, now: DateTime<Utc>);
}

/// A record that carries [`SyncMetadata`].
pub trait Syncable: Record {
    fn sync(&self) -> &SyncMetadata;
    fn sync_mut(&mut self) -> &mut SyncMetadata;
}

/// Domain status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

/// A unit of field work inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub project_id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<RecordId>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sync: SyncMetadata,
}

impl Task {
    /// Create a new pending task, dirty and offline.
    pub fn new(project_id: RecordId, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            project_id,
            title: title.into(),
            description: description.into(),
            due_date: None,
            status: TaskStatus::Pending,
            evidence: None,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::new_local(),
        }
    }

    /// Set the due date.
    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Attach an evidence id, ignoring duplicates.
    pub fn attach_evidence(&mut self, evidence_id: RecordId) {
        let list = self.evidence.get_or_insert_with(Vec::new);
        if !list.contains(&evidence_id) {
            list.push(evidence_id);
        }
    }
}

impl Record for Task {
    const COLLECTION: Collection = Collection::Tasks;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> Option<&RecordId> {
        Some(&self.project_id)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Syncable for Task {
    fn sync(&self) -> &SyncMetadata {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncMetadata {
        &mut self.sync
    }
}

/// Kind of captured evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Photo,
    Document,
    File,
}

impl std::str::FromStr for EvidenceType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "photo" => Ok(EvidenceType::Photo),
            "document" => Ok(EvidenceType::Document),
            "file" => Ok(EvidenceType::File),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown evidence type: {}",
                other
            ))),
        }
    }
}

/// A photo, document or file attached to a task as proof of completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: RecordId,
    pub task_id: RecordId,
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    pub file_name: String,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sync: SyncMetadata,
}

impl Evidence {
    /// Create a new evidence record, dirty and offline.
    pub fn new(
        task_id: RecordId,
        evidence_type: EvidenceType,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            task_id,
            evidence_type,
            file_name: file_name.into(),
            file_path: file_path.into(),
            uploaded_at: Utc::now(),
            sync: SyncMetadata::new_local(),
        }
    }
}

impl Record for Evidence {
    const COLLECTION: Collection = Collection::Evidence;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> Option<&RecordId> {
        Some(&self.task_id)
    }

    // Evidence carries no modification stamp.
    fn touch(&mut self, _now: DateTime<Utc>) {}
}

impl Syncable for Evidence {
    fn sync(&self) -> &SyncMetadata {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncMetadata {
        &mut self.sync
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    OnHold,
    Completed,
}

/// A project grouping field tasks. Persisted but not pushed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ProjectStatus,
    /// Completion percentage, 0..=100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new active project.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            name: name.into(),
            description: description.into(),
            status: ProjectStatus::Active,
            progress: 0,
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set progress, clamped to 100.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> Option<&RecordId> {
        None
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Singleton sync queue record.
///
/// A secondary index only: the dirty set is always derived from the task and
/// evidence collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub queued_evidence: Vec<RecordId>,
}

impl SyncQueue {
    /// Append an evidence id unless already queued.
    pub fn enqueue_evidence(&mut self, id: RecordId) -> bool {
        if self.queued_evidence.contains(&id) {
            return false;
        }
        self.queued_evidence.push(id);
        true
    }

    /// Drop the given ids from the evidence index.
    pub fn dequeue_evidence(&mut self, ids: &[RecordId]) {
        self.queued_evidence.retain(|id| !ids.contains(id));
    }
}

/// The two independently pushed buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Tasks,
    Evidence,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKind::Tasks => f.write_str("tasks"),
            BucketKind::Evidence => f.write_str("evidence"),
        }
    }
}

/// A record that takes part in sync, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncItem {
    Task(Task),
    Evidence(Evidence),
}

impl SyncItem {
    pub fn id(&self) -> &RecordId {
        match self {
            SyncItem::Task(task) => &task.id,
            SyncItem::Evidence(evidence) => &evidence.id,
        }
    }

    pub fn bucket(&self) -> BucketKind {
        match self {
            SyncItem::Task(_) => BucketKind::Tasks,
            SyncItem::Evidence(_) => BucketKind::Evidence,
        }
    }

    pub fn sync(&self) -> &SyncMetadata {
        match self {
            SyncItem::Task(task) => &task.sync,
            SyncItem::Evidence(evidence) => &evidence.sync,
        }
    }
}

impl From<Task> for SyncItem {
    fn from(task: Task) -> Self {
        SyncItem::Task(task)
    }
}

impl From<Evidence> for SyncItem {
    fn from(evidence: Evidence) -> Self {
        SyncItem::Evidence(evidence)
    }
}
