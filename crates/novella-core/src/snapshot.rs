//! Stage snapshots and their persistence
//!
//! A snapshot is taken after every stage attempt, whatever the verdict.
//! Snapshots of a project form an append-only sequence; resume reads the
//! latest one.
//!
//! Records are forward-readable: unknown fields are ignored and missing
//! fields take their defaults.

use crate::error::SnapshotError;
use crate::project::NarrativeProject;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use novella_gate::QualityReport;
use novella_kernel::state_machine::StageState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema version written by this build
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Immutable record of one stage attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSnapshot {
    pub schema_version: u32,
    /// Position in the project's snapshot sequence (1-based)
    pub sequence: u64,
    pub project_id: String,
    pub stage_index: usize,
    pub stage: String,
    pub attempt: u32,
    /// Taken while re-entering earlier stages for repair
    pub repair: bool,
    pub timestamp: DateTime<Utc>,
    /// Stage state after the attempt
    pub state: StageState,
    pub project: NarrativeProject,
    pub report: Option<QualityReport>,
}

impl Default for StageSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            sequence: 0,
            project_id: String::new(),
            stage_index: 0,
            stage: String::new(),
            attempt: 0,
            repair: false,
            timestamp: DateTime::<Utc>::default(),
            state: StageState::default(),
            project: NarrativeProject::default(),
            report: None,
        }
    }
}

impl StageSnapshot {
    /// Encode as JSON
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON. Records from newer schemas are read best-effort.
    ///
    /// # Errors
    /// Malformed JSON.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(text)?;
        if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
            tracing::warn!(
                found = snapshot.schema_version,
                supported = SNAPSHOT_SCHEMA_VERSION,
                sequence = snapshot.sequence,
                "Reading snapshot from a newer schema"
            );
        }
        Ok(snapshot)
    }
}

/// Persistence collaborator
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Append a snapshot
    async fn save_snapshot(&self, project_id: &str, snapshot: &StageSnapshot) -> Result<(), SnapshotError>;

    /// Most recent snapshot of the project
    async fn load_latest_snapshot(&self, project_id: &str) -> Result<StageSnapshot, SnapshotError>;

    /// Every snapshot of the project, oldest first
    async fn list_snapshots(&self, project_id: &str) -> Result<Vec<StageSnapshot>, SnapshotError>;
}

fn check_id(project_id: &str) -> Result<(), SnapshotError> {
    let ok = !project_id.is_empty()
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !project_id.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(SnapshotError::InvalidProjectId(project_id.to_string()))
    }
}

/// In-memory store, one sequence per project
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<String, Vec<StageSnapshot>>,
}

impl MemorySnapshotStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots held for a project
    #[must_use]
    pub fn count(&self, project_id: &str) -> usize {
        self.snapshots.get(project_id).map_or(0, |s| s.len())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_snapshot(&self, project_id: &str, snapshot: &StageSnapshot) -> Result<(), SnapshotError> {
        check_id(project_id)?;
        self.snapshots
            .entry(project_id.to_string())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn load_latest_snapshot(&self, project_id: &str) -> Result<StageSnapshot, SnapshotError> {
        self.snapshots
            .get(project_id)
            .and_then(|s| s.last().cloned())
            .ok_or_else(|| SnapshotError::NotFound(project_id.to_string()))
    }

    async fn list_snapshots(&self, project_id: &str) -> Result<Vec<StageSnapshot>, SnapshotError> {
        Ok(self
            .snapshots
            .get(project_id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }
}

/// JSON files under `<root>/<project_id>/<sequence>.json`
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Store rooted at `root`; directories are created on first save
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf, SnapshotError> {
        check_id(project_id)?;
        Ok(self.root.join(project_id))
    }

    /// Snapshot files of a project, oldest first
    async fn files(&self, project_id: &str) -> Result<Vec<PathBuf>, SnapshotError> {
        let dir = self.project_dir(project_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        // zero-padded names sort in sequence order
        files.sort();
        Ok(files)
    }

    async fn read(path: &Path) -> Result<StageSnapshot, SnapshotError> {
        let text = tokio::fs::read_to_string(path).await?;
        StageSnapshot::from_json(&text)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save_snapshot(&self, project_id: &str, snapshot: &StageSnapshot) -> Result<(), SnapshotError> {
        let dir = self.project_dir(project_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let name = format!("{:020}.json", snapshot.sequence);
        let tmp = dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, snapshot.to_json()?).await?;
        tokio::fs::rename(&tmp, dir.join(&name)).await?;
        tracing::debug!(project = project_id, sequence = snapshot.sequence, "Snapshot written");
        Ok(())
    }

    async fn load_latest_snapshot(&self, project_id: &str) -> Result<StageSnapshot, SnapshotError> {
        let files = self.files(project_id).await?;
        let latest = files
            .last()
            .ok_or_else(|| SnapshotError::NotFound(project_id.to_string()))?;
        Self::read(latest).await
    }

    async fn list_snapshots(&self, project_id: &str) -> Result<Vec<StageSnapshot>, SnapshotError> {
        let mut snapshots = Vec::new();
        for path in self.files(project_id).await? {
            snapshots.push(Self::read(&path).await?);
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::project::{PlannedUnit, StoryPlan};

    fn snapshot(sequence: u64) -> StageSnapshot {
        let plan = StoryPlan::new([PlannedUnit::new(0, "opening")]);
        StageSnapshot {
            sequence,
            project_id: "veil".into(),
            stage: "draft".into(),
            attempt: 1,
            timestamp: Utc::now(),
            project: NarrativeProject::new("veil", "The Veil", plan, &PipelineConfig::default()),
            ..StageSnapshot::default()
        }
    }

    #[tokio::test]
    async fn memory_store_returns_latest() {
        let store = MemorySnapshotStore::new();
        store.save_snapshot("veil", &snapshot(1)).await.unwrap();
        store.save_snapshot("veil", &snapshot(2)).await.unwrap();

        assert_eq!(store.load_latest_snapshot("veil").await.unwrap().sequence, 2);
        assert_eq!(store.list_snapshots("veil").await.unwrap().len(), 2);
        assert!(matches!(
            store.load_latest_snapshot("other").await,
            Err(SnapshotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn file_store_orders_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        for seq in [2, 10, 1] {
            store.save_snapshot("veil", &snapshot(seq)).await.unwrap();
        }

        let all = store.list_snapshots("veil").await.unwrap();
        assert_eq!(all.iter().map(|s| s.sequence).collect::<Vec<_>>(), vec![1, 2, 10]);
        let latest = store.load_latest_snapshot("veil").await.unwrap();
        assert_eq!(latest, all[2]);
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        for id in ["../escape", "a/b", "", ".hidden"] {
            assert!(matches!(
                store.save_snapshot(id, &snapshot(1)).await,
                Err(SnapshotError::InvalidProjectId(_))
            ));
        }
    }

    #[test]
    fn unknown_fields_ignored_missing_defaulted() {
        let snap = StageSnapshot::from_json(r#"{"sequence": 4, "stage": "polish", "added_later": true}"#)
            .unwrap();
        assert_eq!(snap.sequence, 4);
        assert_eq!(snap.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert!(snap.report.is_none());
    }

    #[test]
    fn newer_schema_is_read_with_extra_fields() {
        let snap = StageSnapshot::from_json(
            r#"{"schema_version": 2, "sequence": 7, "stage": "draft", "new_field": 1}"#,
        )
        .unwrap();
        assert_eq!(snap.schema_version, 2);
        assert_eq!(snap.sequence, 7);
        assert_eq!(snap.stage, "draft");
        assert!(snap.project.scenes().is_empty());
    }
}
