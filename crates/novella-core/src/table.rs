//! Table of live projects
//!
//! Each project sits behind its own async mutex, so many projects run in
//! parallel while each one stays single-writer.

use crate::project::NarrativeProject;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one project
pub type ProjectHandle = Arc<Mutex<NarrativeProject>>;

/// Projects by id
#[derive(Debug, Default)]
pub struct ProjectTable {
    projects: DashMap<String, ProjectHandle>,
}

impl ProjectTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a project, returning its handle; an existing id is replaced
    pub fn insert(&self, project: NarrativeProject) -> ProjectHandle {
        let id = project.id.clone();
        let handle = Arc::new(Mutex::new(project));
        self.projects.insert(id, Arc::clone(&handle));
        handle
    }

    /// Handle by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ProjectHandle> {
        self.projects.get(id).map(|h| Arc::clone(h.value()))
    }

    /// Remove by id
    pub fn remove(&self, id: &str) -> Option<ProjectHandle> {
        self.projects.remove(id).map(|(_, h)| h)
    }

    /// Ids of every project, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.projects.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str) -> NarrativeProject {
        let mut project = NarrativeProject::default();
        project.id = id.into();
        project
    }

    #[tokio::test]
    async fn projects_lock_independently() {
        let table = ProjectTable::new();
        table.insert(project("a"));
        table.insert(project("b"));

        let a = table.get("a").unwrap();
        let _held = a.lock().await;
        let b = table.get("b").unwrap();
        assert!(b.try_lock().is_ok());
        assert!(a.try_lock().is_err());
        assert_eq!(table.ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn remove_drops_the_entry() {
        let table = ProjectTable::new();
        table.insert(project("a"));
        assert!(table.remove("a").is_some());
        assert!(table.is_empty());
    }
}
