//! Case-insensitive project search for the allocation editor.

use crate::model::Project;

/// Project list with pre-lowered search keys.
///
/// Filtering returns indices into the original list so callers can keep a
/// cheap candidate vector between keystrokes.
#[derive(Debug, Clone, Default)]
pub struct ProjectIndex {
    projects: Vec<Project>,
    keys: Vec<String>,
}

impl ProjectIndex {
    pub fn new(projects: Vec<Project>) -> Self {
        let keys = projects.iter().map(|p| p.name.to_lowercase()).collect();
        Self { projects, keys }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, index: usize) -> Option<&Project> {
        self.projects.get(index)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Every index, in list order.
    pub fn all(&self) -> Vec<usize> {
        (0..self.projects.len()).collect()
    }

    /// Indices of projects whose name contains `query`, ignoring case.
    ///
    /// The empty query matches everything. Order follows the project list.
    pub fn filter(&self, query: &str) -> Vec<usize> {
        if query.is_empty() {
            return self.all();
        }
        let needle = query.to_lowercase();
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key.contains(&needle))
            .map(|(idx, _)| idx)
            .collect()
    }
}
