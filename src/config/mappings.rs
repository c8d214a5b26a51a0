//! Project → group mapping
//!
//! The mapping file names Redmine projects by identifier and event groups by
//! name:
//!
//! ```yaml
//! projects:
//!   kultur: Kulturgruppe
//!   sport: Sportverein
//! ```
//!
//! Both sides are resolved to ids once per run. A name that does not resolve
//! aborts the run.

use crate::integrations::IssueSource;
use crate::model::{GroupId, ProjectId};
use crate::storage::EventStore;
use crate::{EventSyncError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// The mapping file as written by the operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFile {
    /// Redmine project identifier → event group name
    #[serde(default)]
    pub projects: BTreeMap<String, String>,
}

impl MappingFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(EventSyncError::Config(format!(
                "Mapping file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let file: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            path = %path.display(),
            projects = file.projects.len(),
            "Loaded project mappings"
        );

        Ok(file)
    }

    /// Resolve every entry to ids
    ///
    /// Fails on the first project or group that does not exist.
    pub async fn resolve(
        &self,
        source: &dyn IssueSource,
        store: &dyn EventStore,
    ) -> Result<ProjectMapping> {
        let mut mapping = ProjectMapping::default();

        for (identifier, group_name) in &self.projects {
            let project = source
                .find_project_by_identifier(identifier)
                .await?
                .ok_or_else(|| EventSyncError::UnknownProject(identifier.clone()))?;

            let group = store
                .find_group_by_name(group_name)?
                .ok_or_else(|| EventSyncError::UnknownGroup(group_name.clone()))?;

            tracing::debug!(
                project = %identifier,
                project_id = %project.id,
                group = %group_name,
                group_id = %group,
                "Resolved project mapping"
            );

            mapping.insert(project.id, group);
        }

        Ok(mapping)
    }
}

/// Resolved project id → group id function
///
/// There is no default group: an absent project has no mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMapping {
    groups: HashMap<ProjectId, GroupId>,
}

impl ProjectMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_for(&self, project: ProjectId) -> Option<GroupId> {
        self.groups.get(&project).copied()
    }

    pub fn insert(&mut self, project: ProjectId, group: GroupId) {
        self.groups.insert(project, group);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FromIterator<(ProjectId, GroupId)> for ProjectMapping {
    fn from_iter<T: IntoIterator<Item = (ProjectId, GroupId)>>(iter: T) -> Self {
        Self {
            groups: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_mapping_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "projects:\n  kultur: Kulturgruppe\n  sport: Sportverein").unwrap();

        let mapping = MappingFile::load(file.path()).unwrap();
        assert_eq!(mapping.projects.len(), 2);
        assert_eq!(mapping.projects["kultur"], "Kulturgruppe");
    }

    #[test]
    fn test_load_missing_mapping_file() {
        assert!(MappingFile::load("/nonexistent/mappings.yaml").is_err());
    }

    #[test]
    fn test_group_lookup() {
        let mapping: ProjectMapping = [(ProjectId(7), GroupId(3))].into_iter().collect();
        assert_eq!(mapping.group_for(ProjectId(7)), Some(GroupId(3)));
        assert_eq!(mapping.group_for(ProjectId(8)), None);
        assert_eq!(mapping.len(), 1);
    }
}
