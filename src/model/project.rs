//! Project: the long-lived container at the top of the ownership tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ProjectId;
use super::tool::ToolConfiguration;

/// A long-lived container owning Sessions. Deleting a Project cascades to
/// its Sessions (and transitively their Threads).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub working_directory: String,
    #[serde(default)]
    pub configuration: ToolConfiguration,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, working_directory: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            name: name.into(),
            description: None,
            working_directory: working_directory.into(),
            configuration: ToolConfiguration::default(),
            is_archived: false,
            created_at: now,
            last_used_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRegistry {
    pub projects: Vec<Project>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_starts_unarchived() {
        let project = Project::new("demo", "/p");
        assert!(!project.is_archived);
        assert_eq!(project.working_directory, "/p");
    }

    #[test]
    fn serializes_camel_case_fields() {
        let project = Project::new("demo", "/p");
        let json = serde_json::to_string(&project).unwrap();
        assert!(json.contains("workingDirectory"));
        assert!(json.contains("isArchived"));
    }
}
