//! Session: a work context within a Project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::{ProjectId, SessionId};
use super::tool::ToolConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
    Completed,
}

/// Session-level configuration. May override the project's working
/// directory and carries environment variables and tool policies that
/// take precedence over the owning project's (§4.D).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfiguration {
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub tools: ToolConfiguration,
}

/// A work context owning Threads. Configuration may override the
/// project's working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub configuration: SessionConfiguration,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            project_id,
            name: name.into(),
            description: None,
            configuration: SessionConfiguration::default(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRegistry {
    pub sessions: Vec<Session>,
}
