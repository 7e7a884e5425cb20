//! The Event Store (§4.A): durable append-only persistence of Projects,
//! Sessions, Threads, and Events, plus the derived-query support the
//! Thread Manager and Approval Coordinator need.
//!
//! `EventStore` is a trait rather than one concrete type so that the
//! "disabled" ephemeral mode (§4.A, §8) is an explicit alternate
//! implementation — `NullEventStore` — rather than an `Option<Store>`
//! threaded through every call site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::model::{
    ApprovalDecision, CallId, Event, EventPayload, PendingApproval, Project, ProjectId,
    ProjectRegistry, Session, SessionId, SessionRegistry, Thread, ThreadId, ThreadView,
};

const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaVersion {
    version: u32,
    applied_at: DateTime<Utc>,
}

/// Durable, crash-consistent storage of the Core's domain objects.
/// Single-writer per process; readers see a consistent snapshot.
pub trait EventStore: Send + Sync {
    fn save_project(&self, project: &Project) -> Result<(), StoreError>;
    fn load_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError>;
    fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
    fn update_project(&self, project: &Project) -> Result<(), StoreError>;
    fn delete_project(&self, id: &ProjectId) -> Result<(), StoreError>;

    fn save_session(&self, session: &Session) -> Result<(), StoreError>;
    fn load_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;
    fn load_sessions_by_project(&self, project_id: &ProjectId) -> Result<Vec<Session>, StoreError>;
    fn update_session(&self, session: &Session) -> Result<(), StoreError>;
    fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;

    fn save_thread(&self, thread: &Thread) -> Result<(), StoreError>;
    fn load_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError>;
    fn delete_thread(&self, id: &ThreadId) -> Result<(), StoreError>;
    fn list_threads_by_session(&self, session_id: &SessionId) -> Result<Vec<Thread>, StoreError>;

    fn append_event(&self, thread_id: &ThreadId, payload: EventPayload) -> Result<Event, StoreError>;
    fn load_events(&self, thread_id: &ThreadId) -> Result<Vec<Event>, StoreError>;

    fn get_pending_approvals(&self, thread_ids: &[ThreadId]) -> Result<Vec<PendingApproval>, StoreError>;
    fn get_approval_decision(
        &self,
        thread_id: &ThreadId,
        call_id: &CallId,
    ) -> Result<Option<ApprovalDecision>, StoreError>;
}

/// Write-then-rename, the atomic-write pattern used throughout the
/// persistence layer: a crash mid-write leaves the previous file intact.
fn atomic_write(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// JSONL-file Event Store: one append-only `{thread_id}.jsonl` file per
/// thread, `projects.json` and per-project `sessions/{project_id}.json`
/// registries written with the atomic write-then-rename pattern.
pub struct JsonlEventStore {
    base_dir: PathBuf,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonlEventStore {
    /// Open (creating if needed) a store rooted at `base_dir`, running
    /// schema migrations at open time (§4.A: forward-only, idempotent).
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        let store = Self {
            base_dir,
            thread_locks: Mutex::new(HashMap::new()),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let path = self.base_dir.join("schema_version.json");
        let current: Option<SchemaVersion> = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            Some(serde_json::from_str(&contents)?)
        } else {
            None
        };

        let version = current.map(|v| v.version).unwrap_or(0);
        if version < CURRENT_SCHEMA_VERSION {
            let record = SchemaVersion {
                version: CURRENT_SCHEMA_VERSION,
                applied_at: Utc::now(),
            };
            atomic_write(&path, &serde_json::to_string_pretty(&record)?)?;
            log::info!("event store schema migrated to version {CURRENT_SCHEMA_VERSION}");
        }
        Ok(())
    }

    fn projects_path(&self) -> PathBuf {
        self.base_dir.join("projects.json")
    }

    fn sessions_path(&self, project_id: &ProjectId) -> PathBuf {
        self.base_dir.join("sessions").join(format!("{project_id}.json"))
    }

    fn thread_header_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.base_dir.join("threads").join(format!("{thread_id}.json"))
    }

    fn thread_events_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.base_dir.join("threads").join(format!("{thread_id}.jsonl"))
    }

    fn lock_for(&self, thread_id: &ThreadId) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().unwrap();
        locks
            .entry(thread_id.0.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_project_registry(&self) -> Result<ProjectRegistry, StoreError> {
        let path = self.projects_path();
        if !path.exists() {
            return Ok(ProjectRegistry::default());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_project_registry(&self, registry: &ProjectRegistry) -> Result<(), StoreError> {
        atomic_write(&self.projects_path(), &serde_json::to_string_pretty(registry)?)
    }

    fn load_session_registry(&self, project_id: &ProjectId) -> Result<SessionRegistry, StoreError> {
        let path = self.sessions_path(project_id);
        if !path.exists() {
            return Ok(SessionRegistry::default());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_session_registry(
        &self,
        project_id: &ProjectId,
        registry: &SessionRegistry,
    ) -> Result<(), StoreError> {
        atomic_write(&self.sessions_path(project_id), &serde_json::to_string_pretty(registry)?)
    }
}

impl EventStore for JsonlEventStore {
    fn save_project(&self, project: &Project) -> Result<(), StoreError> {
        let mut registry = self.load_project_registry()?;
        registry.projects.retain(|p| p.id != project.id);
        registry.projects.push(project.clone());
        self.save_project_registry(&registry)
    }

    fn load_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let registry = self.load_project_registry()?;
        Ok(registry.projects.into_iter().find(|p| &p.id == id))
    }

    fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.load_project_registry()?.projects)
    }

    fn update_project(&self, project: &Project) -> Result<(), StoreError> {
        self.save_project(project)
    }

    fn delete_project(&self, id: &ProjectId) -> Result<(), StoreError> {
        // Cascade before removing the project from the registry: `delete_session`
        // locates a session's owning project via `load_session`, which scans
        // `list_projects`.
        for session in self.load_sessions_by_project(id)? {
            self.delete_session(&session.id)?;
        }
        let _ = fs::remove_file(self.sessions_path(id));

        let mut registry = self.load_project_registry()?;
        registry.projects.retain(|p| &p.id != id);
        self.save_project_registry(&registry)
    }

    fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut registry = self.load_session_registry(&session.project_id)?;
        registry.sessions.retain(|s| s.id != session.id);
        registry.sessions.push(session.clone());
        self.save_session_registry(&session.project_id, &registry)
    }

    fn load_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        for project in self.list_projects()? {
            let registry = self.load_session_registry(&project.id)?;
            if let Some(session) = registry.sessions.into_iter().find(|s| &s.id == id) {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    fn load_sessions_by_project(&self, project_id: &ProjectId) -> Result<Vec<Session>, StoreError> {
        Ok(self.load_session_registry(project_id)?.sessions)
    }

    fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        self.save_session(session)
    }

    fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        if let Some(session) = self.load_session(id)? {
            let mut registry = self.load_session_registry(&session.project_id)?;
            registry.sessions.retain(|s| &s.id != id);
            self.save_session_registry(&session.project_id, &registry)?;

            for thread in self.list_threads_by_session(id)? {
                self.delete_thread(&thread.id)?;
            }
        }
        Ok(())
    }

    fn save_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        atomic_write(
            &self.thread_header_path(&thread.id),
            &serde_json::to_string_pretty(thread)?,
        )
    }

    fn load_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        let path = self.thread_header_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn delete_thread(&self, id: &ThreadId) -> Result<(), StoreError> {
        let _ = fs::remove_file(self.thread_header_path(id));
        let _ = fs::remove_file(self.thread_events_path(id));
        Ok(())
    }

    fn list_threads_by_session(&self, session_id: &SessionId) -> Result<Vec<Thread>, StoreError> {
        let dir = self.base_dir.join("threads");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut threads = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            let thread: Thread = serde_json::from_str(&contents)?;
            if thread.session_id.as_ref() == Some(session_id) {
                threads.push(thread);
            }
        }
        Ok(threads)
    }

    fn append_event(&self, thread_id: &ThreadId, payload: EventPayload) -> Result<Event, StoreError> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().unwrap();

        if self.load_thread(thread_id)?.is_none() {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }

        let event = Event::new(thread_id.clone(), Utc::now(), payload);
        let line = serde_json::to_string(&event)?;

        let path = self.thread_events_path(thread_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;

        if let Some(mut thread) = self.load_thread(thread_id)? {
            thread.updated_at = event.timestamp;
            self.save_thread(&thread)?;
        }

        log::debug!("appended event {} to thread {thread_id}", event.id);
        Ok(event)
    }

    fn load_events(&self, thread_id: &ThreadId) -> Result<Vec<Event>, StoreError> {
        let path = self.thread_events_path(thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    fn get_pending_approvals(&self, thread_ids: &[ThreadId]) -> Result<Vec<PendingApproval>, StoreError> {
        let mut all = Vec::new();
        for thread_id in thread_ids {
            let events = self.load_events(thread_id)?;
            let view = ThreadView::replay(thread_id, events);
            all.extend(view.pending_approvals);
        }
        all.sort_by_key(|a| a.requested_at);
        Ok(all)
    }

    fn get_approval_decision(
        &self,
        thread_id: &ThreadId,
        call_id: &CallId,
    ) -> Result<Option<ApprovalDecision>, StoreError> {
        let events = self.load_events(thread_id)?;
        Ok(events.into_iter().find_map(|event| match event.payload {
            EventPayload::ToolApprovalResponse {
                call_id: id,
                decision,
            } if &id == call_id => Some(decision),
            _ => None,
        }))
    }
}

/// An explicit disabled/ephemeral store (§4.A, §8): reads return empty,
/// writes are silent no-ops. Used for tests and ephemeral sessions where
/// nothing should hit disk.
#[derive(Debug, Default)]
pub struct NullEventStore;

impl EventStore for NullEventStore {
    fn save_project(&self, _project: &Project) -> Result<(), StoreError> {
        Ok(())
    }
    fn load_project(&self, _id: &ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(None)
    }
    fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(Vec::new())
    }
    fn update_project(&self, _project: &Project) -> Result<(), StoreError> {
        Ok(())
    }
    fn delete_project(&self, _id: &ProjectId) -> Result<(), StoreError> {
        Ok(())
    }
    fn save_session(&self, _session: &Session) -> Result<(), StoreError> {
        Ok(())
    }
    fn load_session(&self, _id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(None)
    }
    fn load_sessions_by_project(&self, _project_id: &ProjectId) -> Result<Vec<Session>, StoreError> {
        Ok(Vec::new())
    }
    fn update_session(&self, _session: &Session) -> Result<(), StoreError> {
        Ok(())
    }
    fn delete_session(&self, _id: &SessionId) -> Result<(), StoreError> {
        Ok(())
    }
    fn save_thread(&self, _thread: &Thread) -> Result<(), StoreError> {
        Ok(())
    }
    fn load_thread(&self, _id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        Ok(None)
    }
    fn delete_thread(&self, _id: &ThreadId) -> Result<(), StoreError> {
        Ok(())
    }
    fn list_threads_by_session(&self, _session_id: &SessionId) -> Result<Vec<Thread>, StoreError> {
        Ok(Vec::new())
    }
    fn append_event(&self, thread_id: &ThreadId, payload: EventPayload) -> Result<Event, StoreError> {
        Ok(Event::new(thread_id.clone(), Utc::now(), payload))
    }
    fn load_events(&self, _thread_id: &ThreadId) -> Result<Vec<Event>, StoreError> {
        Ok(Vec::new())
    }
    fn get_pending_approvals(&self, _thread_ids: &[ThreadId]) -> Result<Vec<PendingApproval>, StoreError> {
        Ok(Vec::new())
    }
    fn get_approval_decision(
        &self,
        _thread_id: &ThreadId,
        _call_id: &CallId,
    ) -> Result<Option<ApprovalDecision>, StoreError> {
        Ok(None)
    }
}
