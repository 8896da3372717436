use std::{collections::HashMap, sync::Mutex};

use serde::Serialize;
use time::OffsetDateTime;

use crate::types::{CognitiveTask, SessionId, TaskContext, TaskType};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub task_type: TaskType,
    pub context: TaskContext,
    pub models: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed_at: OffsetDateTime,
    pub access_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTouch {
    Created,
    Refreshed,
}

/// In-memory session table. Sessions live until `evict` or process exit.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session from `task` on first sight; afterwards only the
    /// access bookkeeping changes, the original snapshot is kept.
    pub fn touch_or_insert(&self, session_id: &str, task: &CognitiveTask) -> SessionTouch {
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.lock().expect("lock poisoned");
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.last_accessed_at = now;
                session.access_count = session.access_count.saturating_add(1);
                SessionTouch::Refreshed
            }
            None => {
                sessions.insert(
                    session_id.to_string(),
                    Session {
                        session_id: session_id.to_string(),
                        task_type: task.task_type,
                        context: task.context.clone(),
                        models: task.models.clone(),
                        created_at: now,
                        last_accessed_at: now,
                        access_count: 1,
                    },
                );
                SessionTouch::Created
            }
        }
    }

    /// Refreshes an existing session; returns false when it is unknown.
    pub fn touch(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().expect("lock poisoned");
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.last_accessed_at = OffsetDateTime::now_utc();
                session.access_count = session.access_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .expect("lock poisoned")
            .get(session_id)
            .cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("lock poisoned")
            .contains_key(session_id)
    }

    pub fn evict(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .expect("lock poisoned")
            .remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|lhs, rhs| {
            lhs.created_at
                .cmp(&rhs.created_at)
                .then_with(|| lhs.session_id.cmp(&rhs.session_id))
        });
        sessions
    }
}
