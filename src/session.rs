#![forbid(unsafe_code)]

//! Per-user session records.
//!
//! A [`SessionState`] belongs to exactly one browser session and is only ever
//! mutated through the lifecycle manager. The [`SessionStore`] maps session
//! ids to their state for the HTTP layer.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use crate::media::{AnalysisResult, MediaKind, PreparedFile};
use crate::platform::Platform;
use crate::progress::ProgressEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Analyzing,
    Analyzed,
    Preparing,
    Prepared,
}

/// Analysis plus the one file currently prepared for the session.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) analysis: Option<AnalysisResult>,
    pub(crate) source_url: String,
    pub(crate) platform: Option<Platform>,
    pub(crate) prepared: Option<PreparedFile>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            analysis: None,
            source_url: String::new(),
            platform: None,
            prepared: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    /// URL the current analysis was produced from; empty when idle.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn prepared(&self) -> Option<&PreparedFile> {
        self.prepared.as_ref()
    }

    /// Phase to fall back to once an in-flight operation ends.
    pub(crate) fn settled_phase(&self) -> SessionPhase {
        match (&self.analysis, &self.prepared) {
            (_, Some(_)) => SessionPhase::Prepared,
            (Some(_), None) => SessionPhase::Analyzed,
            (None, None) => SessionPhase::Idle,
        }
    }
}

/// Latest progress of a session, readable without taking the session lock.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SessionHandle {
    id: Uuid,
    state: Mutex<SessionState>,
    activity: Mutex<Activity>,
    last_seen: Mutex<Instant>,
}

impl SessionHandle {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::new()),
            activity: Mutex::new(Activity::default()),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session's state. Held for the whole duration of analyze/prepare,
    /// which makes each session a single logical worker.
    pub fn state(&self) -> &Mutex<SessionState> {
        &self.state
    }

    pub fn activity(&self) -> Activity {
        self.activity.lock().clone()
    }

    pub fn set_activity(&self, activity: Activity) {
        *self.activity.lock() = activity;
    }

    pub fn update_activity(&self, update: impl FnOnce(&mut Activity)) {
        update(&mut self.activity.lock());
    }

    fn touch(&self, now: Instant) {
        *self.last_seen.lock() = now;
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }
}

/// All live sessions, keyed by the id kept in the browser cookie.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `id`, creating a fresh one when the id is
    /// missing or unknown. The boolean is `true` when a session was created.
    pub fn resolve(&self, id: Option<Uuid>) -> (Arc<SessionHandle>, bool) {
        let now = Instant::now();
        if let Some(id) = id
            && let Some(handle) = self.sessions.read().get(&id).cloned()
        {
            handle.touch(now);
            return (handle, false);
        }

        let id = Uuid::new_v4();
        let handle = Arc::new(SessionHandle::new(id));
        self.sessions.write().insert(id, handle.clone());
        (handle, true)
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detaches sessions idle for at least `idle`. Sessions with an operation
    /// in flight are kept. The caller is expected to reset what is returned so
    /// their files are deleted.
    ///
    /// A request that resolved a handle just before this call can still
    /// prepare into the detached session after the reset. Nobody resets that
    /// file again; the TTL sweep removes it.
    pub fn take_idle(&self, idle: Duration, now: Instant) -> Vec<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write();
        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|handle| handle.idle_for(now) >= idle && !handle.state.is_locked())
            .map(|handle| handle.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }
}
