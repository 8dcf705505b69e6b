//! Request sessions.
//!
//! A [`Session`] is loaded before components are built and saved after
//! `dispatch_complete`. Stores only persist sessions that changed.

use std::str::FromStr;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::ids::SessionId;
use crate::server::{Request, Response};

/// Key/value state carried across requests from one client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: Option<SessionId>,
    data: Map<String, Value>,
    dirty: bool,
}

impl Session {
    pub fn new(id: Option<SessionId>, data: Map<String, Value>) -> Self {
        Self {
            id,
            data,
            dirty: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Remove and return a value; used for one-shot entries such as flashes.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.remove(key)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

/// Session persistence.
pub trait SessionStore: Send + Sync {
    fn load(&self, request: &Request) -> Session;

    /// Persist a changed session and attach whatever the client needs
    /// (a cookie) to `response`.
    fn save(&self, session: &mut Session, response: &mut Response);
}

/// In-process store keyed by a ULID cookie.
///
/// Meant for demos and tests: entries live until they are emptied, nothing
/// expires, and state is lost on restart. A session whose last key is
/// removed (a consumed flash, say) is dropped from the map.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, Map<String, Value>>,
    cookie_name: String,
}

impl MemorySessionStore {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, request: &Request) -> Session {
        let id = request
            .cookie(&self.cookie_name)
            .and_then(|raw| SessionId::from_str(raw).ok());
        match id {
            Some(id) => match self.sessions.get(&id) {
                Some(data) => Session::new(Some(id), data.value().clone()),
                // Unknown id: start over with a fresh one on save.
                None => Session::default(),
            },
            None => Session::default(),
        }
    }

    fn save(&self, session: &mut Session, response: &mut Response) {
        if !session.is_dirty() {
            return;
        }
        session.dirty = false;
        if session.data.is_empty() {
            if let Some(id) = session.id {
                self.sessions.remove(&id);
                debug!(session_id = %id, "Empty session dropped");
            }
            return;
        }
        let (id, is_new) = match session.id {
            Some(id) => (id, false),
            None => (SessionId::new(), true),
        };
        self.sessions.insert(id, session.data.clone());
        session.id = Some(id);
        if is_new {
            response.append_header(
                "set-cookie",
                &format!(
                    "{}={id}; Path=/; HttpOnly; SameSite=Lax",
                    self.cookie_name
                ),
            );
        }
        debug!(session_id = %id, new = is_new, "Session saved");
    }
}
