//! In-memory session store.
//!
//! Sessions are created at connect and destroyed at disconnect; the
//! per-session scratchpad and variables are released with the session.

use crate::error::{MeshError, MeshResult};
use crate::types::Value;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::SystemTime;

/// One client session.
pub struct Session {
    id: u64,
    created_at: SystemTime,
    database: RwLock<String>,
    variables: RwLock<HashMap<String, Value>>,
    /// Free-form key/value scratchpad released with the session
    scratchpad: DashMap<String, Value>,
    /// Open explicit transaction: (source name, tx id)
    active_tx: Mutex<Option<(String, u64)>>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn database(&self) -> String {
        self.database.read().clone()
    }

    pub fn use_database(&self, name: impl Into<String>) {
        *self.database.write() = name.into();
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables
            .write()
            .insert(name.into().to_lowercase(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(&name.to_lowercase()).cloned()
    }

    pub fn variables(&self) -> HashMap<String, Value> {
        self.variables.read().clone()
    }

    pub fn scratch_set(&self, key: impl Into<String>, value: Value) {
        self.scratchpad.insert(key.into(), value);
    }

    pub fn scratch_get(&self, key: &str) -> Option<Value> {
        self.scratchpad.get(key).map(|v| v.value().clone())
    }

    pub fn scratch_delete(&self, key: &str) -> bool {
        self.scratchpad.remove(key).is_some()
    }

    /// Record an open transaction. One per session.
    pub fn set_transaction(&self, source: impl Into<String>, tx_id: u64) -> MeshResult<()> {
        let mut tx = self.active_tx.lock();
        if tx.is_some() {
            return Err(MeshError::InvalidArgument(
                "a transaction is already open in this session".to_string(),
            ));
        }
        *tx = Some((source.into(), tx_id));
        Ok(())
    }

    pub fn take_transaction(&self) -> Option<(String, u64)> {
        self.active_tx.lock().take()
    }

    pub fn transaction(&self) -> Option<(String, u64)> {
        self.active_tx.lock().clone()
    }
}

/// Registry of live sessions plus the thread-id → session mapping used by
/// callers that cannot thread a session handle through.
#[derive(Default)]
pub struct SessionStore {
    next_id: AtomicU64,
    sessions: DashMap<u64, Arc<Session>>,
    by_thread: DashMap<ThreadId, u64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(Session {
            id,
            created_at: SystemTime::now(),
            database: RwLock::new("main".to_string()),
            variables: RwLock::new(HashMap::new()),
            scratchpad: DashMap::new(),
            active_tx: Mutex::new(None),
        });
        self.sessions.insert(id, Arc::clone(&session));
        session
    }

    pub fn get_session(&self, id: u64) -> MeshResult<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown session {id}")))
    }

    /// Destroy a session, releasing its scratchpad and thread bindings.
    pub fn destroy_session(&self, id: u64) -> MeshResult<()> {
        let removed = self.sessions.remove(&id);
        self.by_thread.retain(|_, session_id| *session_id != id);
        removed
            .map(|_| ())
            .ok_or_else(|| MeshError::InvalidArgument(format!("unknown session {id}")))
    }

    /// Bind the calling thread to `session_id`.
    pub fn bind_current_thread(&self, session_id: u64) -> MeshResult<()> {
        if !self.sessions.contains_key(&session_id) {
            return Err(MeshError::InvalidArgument(format!(
                "unknown session {session_id}"
            )));
        }
        self.by_thread
            .insert(std::thread::current().id(), session_id);
        Ok(())
    }

    /// Session bound to the calling thread, if any.
    pub fn current_thread_session(&self) -> Option<Arc<Session>> {
        let id = *self.by_thread.get(&std::thread::current().id())?;
        self.sessions.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
