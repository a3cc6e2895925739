//! Hand-written fakes shared by the web layer's tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tutor_core::domain::{Role, SessionSummary, StoredMessage};
use tutor_core::ports::{
    ChatHistoryService, CompletionRequest, CompletionService, PortError, PortResult,
    SessionStore,
};
use uuid::Uuid;

use crate::web::state::SessionStoreProvider;

//=========================================================================================
// Completion
//=========================================================================================

/// Replies with a fixed text, optionally holding each call until `release`.
pub struct GatedCompletion {
    reply: Option<String>,
    gated: bool,
    gate: Notify,
    pub entered: Notify,
    calls: AtomicUsize,
}

impl GatedCompletion {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            gated: true,
            gate: Notify::new(),
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn open(reply: &str) -> Self {
        Self {
            gated: false,
            ..Self::new(reply)
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::open("")
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for GatedCompletion {
    async fn complete(&self, _request: CompletionRequest) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if self.gated {
            self.gate.notified().await;
        }
        self.reply
            .clone()
            .ok_or_else(|| PortError::Unexpected("provider unavailable".to_string()))
    }
}

//=========================================================================================
// Persistence
//=========================================================================================

#[derive(Debug, Clone)]
pub struct SavedSession {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub language: String,
    pub messages: Vec<(Role, String)>,
}

/// An in-memory stand-in for the database, shared by every per-user store.
#[derive(Clone, Default)]
pub struct RecordingStores {
    pub sessions: Arc<Mutex<Vec<SavedSession>>>,
    pub fail_writes: Arc<AtomicBool>,
}

impl RecordingStores {
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.for_user(Uuid::new_v4())
    }
}

struct RecordingStore {
    owner: Uuid,
    shared: RecordingStores,
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn ensure_session(&self, title: &str, language: &str) -> PortResult<Uuid> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("database unavailable".to_string()));
        }
        let id = Uuid::new_v4();
        self.shared.sessions.lock().unwrap().push(SavedSession {
            id,
            owner: self.owner,
            title: title.to_string(),
            language: language.to_string(),
            messages: Vec::new(),
        });
        Ok(id)
    }

    async fn append_message(&self, session_id: Uuid, role: Role, content: &str) -> PortResult<()> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("database unavailable".to_string()));
        }
        let mut sessions = self.shared.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.owner == self.owner)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        session.messages.push((role, content.to_string()));
        Ok(())
    }
}

impl SessionStoreProvider for RecordingStores {
    fn for_user(&self, user_id: Uuid) -> Arc<dyn SessionStore> {
        Arc::new(RecordingStore {
            owner: user_id,
            shared: self.clone(),
        })
    }
}

#[async_trait]
impl ChatHistoryService for RecordingStores {
    async fn list_sessions(&self, owner: Uuid) -> PortResult<Vec<SessionSummary>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.owner == owner)
            .map(|s| SessionSummary {
                id: s.id,
                title: s.title.clone(),
                language: s.language.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn owns_session(&self, owner: Uuid, session_id: Uuid) -> PortResult<bool> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.id == session_id && s.owner == owner))
    }

    async fn list_messages(&self, owner: Uuid, session_id: Uuid) -> PortResult<Vec<StoredMessage>> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter()
            .find(|s| s.id == session_id && s.owner == owner)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        Ok(session
            .messages
            .iter()
            .map(|(role, content)| StoredMessage {
                id: Uuid::new_v4(),
                session_id,
                role: *role,
                content: content.clone(),
                audio_ref: None,
                created_at: Utc::now(),
            })
            .collect())
    }
}
