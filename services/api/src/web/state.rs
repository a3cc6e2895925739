//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how per-conversation orchestrators
//! are assembled from it.

use crate::adapters::DbAdapter;
use crate::config::Config;
use std::sync::Arc;
use tutor_core::ports::{
    ChatHistoryService, CompletionService, SessionStore, SpeechRecognizer, SpeechSynthesizer,
};
use tutor_core::{ChatOrchestrator, Language};
use uuid::Uuid;

//=========================================================================================
// Per-user Session Stores
//=========================================================================================

/// Hands out a `SessionStore` scoped to one user.
pub trait SessionStoreProvider: Send + Sync {
    fn for_user(&self, user_id: Uuid) -> Arc<dyn SessionStore>;
}

impl SessionStoreProvider for DbAdapter {
    fn for_user(&self, user_id: Uuid) -> Arc<dyn SessionStore> {
        Arc::new(self.session_store(user_id))
    }
}

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub completion: Arc<dyn CompletionService>,
    pub history: Arc<dyn ChatHistoryService>,
    pub sessions: Arc<dyn SessionStoreProvider>,
}

impl AppState {
    /// Builds the orchestrator for one conversation owned by `user_id`.
    pub fn orchestrator(
        &self,
        user_id: Uuid,
        language: Language,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(self.completion.clone(), recognizer, synthesizer)
            .with_store(self.sessions.for_user(user_id))
            .with_language(language)
            .with_completion_timeout(self.config.completion_timeout)
    }

    /// Resolves an optional client language tag against the configured default.
    pub fn language_or_default(&self, tag: Option<&str>) -> Language {
        tag.map(Language::from_tag)
            .unwrap_or(self.config.default_language)
    }
}
