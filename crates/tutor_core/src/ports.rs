//! crates/tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) the tutoring core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the persistence backend, the completion provider and the
//! speech hardware of whatever host runs it.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Role, SessionSummary, StoredMessage};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Not supported on this host")]
    Unsupported,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// Durable storage for chat sessions, scoped to a single user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session row and returns its id.
    async fn ensure_session(&self, title: &str, language: &str) -> PortResult<Uuid>;

    /// Returns `NotFound` when the session is absent or owned by another user.
    async fn append_message(&self, session_id: Uuid, role: Role, content: &str) -> PortResult<()>;
}

/// Read access to persisted conversations.
#[async_trait]
pub trait ChatHistoryService: Send + Sync {
    async fn list_sessions(&self, owner: Uuid) -> PortResult<Vec<SessionSummary>>;

    async fn owns_session(&self, owner: Uuid, session_id: Uuid) -> PortResult<bool>;

    /// Returns `NotFound` when the session does not exist or belongs to someone else.
    async fn list_messages(&self, owner: Uuid, session_id: Uuid) -> PortResult<Vec<StoredMessage>>;
}

//=========================================================================================
// Completion Port
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_message: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produces the assistant reply for a single user message.
    async fn complete(&self, request: CompletionRequest) -> PortResult<String>;
}

//=========================================================================================
// Speech Device Ports
//=========================================================================================

/// One recognition hypothesis reported by the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
}

/// Events a speech recognizer reports back while capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// `results` is the device's full result list; entries before `result_index`
    /// were already reported in an earlier event.
    Result {
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    Error(String),
    Ended,
}

/// Continuous speech-to-text capture from the host's audio input.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn start(&self, locale: &str) -> PortResult<()>;

    async fn stop(&self) -> PortResult<()>;
}

/// A request to synthesize one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Events a speech synthesizer reports back for an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started(u64),
    Ended(u64),
    Error { id: u64, reason: String },
}

/// Text-to-speech output on the host.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn speak(&self, utterance: Utterance) -> PortResult<()>;

    async fn cancel(&self) -> PortResult<()>;
}

/// Device stand-in for hosts without any speech capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

#[async_trait]
impl SpeechRecognizer for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&self, _locale: &str) -> PortResult<()> {
        Err(PortError::Unsupported)
    }

    async fn stop(&self) -> PortResult<()> {
        Err(PortError::Unsupported)
    }
}

#[async_trait]
impl SpeechSynthesizer for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    async fn speak(&self, _utterance: Utterance) -> PortResult<()> {
        Err(PortError::Unsupported)
    }

    async fn cancel(&self) -> PortResult<()> {
        Err(PortError::Unsupported)
    }
}
