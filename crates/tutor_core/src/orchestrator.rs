//! crates/tutor_core/src/orchestrator.rs
//!
//! The chat session state machine. One `ChatOrchestrator` owns one tutoring
//! conversation: the transcript, the session identity and the two speech
//! controllers. `send_message` runs a whole exchange (persist the question,
//! ask the completion service, persist the answer, speak it) as one ordered
//! async operation, with at most one exchange in flight at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{session_title, ChatPhase, Language, Message, ReplyFlags, Role};
use crate::playback::SpeechPlaybackController;
use crate::ports::{
    CompletionRequest, CompletionService, PortError, PortResult, RecognitionEvent,
    SessionStore, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
};
use crate::voice::VoiceCaptureController;

//=========================================================================================
// Tutor Configuration Constants
//=========================================================================================

pub const SYSTEM_INSTRUCTION: &str = r#"You are an AI tutor designed to help students learn across all subjects. You should:

1. Provide clear, educational explanations
2. Break down complex topics into understandable parts
3. Use examples and analogies when helpful
4. Encourage critical thinking with follow-up questions
5. Adapt your language to be appropriate for the student's level
6. Be patient, supportive, and encouraging
7. If asked about code, provide working examples with explanations
8. For math problems, show step-by-step solutions
9. For languages, provide pronunciation guides and cultural context
10. Always aim to teach, not just answer

Keep responses concise but comprehensive. If the topic is very complex, offer to break it down further."#;

/// Shown in place of a real answer whenever the completion service fails.
pub const FALLBACK_REPLY: &str = r#"I'm experiencing some technical difficulties right now. Here's what I can tell you about your question:

If you're asking about a specific subject, I'd be happy to help once my connection is restored. In the meantime, you might want to:

1. Break down your question into smaller parts
2. Look for reliable educational resources online
3. Try rephrasing your question
4. Check if there are any specific terms you'd like me to explain

Please try asking your question again in a moment!"#;

pub const MAX_REPLY_TOKENS: u32 = 1000;
pub const TEMPERATURE: f32 = 0.7;
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 64;

//=========================================================================================
// Notifications and Results
//=========================================================================================

/// State changes published to subscribers (typically a UI connection).
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    PhaseChanged(ChatPhase),
    MessageAppended(Message),
    SessionAssigned(Uuid),
    DraftChanged(String),
    ConversationReset,
}

/// The outcome of one accepted `send_message` call.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The session the exchange was persisted under, if one could be obtained.
    pub session_id: Option<Uuid>,
    pub user: Message,
    pub assistant: Message,
}

/// Where an exchange takes its session id from.
enum SessionSource {
    /// The id the orchestrator is tracking, read under the same lock that
    /// claims the in-flight slot.
    Tracked,
    Given(Option<Uuid>),
}

struct ChatState {
    phase: ChatPhase,
    session_id: Option<Uuid>,
    transcript: Vec<Message>,
    draft: String,
    language: Language,
    /// Bumped by `new_conversation` so a late exchange can tell it is stale.
    generation: u64,
}

//=========================================================================================
// The Orchestrator
//=========================================================================================

pub struct ChatOrchestrator {
    store: Option<Arc<dyn SessionStore>>,
    completion: Arc<dyn CompletionService>,
    voice: VoiceCaptureController,
    playback: SpeechPlaybackController,
    completion_timeout: Duration,
    state: Mutex<ChatState>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatOrchestrator {
    /// Creates an orchestrator with no persistence. Attach a store with `with_store`.
    pub fn new(
        completion: Arc<dyn CompletionService>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: None,
            completion,
            voice: VoiceCaptureController::new(recognizer),
            playback: SpeechPlaybackController::new(synthesizer),
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            state: Mutex::new(ChatState {
                phase: ChatPhase::Idle,
                session_id: None,
                transcript: Vec::new(),
                draft: String::new(),
                language: Language::default(),
                generation: 0,
            }),
            events,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .language = language;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn voice(&self) -> &VoiceCaptureController {
        &self.voice
    }

    pub fn playback(&self) -> &SpeechPlaybackController {
        &self.playback
    }

    // --- Snapshots ---

    pub async fn phase(&self) -> ChatPhase {
        self.lock_state().phase
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.lock_state().session_id
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.lock_state().transcript.clone()
    }

    pub async fn draft(&self) -> String {
        self.lock_state().draft.clone()
    }

    pub async fn language(&self) -> Language {
        self.lock_state().language
    }

    pub async fn set_language(&self, language: Language) {
        self.lock_state().language = language;
    }

    pub async fn set_draft(&self, text: &str) {
        self.lock_state().draft = text.to_string();
        self.emit(ChatEvent::DraftChanged(text.to_string()));
    }

    // --- The Exchange ---

    /// Sends using the session id the orchestrator is currently tracking.
    pub async fn send(&self, text: &str) -> Option<Exchange> {
        self.run_exchange(text, SessionSource::Tracked).await
    }

    /// Runs one user/assistant exchange.
    ///
    /// Returns `None` without touching any state when `text` is blank or another
    /// exchange is still in flight. Otherwise exactly one user message and one
    /// assistant message are produced, whatever happens downstream: persistence
    /// is best-effort and a failed completion becomes the fallback reply.
    ///
    /// Cancel-safe: dropping the future releases the in-flight slot, and an
    /// exchange cut off before its reply gets the fallback reply instead.
    pub async fn send_message(&self, text: &str, current_session: Option<Uuid>) -> Option<Exchange> {
        self.run_exchange(text, SessionSource::Given(current_session))
            .await
    }

    async fn run_exchange(&self, text: &str, source: SessionSource) -> Option<Exchange> {
        let content = text.trim();
        if content.is_empty() {
            debug!("Ignoring blank message.");
            return None;
        }

        let user = Message::user(content);
        let (generation, language, current_session) = {
            let mut state = self.lock_state();
            if state.phase == ChatPhase::Sending {
                debug!("Dropping message while another exchange is in flight.");
                return None;
            }
            state.phase = ChatPhase::Sending;
            state.transcript.push(user.clone());
            state.draft.clear();
            let current_session = match source {
                SessionSource::Tracked => state.session_id,
                SessionSource::Given(id) => id,
            };
            (state.generation, state.language, current_session)
        };
        let mut in_flight = InFlight {
            chat: self,
            generation,
            answered: false,
        };
        self.emit(ChatEvent::PhaseChanged(ChatPhase::Sending));
        self.emit(ChatEvent::MessageAppended(user.clone()));
        self.emit(ChatEvent::DraftChanged(String::new()));
        self.voice.reset_transcript().await;

        let session_id = match current_session {
            Some(id) => Some(id),
            None => self.create_session(content, language).await,
        };
        if let Some(id) = session_id {
            self.persist(id, Role::User, content).await;
        }

        let assistant = match self.request_reply(content).await {
            Ok(reply) => {
                let flags = ReplyFlags::detect(&reply);
                Message::assistant(reply, flags)
            }
            Err(e) => {
                error!("Completion failed, substituting fallback reply: {}", e);
                Message::assistant(FALLBACK_REPLY, ReplyFlags::default())
            }
        };

        if let Some(id) = session_id {
            self.persist(id, Role::Assistant, &assistant.content).await;
        }

        let (current, session_changed) = {
            let mut state = self.lock_state();
            let current = state.generation == generation;
            let mut session_changed = false;
            if current {
                state.transcript.push(assistant.clone());
                session_changed = session_id.is_some() && state.session_id != session_id;
                if session_id.is_some() {
                    state.session_id = session_id;
                }
            }
            (current, session_changed)
        };
        in_flight.answered = true;

        if current {
            self.emit(ChatEvent::MessageAppended(assistant.clone()));
            if let (true, Some(id)) = (session_changed, session_id) {
                self.emit(ChatEvent::SessionAssigned(id));
            }
            if !assistant.content.trim().is_empty() {
                self.playback.speak(&assistant.content).await;
            }
        } else {
            info!("Conversation was reset mid-exchange; discarding the late reply locally.");
        }

        drop(in_flight);

        Some(Exchange {
            session_id,
            user,
            assistant,
        })
    }

    /// Starts a fresh conversation. Persisted rows are left untouched.
    pub async fn new_conversation(&self) {
        {
            let mut state = self.lock_state();
            state.transcript.clear();
            state.session_id = None;
            state.draft.clear();
            state.generation += 1;
        }
        self.voice.reset_transcript().await;
        self.emit(ChatEvent::ConversationReset);
    }

    /// Reads an assistant turn aloud again. Returns false for unknown ids.
    pub async fn speak_message(&self, message_id: Uuid) -> bool {
        let content = {
            let state = self.lock_state();
            state
                .transcript
                .iter()
                .find(|m| m.id == message_id && m.role == Role::Assistant)
                .map(|m| m.content.clone())
        };
        match content {
            Some(text) => {
                self.playback.speak(&text).await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_speaking(&self) {
        self.playback.stop().await;
    }

    // --- Voice Input ---

    pub async fn start_listening(&self) {
        let language = self.language().await;
        self.voice.start_listening(language.recognition_locale()).await;
    }

    pub async fn stop_listening(&self) {
        self.voice.stop_listening().await;
    }

    pub async fn reset_transcript(&self) {
        self.voice.reset_transcript().await;
    }

    /// Feeds a recognizer event in; a changed transcript replaces the draft.
    pub async fn handle_recognition(&self, event: RecognitionEvent) {
        if let Some(transcript) = self.voice.handle_event(event).await {
            self.set_draft(&transcript).await;
        }
    }

    pub async fn handle_synthesis(&self, event: SynthesisEvent) {
        self.playback.handle_event(event).await;
    }

    // --- Helpers ---

    async fn create_session(&self, content: &str, language: Language) -> Option<Uuid> {
        let store = self.store.as_ref()?;
        match store
            .ensure_session(&session_title(content), language.tag())
            .await
        {
            Ok(id) => {
                info!("Created chat session {}.", id);
                Some(id)
            }
            Err(e) => {
                error!("Error creating session, continuing without persistence: {}", e);
                None
            }
        }
    }

    async fn persist(&self, session_id: Uuid, role: Role, content: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.append_message(session_id, role, content).await {
            warn!(
                "Failed to save {} message for session {}: {}",
                role.as_str(),
                session_id,
                e
            );
        }
    }

    async fn request_reply(&self, content: &str) -> PortResult<String> {
        let request = CompletionRequest {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            user_message: content.to_string(),
            max_tokens: MAX_REPLY_TOKENS,
            temperature: TEMPERATURE,
        };
        tokio::time::timeout(self.completion_timeout, self.completion.complete(request))
            .await
            .map_err(|_| PortError::Timeout(self.completion_timeout))?
    }

    fn lock_state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is a normal state for headless callers.
        let _ = self.events.send(event);
    }
}

/// The claimed in-flight slot of one exchange. Dropping it returns the phase
/// to `Idle`, including when the exchange future is cancelled mid-flight.
struct InFlight<'a> {
    chat: &'a ChatOrchestrator,
    generation: u64,
    /// Set once the assistant turn has been settled for this exchange.
    answered: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let fallback = {
            let mut state = self.chat.lock_state();
            state.phase = ChatPhase::Idle;
            if !self.answered && state.generation == self.generation {
                let fallback = Message::assistant(FALLBACK_REPLY, ReplyFlags::default());
                state.transcript.push(fallback.clone());
                Some(fallback)
            } else {
                None
            }
        };
        if let Some(message) = fallback {
            warn!("Exchange was cancelled before its reply; substituting fallback reply.");
            self.chat.emit(ChatEvent::MessageAppended(message));
        }
        self.chat.emit(ChatEvent::PhaseChanged(ChatPhase::Idle));
    }
}
