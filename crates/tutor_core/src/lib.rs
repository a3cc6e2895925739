pub mod domain;
pub mod orchestrator;
pub mod playback;
pub mod ports;
pub mod voice;

pub use domain::{
    session_title, ChatPhase, Language, Message, PlaybackState, ReplyFlags, Role,
    SessionSummary, StoredMessage, VoiceState,
};
pub use orchestrator::{ChatEvent, ChatOrchestrator, Exchange};
pub use playback::SpeechPlaybackController;
pub use ports::{
    ChatHistoryService, CompletionRequest, CompletionService, PortError, PortResult,
    RecognitionEvent, RecognitionResult, SessionStore, SpeechRecognizer, SpeechSynthesizer,
    SynthesisEvent, Unsupported, Utterance,
};
pub use voice::VoiceCaptureController;
