//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the voice-enabled tutor chat.
//!
//! The browser doubles as the speech hardware: the server drives its recognizer and
//! synthesizer with commands, and the browser reports the resulting device events.

use serde::{Deserialize, Serialize};
use tutor_core::{
    ChatEvent, ChatPhase, Message, PlaybackState, RecognitionEvent, RecognitionResult,
    SynthesisEvent, VoiceState,
};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// A single recognition hypothesis as reported by the browser.
#[derive(Deserialize, Debug, Clone)]
pub struct WireRecognitionResult {
    pub transcript: String,
    #[serde(default)]
    pub is_final: bool,
}

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Initializes the connection. This must be the first message sent.
    Init {
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        capture_supported: bool,
        #[serde(default)]
        synthesis_supported: bool,
    },

    // --- User actions ---
    SendMessage { text: String },
    SetDraft { text: String },
    SetLanguage { language: String },
    NewConversation,
    StartListening,
    StopListening,
    ResetTranscript,
    SpeakMessage { message_id: Uuid },
    StopSpeaking,

    // --- Recognizer events ---
    RecognitionResult {
        result_index: usize,
        results: Vec<WireRecognitionResult>,
    },
    RecognitionError { error: String },
    RecognitionEnded,

    // --- Synthesizer events ---
    SpeechStarted { utterance_id: u64 },
    SpeechEnded { utterance_id: u64 },
    SpeechError { utterance_id: u64, error: String },
}

impl ClientMessage {
    /// Converts recognizer reports into the core's event type.
    pub fn into_recognition_event(self) -> Option<RecognitionEvent> {
        match self {
            ClientMessage::RecognitionResult {
                result_index,
                results,
            } => Some(RecognitionEvent::Result {
                result_index,
                results: results
                    .into_iter()
                    .map(|r| RecognitionResult {
                        transcript: r.transcript,
                        is_final: r.is_final,
                    })
                    .collect(),
            }),
            ClientMessage::RecognitionError { error } => Some(RecognitionEvent::Error(error)),
            ClientMessage::RecognitionEnded => Some(RecognitionEvent::Ended),
            _ => None,
        }
    }

    /// Converts synthesizer reports into the core's event type.
    pub fn into_synthesis_event(self) -> Option<SynthesisEvent> {
        match self {
            ClientMessage::SpeechStarted { utterance_id } => {
                Some(SynthesisEvent::Started(utterance_id))
            }
            ClientMessage::SpeechEnded { utterance_id } => Some(SynthesisEvent::Ended(utterance_id)),
            ClientMessage::SpeechError {
                utterance_id,
                error,
            } => Some(SynthesisEvent::Error {
                id: utterance_id,
                reason: error,
            }),
            _ => None,
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms successful initialization.
    SessionInitialized { language: String },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },

    // --- Conversation state ---
    PhaseChanged { phase: ChatPhase },
    MessageAppended { message: Message },
    SessionAssigned { session_id: Uuid },
    DraftChanged { text: String },
    ConversationReset,
    VoiceState {
        listening: bool,
        transcript: String,
        supported: bool,
    },
    PlaybackState { speaking: bool },

    // --- Device commands ---
    StartRecognition { locale: String },
    StopRecognition,
    Speak {
        utterance_id: u64,
        text: String,
        rate: f32,
        pitch: f32,
        volume: f32,
    },
    CancelSpeech,
}

impl From<ChatEvent> for ServerMessage {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::PhaseChanged(phase) => ServerMessage::PhaseChanged { phase },
            ChatEvent::MessageAppended(message) => ServerMessage::MessageAppended { message },
            ChatEvent::SessionAssigned(session_id) => ServerMessage::SessionAssigned { session_id },
            ChatEvent::DraftChanged(text) => ServerMessage::DraftChanged { text },
            ChatEvent::ConversationReset => ServerMessage::ConversationReset,
        }
    }
}

impl From<VoiceState> for ServerMessage {
    fn from(state: VoiceState) -> Self {
        ServerMessage::VoiceState {
            listening: state.listening,
            transcript: state.transcript,
            supported: state.supported,
        }
    }
}

impl From<PlaybackState> for ServerMessage {
    fn from(state: PlaybackState) -> Self {
        ServerMessage::PlaybackState {
            speaking: state.speaking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_defaults_to_no_device_support() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Init {
                language: None,
                capture_supported: false,
                synthesis_supported: false
            }
        ));
    }

    #[test]
    fn recognition_result_maps_to_core_event() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"recognition_result","result_index":1,"results":[
                {"transcript":"hello","is_final":true},
                {"transcript":"wor"}
            ]}"#,
        )
        .unwrap();
        let event = msg.into_recognition_event().unwrap();
        assert_eq!(
            event,
            RecognitionEvent::Result {
                result_index: 1,
                results: vec![
                    RecognitionResult {
                        transcript: "hello".to_string(),
                        is_final: true
                    },
                    RecognitionResult {
                        transcript: "wor".to_string(),
                        is_final: false
                    },
                ],
            }
        );
    }

    #[test]
    fn speech_error_maps_to_core_event() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"speech_error","utterance_id":7,"error":"interrupted"}"#,
        )
        .unwrap();
        assert_eq!(
            msg.into_synthesis_event(),
            Some(SynthesisEvent::Error {
                id: 7,
                reason: "interrupted".to_string()
            })
        );
    }

    #[test]
    fn server_messages_use_snake_case_tags() {
        let json = serde_json::to_value(ServerMessage::PhaseChanged {
            phase: ChatPhase::Sending,
        })
        .unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["phase"], "sending");

        let json = serde_json::to_value(ServerMessage::CancelSpeech).unwrap();
        assert_eq!(json["type"], "cancel_speech");
    }
}
