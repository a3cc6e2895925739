//! crates/tutor_core/src/domain.rs
//!
//! Defines the pure, core data structures for the tutoring chat.
//! These structs are independent of any database or wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters of the first message kept in a session title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Who authored a message in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The string stored in the `role` column of persisted messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Presentation hints derived from the raw text of an assistant reply.
///
/// Both flags are keyword heuristics and will misfire on some inputs; callers
/// should treat them as hints for rendering, never as facts about the content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFlags {
    pub has_code: bool,
    pub has_image: bool,
}

impl ReplyFlags {
    pub fn detect(text: &str) -> Self {
        let has_code =
            text.contains("```") || text.contains("function") || text.contains("class ");
        let lowered = text.to_lowercase();
        let has_image = lowered.contains("image") || lowered.contains("diagram");
        Self {
            has_code,
            has_image,
        }
    }
}

/// A single turn in the transcript. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub audio_ref: Option<String>,
    pub has_code: bool,
    pub has_image: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            audio_ref: None,
            has_code: false,
            has_image: false,
        }
    }

    pub fn assistant(content: impl Into<String>, flags: ReplyFlags) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            audio_ref: None,
            has_code: flags.has_code,
            has_image: flags.has_image,
        }
    }
}

/// Derives a session title from the first message of a conversation.
pub fn session_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// UI languages the tutor is offered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Fr,
    Ar,
    Zh,
    Sw,
}

impl Language {
    /// Parses a language tag such as `fr` or `es-MX`, falling back to English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match primary.as_str() {
            "es" => Language::Es,
            "fr" => Language::Fr,
            "ar" => Language::Ar,
            "zh" => Language::Zh,
            "sw" => Language::Sw,
            _ => Language::En,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::Ar => "ar",
            Language::Zh => "zh",
            Language::Sw => "sw",
        }
    }

    /// The locale handed to the speech recognizer.
    pub fn recognition_locale(&self) -> &'static str {
        match self {
            Language::En => "en-US",
            Language::Es => "es-ES",
            Language::Fr => "fr-FR",
            Language::Ar => "ar-SA",
            Language::Zh => "zh-CN",
            Language::Sw => "sw-KE",
        }
    }
}

/// Whether the orchestrator currently has an exchange in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Idle,
    Sending,
}

/// Snapshot of the voice capture controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    pub listening: bool,
    pub transcript: String,
    pub supported: bool,
}

/// Snapshot of the speech playback controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub speaking: bool,
}

// Read models for the conversation history views.

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub audio_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}
