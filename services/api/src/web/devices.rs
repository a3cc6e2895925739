//! services/api/src/web/devices.rs
//!
//! Speech device adapters backed by the connected browser. Commands are queued
//! on the connection's outbound channel; the browser's Web Speech APIs do the
//! actual work and report back through `ClientMessage` events.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tutor_core::ports::{PortError, PortResult, SpeechRecognizer, SpeechSynthesizer, Utterance};

use crate::web::protocol::ServerMessage;

async fn dispatch(outbound: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> PortResult<()> {
    outbound
        .send(msg)
        .await
        .map_err(|_| PortError::Unexpected("client connection closed".to_string()))
}

/// Drives the browser's `SpeechRecognition`.
pub struct BrowserRecognizer {
    outbound: mpsc::Sender<ServerMessage>,
    supported: bool,
}

impl BrowserRecognizer {
    pub fn new(outbound: mpsc::Sender<ServerMessage>, supported: bool) -> Self {
        Self {
            outbound,
            supported,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for BrowserRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn start(&self, locale: &str) -> PortResult<()> {
        if !self.supported {
            return Err(PortError::Unsupported);
        }
        dispatch(
            &self.outbound,
            ServerMessage::StartRecognition {
                locale: locale.to_string(),
            },
        )
        .await
    }

    async fn stop(&self) -> PortResult<()> {
        if !self.supported {
            return Err(PortError::Unsupported);
        }
        dispatch(&self.outbound, ServerMessage::StopRecognition).await
    }
}

/// Drives the browser's `speechSynthesis`.
pub struct BrowserSynthesizer {
    outbound: mpsc::Sender<ServerMessage>,
    supported: bool,
}

impl BrowserSynthesizer {
    pub fn new(outbound: mpsc::Sender<ServerMessage>, supported: bool) -> Self {
        Self {
            outbound,
            supported,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for BrowserSynthesizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn speak(&self, utterance: Utterance) -> PortResult<()> {
        if !self.supported {
            return Err(PortError::Unsupported);
        }
        dispatch(
            &self.outbound,
            ServerMessage::Speak {
                utterance_id: utterance.id,
                text: utterance.text,
                rate: utterance.rate,
                pitch: utterance.pitch,
                volume: utterance.volume,
            },
        )
        .await
    }

    async fn cancel(&self) -> PortResult<()> {
        if !self.supported {
            return Err(PortError::Unsupported);
        }
        dispatch(&self.outbound, ServerMessage::CancelSpeech).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recognizer_commands_reach_the_outbound_queue() {
        let (tx, mut rx) = mpsc::channel(8);
        let recognizer = BrowserRecognizer::new(tx, true);

        recognizer.start("fr-FR").await.unwrap();
        recognizer.stop().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::StartRecognition {
                locale: "fr-FR".to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(ServerMessage::StopRecognition));
    }

    #[tokio::test]
    async fn synthesizer_forwards_the_voice_profile() {
        let (tx, mut rx) = mpsc::channel(8);
        let synthesizer = BrowserSynthesizer::new(tx, true);

        synthesizer
            .speak(Utterance {
                id: 3,
                text: "Hello".to_string(),
                rate: 0.9,
                pitch: 1.0,
                volume: 1.0,
            })
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Speak {
                utterance_id: 3,
                text: "Hello".to_string(),
                rate: 0.9,
                pitch: 1.0,
                volume: 1.0,
            })
        );
    }

    #[tokio::test]
    async fn unsupported_browser_sends_nothing() {
        let (tx, mut rx) = mpsc::channel(8);
        let synthesizer = BrowserSynthesizer::new(tx, false);

        assert!(matches!(synthesizer.cancel().await, Err(PortError::Unsupported)));
        drop(synthesizer);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn closed_connection_is_reported() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let recognizer = BrowserRecognizer::new(tx, true);
        assert!(matches!(
            recognizer.start("en-US").await,
            Err(PortError::Unexpected(_))
        ));
    }
}
