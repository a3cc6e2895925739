//! crates/tutor_core/src/playback.rs
//!
//! Text-to-speech playback with at most one active utterance.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::domain::PlaybackState;
use crate::ports::{SpeechSynthesizer, SynthesisEvent, Utterance};

pub const SPEECH_RATE: f32 = 0.9;
pub const SPEECH_PITCH: f32 = 1.0;
pub const SPEECH_VOLUME: f32 = 1.0;

struct Inner {
    next_id: u64,
    /// The utterance whose events are honoured. Anything else is stale.
    active: Option<u64>,
    speaking: bool,
}

pub struct SpeechPlaybackController {
    device: Arc<dyn SpeechSynthesizer>,
    supported: bool,
    inner: Mutex<Inner>,
    notify: watch::Sender<PlaybackState>,
}

impl SpeechPlaybackController {
    pub fn new(device: Arc<dyn SpeechSynthesizer>) -> Self {
        let supported = device.is_supported();
        let (notify, _) = watch::channel(PlaybackState::default());
        Self {
            device,
            supported,
            inner: Mutex::new(Inner {
                next_id: 1,
                active: None,
                speaking: false,
            }),
            notify,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.notify.subscribe()
    }

    pub async fn is_speaking(&self) -> bool {
        self.inner.lock().await.speaking
    }

    /// Speaks `text`, cancelling whatever utterance is still in progress.
    pub async fn speak(&self, text: &str) {
        if !self.supported {
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.active.take().is_some() {
            if let Err(e) = self.device.cancel().await {
                warn!("Failed to cancel previous utterance: {}", e);
            }
            self.set_speaking(&mut inner, false);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let utterance = Utterance {
            id,
            text: text.to_string(),
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
            volume: SPEECH_VOLUME,
        };
        match self.device.speak(utterance).await {
            Ok(()) => {
                inner.active = Some(id);
                debug!(utterance_id = id, "Utterance queued for synthesis.");
            }
            Err(e) => warn!("Speech synthesis failed: {}", e),
        }
    }

    /// Cancels any in-progress utterance. Idempotent.
    pub async fn stop(&self) {
        if !self.supported {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.active = None;
        if let Err(e) = self.device.cancel().await {
            warn!("Failed to cancel speech: {}", e);
        }
        self.set_speaking(&mut inner, false);
    }

    pub async fn handle_event(&self, event: SynthesisEvent) {
        let mut inner = self.inner.lock().await;
        match event {
            SynthesisEvent::Started(id) if inner.active == Some(id) => {
                self.set_speaking(&mut inner, true);
            }
            SynthesisEvent::Ended(id) if inner.active == Some(id) => {
                inner.active = None;
                self.set_speaking(&mut inner, false);
            }
            SynthesisEvent::Error { id, reason } if inner.active == Some(id) => {
                warn!(utterance_id = id, "Speech synthesis error: {}", reason);
                inner.active = None;
                self.set_speaking(&mut inner, false);
            }
            stale => debug!(?stale, "Ignoring event for a superseded utterance."),
        }
    }

    fn set_speaking(&self, inner: &mut Inner, speaking: bool) {
        if inner.speaking != speaking {
            inner.speaking = speaking;
            self.notify.send_replace(PlaybackState { speaking });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{PortResult, Unsupported};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeSynthesizer {
        calls: StdMutex<Vec<String>>,
        utterances: StdMutex<Vec<Utterance>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        fn is_supported(&self) -> bool {
            true
        }

        async fn speak(&self, utterance: Utterance) -> PortResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("speak {}", utterance.text));
            self.utterances.lock().unwrap().push(utterance);
            Ok(())
        }

        async fn cancel(&self) -> PortResult<()> {
            self.calls.lock().unwrap().push("cancel".to_string());
            Ok(())
        }
    }

    impl FakeSynthesizer {
        fn id_of(&self, text: &str) -> u64 {
            self.utterances
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.text == text)
                .map(|u| u.id)
                .unwrap()
        }
    }

    #[tokio::test]
    async fn new_utterance_supersedes_the_active_one() {
        let device = Arc::new(FakeSynthesizer::default());
        let playback = SpeechPlaybackController::new(device.clone());

        playback.speak("A").await;
        let a = device.id_of("A");
        playback.handle_event(SynthesisEvent::Started(a)).await;
        assert!(playback.is_speaking().await);

        playback.speak("B").await;
        let b = device.id_of("B");
        assert_eq!(
            *device.calls.lock().unwrap(),
            vec!["speak A".to_string(), "cancel".to_string(), "speak B".to_string()]
        );

        // The cancelled utterance reports its end late; it must not clear B.
        playback.handle_event(SynthesisEvent::Ended(a)).await;
        playback.handle_event(SynthesisEvent::Started(b)).await;
        assert!(playback.is_speaking().await);
        playback.handle_event(SynthesisEvent::Ended(b)).await;
        assert!(!playback.is_speaking().await);
    }

    #[tokio::test]
    async fn utterances_use_the_fixed_voice_profile() {
        let device = Arc::new(FakeSynthesizer::default());
        let playback = SpeechPlaybackController::new(device.clone());
        playback.speak("hello").await;

        let utterance = device.utterances.lock().unwrap()[0].clone();
        assert_eq!(utterance.rate, SPEECH_RATE);
        assert_eq!(utterance.pitch, SPEECH_PITCH);
        assert_eq!(utterance.volume, SPEECH_VOLUME);
    }

    #[tokio::test]
    async fn synthesis_errors_are_swallowed() {
        let device = Arc::new(FakeSynthesizer::default());
        let playback = SpeechPlaybackController::new(device.clone());
        playback.speak("A").await;
        let a = device.id_of("A");
        playback.handle_event(SynthesisEvent::Started(a)).await;
        playback
            .handle_event(SynthesisEvent::Error {
                id: a,
                reason: "audio-busy".to_string(),
            })
            .await;
        assert!(!playback.is_speaking().await);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let device = Arc::new(FakeSynthesizer::default());
        let playback = SpeechPlaybackController::new(device.clone());
        let updates = playback.subscribe();

        playback.speak("A").await;
        playback
            .handle_event(SynthesisEvent::Started(device.id_of("A")))
            .await;
        playback.stop().await;
        playback.stop().await;

        assert!(!playback.is_speaking().await);
        assert!(!updates.borrow().speaking);
    }

    #[tokio::test]
    async fn unsupported_host_ignores_everything() {
        let playback = SpeechPlaybackController::new(Arc::new(Unsupported));
        playback.speak("A").await;
        playback.stop().await;
        playback.handle_event(SynthesisEvent::Started(1)).await;
        assert!(!playback.is_speaking().await);
    }
}
