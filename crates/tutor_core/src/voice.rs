//! crates/tutor_core/src/voice.rs
//!
//! Wraps a continuous speech recognizer into a start/stop/listening state with
//! an accumulating transcript of final results.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::domain::VoiceState;
use crate::ports::{RecognitionEvent, RecognitionResult, SpeechRecognizer};

pub struct VoiceCaptureController {
    device: Arc<dyn SpeechRecognizer>,
    // Serializes device calls so start/stop can never interleave.
    state: Mutex<VoiceState>,
    notify: watch::Sender<VoiceState>,
}

impl VoiceCaptureController {
    /// Creates a controller. Support is sampled once and fixed for its lifetime.
    pub fn new(device: Arc<dyn SpeechRecognizer>) -> Self {
        let initial = VoiceState {
            listening: false,
            transcript: String::new(),
            supported: device.is_supported(),
        };
        let (notify, _) = watch::channel(initial.clone());
        Self {
            device,
            state: Mutex::new(initial),
            notify,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceState> {
        self.notify.subscribe()
    }

    pub async fn snapshot(&self) -> VoiceState {
        self.state.lock().await.clone()
    }

    pub async fn start_listening(&self, locale: &str) {
        let mut state = self.state.lock().await;
        if !state.supported || state.listening {
            return;
        }
        state.transcript.clear();
        match self.device.start(locale).await {
            Ok(()) => {
                state.listening = true;
                debug!(locale, "Speech capture started.");
            }
            Err(e) => warn!("Speech capture failed to start: {}", e),
        }
        self.publish(&state);
    }

    pub async fn stop_listening(&self) {
        let mut state = self.state.lock().await;
        if !state.supported || !state.listening {
            return;
        }
        if let Err(e) = self.device.stop().await {
            warn!("Speech capture failed to stop cleanly: {}", e);
        }
        state.listening = false;
        self.publish(&state);
    }

    pub async fn reset_transcript(&self) {
        let mut state = self.state.lock().await;
        if state.transcript.is_empty() {
            return;
        }
        state.transcript.clear();
        self.publish(&state);
    }

    /// Applies a device event. Returns the new transcript when it changed.
    pub async fn handle_event(&self, event: RecognitionEvent) -> Option<String> {
        let mut state = self.state.lock().await;
        if !state.supported {
            return None;
        }
        match event {
            RecognitionEvent::Result {
                result_index,
                results,
            } => {
                // Results that arrive after stop belong to a finished capture.
                if !state.listening {
                    debug!("Ignoring recognition result while not listening.");
                    return None;
                }
                let finals = collect_finals(result_index, &results);
                if finals.is_empty() {
                    return None;
                }
                if !state.transcript.is_empty() {
                    state.transcript.push(' ');
                }
                state.transcript.push_str(&finals);
                self.publish(&state);
                Some(state.transcript.clone())
            }
            RecognitionEvent::Error(reason) => {
                warn!("Speech recognition error: {}", reason);
                if state.listening {
                    state.listening = false;
                    self.publish(&state);
                }
                None
            }
            RecognitionEvent::Ended => {
                if state.listening {
                    state.listening = false;
                    self.publish(&state);
                }
                None
            }
        }
    }

    fn publish(&self, state: &VoiceState) {
        self.notify.send_replace(state.clone());
    }
}

/// Joins the final results reported from `result_index` onwards. Interim
/// hypotheses are unstable and never leave this function.
fn collect_finals(result_index: usize, results: &[RecognitionResult]) -> String {
    results
        .iter()
        .skip(result_index)
        .filter(|r| r.is_final)
        .map(|r| r.transcript.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
