//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection owns one `ChatOrchestrator`; this module only translates
//! between wire messages and orchestrator calls.

use crate::web::{
    devices::{BrowserRecognizer, BrowserSynthesizer},
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tutor_core::{ChatEvent, ChatOrchestrator, PlaybackState, VoiceState};
use uuid::Uuid;

const OUTBOUND_CAPACITY: usize = 64;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New WebSocket connection established for user: {}", user_id);
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let (language, capture_supported, synthesis_supported) = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => match serde_json::from_str(&init_json) {
            Ok(ClientMessage::Init {
                language,
                capture_supported,
                synthesis_supported,
            }) => (
                app_state.language_or_default(language.as_deref()),
                capture_supported,
                synthesis_supported,
            ),
            _ => {
                error!("First message was not a valid Init message.");
                let err_msg = ServerMessage::Error {
                    message: "Expected an init message.".to_string(),
                };
                if let Ok(err_json) = serde_json::to_string(&err_msg) {
                    let _ = sender.send(Message::Text(err_json.into())).await;
                }
                return;
            }
        },
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    let (outbound, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);
    let recognizer = Arc::new(BrowserRecognizer::new(outbound.clone(), capture_supported));
    let synthesizer = Arc::new(BrowserSynthesizer::new(outbound.clone(), synthesis_supported));
    let chat = Arc::new(app_state.orchestrator(user_id, language, recognizer, synthesizer));
    info!(
        language = language.tag(),
        capture_supported, synthesis_supported, "Chat session initialized."
    );

    // --- 2. Outbound Writer and Notification Bridge ---
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize server message: {}", e),
            }
        }
    });

    let shutdown = CancellationToken::new();
    let bridge_task = tokio::spawn(forward_notifications(
        chat.subscribe(),
        chat.voice().subscribe(),
        chat.playback().subscribe(),
        outbound.clone(),
        shutdown.clone(),
    ));

    let ready = ServerMessage::SessionInitialized {
        language: language.tag().to_string(),
    };
    let initial_voice = ServerMessage::from(chat.voice().snapshot().await);
    if outbound.send(ready).await.is_err() || outbound.send(initial_voice).await.is_err() {
        error!("Failed to send session initialized message.");
    }

    // --- 3. Main Message Loop ---
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_text_message(&text, &chat, &outbound).await,
                Message::Close(_) => {
                    info!("Client sent close message.");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // --- 4. Cleanup ---
    shutdown.cancel();
    if let Err(e) = bridge_task.await {
        warn!("Notification bridge ended abnormally: {}", e);
    }
    info!("WebSocket connection closed for user: {}", user_id);
}

/// Relays orchestrator and controller state changes to the client until shutdown.
async fn forward_notifications(
    mut events: broadcast::Receiver<ChatEvent>,
    mut voice: watch::Receiver<VoiceState>,
    mut playback: watch::Receiver<PlaybackState>,
    outbound: mpsc::Sender<ServerMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => ServerMessage::from(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client fell behind; skipped {} chat events.", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = voice.changed() => {
                if changed.is_err() {
                    break;
                }
                ServerMessage::from(voice.borrow_and_update().clone())
            }
            changed = playback.changed() => {
                if changed.is_err() {
                    break;
                }
                ServerMessage::from(*playback.borrow_and_update())
            }
        };
        if outbound.send(msg).await.is_err() {
            break;
        }
    }
    debug!("Notification bridge stopped.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
pub(crate) async fn handle_text_message(
    text: &str,
    chat: &Arc<ChatOrchestrator>,
    outbound: &mpsc::Sender<ServerMessage>,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            let _ = outbound
                .send(ServerMessage::Error {
                    message: "Unrecognized message.".to_string(),
                })
                .await;
            return;
        }
    };

    match client_msg {
        ClientMessage::SendMessage { text } => {
            // The exchange runs on its own task so device events keep flowing
            // while the completion call is outstanding.
            let chat = chat.clone();
            tokio::spawn(async move {
                if chat.send(&text).await.is_none() {
                    debug!("Send rejected: blank input or an exchange already in flight.");
                }
            });
        }
        ClientMessage::SetDraft { text } => chat.set_draft(&text).await,
        ClientMessage::SetLanguage { language } => {
            chat.set_language(tutor_core::Language::from_tag(&language)).await
        }
        ClientMessage::NewConversation => {
            info!("NewConversation message received.");
            chat.new_conversation().await;
        }
        ClientMessage::StartListening => chat.start_listening().await,
        ClientMessage::StopListening => chat.stop_listening().await,
        ClientMessage::ResetTranscript => chat.reset_transcript().await,
        ClientMessage::SpeakMessage { message_id } => {
            if !chat.speak_message(message_id).await {
                warn!("SpeakMessage for unknown assistant message {}.", message_id);
            }
        }
        ClientMessage::StopSpeaking => chat.stop_speaking().await,
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
        }
        msg @ (ClientMessage::RecognitionResult { .. }
        | ClientMessage::RecognitionError { .. }
        | ClientMessage::RecognitionEnded) => {
            if let Some(event) = msg.into_recognition_event() {
                chat.handle_recognition(event).await;
            }
        }
        msg @ (ClientMessage::SpeechStarted { .. }
        | ClientMessage::SpeechEnded { .. }
        | ClientMessage::SpeechError { .. }) => {
            if let Some(event) = msg.into_synthesis_event() {
                chat.handle_synthesis(event).await;
            }
        }
    }
}
