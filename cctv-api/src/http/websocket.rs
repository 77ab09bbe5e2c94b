//! WebSocket transport for live detection sessions
//!
//! Adapts an axum socket to [`SessionStream`]; the protocol itself lives in
//! `DetectionSession`. Outgoing messages go through a writer task so the
//! session never blocks on the socket directly.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{stream::SplitStream, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use cctv_live::{ClientMessage, ServerMessage};

use crate::http::AppState;
use crate::impls::{DetectionSession, SessionStream};

/// Outgoing buffer between the session and the socket writer
const OUTGOING_CAPACITY: usize = 64;

struct WebSocketStream {
    receiver: SplitStream<WebSocket>,
    sender: mpsc::Sender<Message>,
}

#[async_trait::async_trait]
impl SessionStream for WebSocketStream {
    async fn recv(&mut self) -> Option<Result<ClientMessage, String>> {
        loop {
            match self.receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(
                        serde_json::from_str(text.as_str())
                            .map_err(|e| format!("Invalid client message: {e}")),
                    );
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    return None;
                }
                // Binary payloads and control frames are not part of the protocol
                Some(Ok(_)) => {}
            }
        }
    }

    async fn send(&mut self, message: ServerMessage) -> Result<(), String> {
        let json = message.to_json().map_err(|e| e.to_string())?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| "WebSocket client disconnected".to_string())
    }
}

/// GET /ws/detection/{cctv_id}
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(cctv_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, cctv_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, cctv_id: String) {
    info!(camera_id = %cctv_id, "Detection WebSocket connected");

    let (mut sink, receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTGOING_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("Failed to send WebSocket message: {}", e);
                return;
            }
        }
        let _ = sink.close().await;
    });

    let mut stream = WebSocketStream {
        receiver,
        sender: tx,
    };
    DetectionSession::new(&state, cctv_id.clone())
        .run(&mut stream)
        .await;

    // Dropping the sender lets the writer flush and close the socket
    drop(stream);
    let _ = writer.await;

    info!(camera_id = %cctv_id, "Detection WebSocket closed");
}
