//! WebSocket endpoint: one [`ConnectionId`] per socket, events routed to the coordinator

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::download::events::{messages, ClientEvent, EventSender, ServerEvent};
use crate::download::{ConnectionId, Coordinator};
use crate::web::server::AppState;

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: Coordinator) {
    let conn = ConnectionId::new();
    log::info!("A user connected: {}", conn);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&coordinator, conn, text.as_str(), &tx),
            Ok(Message::Close(_)) => break,
            // Ping/pong is answered by axum, binary frames are not part of the protocol
            Ok(_) => {}
            Err(e) => {
                log::debug!("WebSocket error on {}: {}", conn, e);
                break;
            }
        }
    }

    coordinator.disconnect(conn);
    // Session tasks may still hold senders; nobody is listening anymore
    writer.abort();
}

/// Dispatches one text frame from `conn`.
pub(crate) fn handle_frame(coordinator: &Coordinator, conn: ConnectionId, frame: &str, events: &EventSender) {
    match ClientEvent::parse(frame) {
        Ok(ClientEvent::DownloadVideo(request)) => {
            coordinator.request_download(conn, request, events.clone());
        }
        Ok(ClientEvent::CancelDownload) => {
            coordinator.cancel(conn);
        }
        Err(e) => {
            log::warn!("Bad frame from {}: {}", conn, e);
            if events.send(ServerEvent::error(messages::INVALID_REQUEST)).is_err() {
                log::debug!("Connection {} gone before error could be sent", conn);
            }
        }
    }
}
