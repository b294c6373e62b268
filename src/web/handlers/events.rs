//! WebSocket stream of store events.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::storage::StoreEvent;
use crate::web::handlers::AppState;

/// GET /api/events - Upgrade to a WebSocket that receives every store event.
pub async fn events(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    // Subscribe before the upgrade so nothing committed afterwards is missed.
    let rx = state.store.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

async fn stream_events(socket: WebSocket, mut rx: broadcast::Receiver<StoreEvent>) {
    let (mut sender, mut receiver) = socket.split();
    debug!("Event subscriber connected");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize store event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Event subscriber disconnected");
}
