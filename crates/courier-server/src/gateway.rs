use axum::{
    extract::{Path, State, WebSocketUpgrade},
    extract::ws::{Message as WsMessage, WebSocket},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::AppState;

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Stream every event addressed to `user_id` down the socket as tagged
/// JSON: incoming messages plus read receipts for messages they sent. Goes
/// through the same `subscribe_to_events` path library callers use, so the
/// layout filtering rules apply identically here.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = match state
        .messaging
        .subscribe_to_events(&user_id, move |event| {
            let _ = tx.send(event);
        })
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Gateway subscription for {} failed: {}", user_id, e);
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unserializable event: {}", e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // The read side only watches for the client going away
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            if let WsMessage::Close(_) = frame {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    subscription.unsubscribe();
    info!("{} disconnected from gateway", user_id);
}
