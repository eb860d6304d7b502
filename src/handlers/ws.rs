use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::OwnerEvent;
use crate::middleware::auth::{decode_token, AuthError};
use crate::AppState;

const HEARTBEAT_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler. Browsers cannot set headers on the upgrade
/// request, so the bearer token travels as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return AuthError::MissingToken.into_response();
    };
    let owner_id = match decode_token(&state.config.jwt_secret, &token) {
        Ok(claims) => claims.sub,
        Err(e) => {
            tracing::warn!("Invalid WebSocket authentication token");
            return e.into_response();
        }
    };

    let rx = state.notifier.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx, owner_id))
}

/// Only events addressed to the connected owner are forwarded.
fn render_for(event: &OwnerEvent, owner_id: Uuid) -> Option<String> {
    if event.owner_id != owner_id {
        return None;
    }
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize event");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, mut rx: broadcast::Receiver<OwnerEvent>, owner_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(%owner_id, "WebSocket connected");

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => tracing::debug!(%text, "Ignoring client message"),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let Some(json) = render_for(&event, owner_id) else {
                                continue;
                            };
                            if sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(%owner_id, skipped = n, "WebSocket client lagged behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    tracing::info!(%owner_id, "WebSocket connection closed");
}
