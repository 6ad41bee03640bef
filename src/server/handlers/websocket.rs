use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::dispatch;
use crate::protocol::{decode_message, encode_message, DecodeOptions, Frame, Reply, Request};
use crate::server::session::Session;
use crate::server::AppState;

const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// WebSocket handler for the browser's database session
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = Arc::new(Session::new(state.driver.clone()));
    let active = state.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!("[WS] Session {} opened ({} active)", session.id(), active);

    let (mut sender, mut receiver) = socket.split();

    // Replies from concurrently running actions are funneled through one writer
    let (tx, mut rx) = mpsc::channel::<Message>(1000);

    let send_task = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = heartbeat_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        tracing::debug!("[WS] Failed to send ping, closing writer");
                        break;
                    }
                }
                Some(msg) = rx.recv() => {
                    if sender.send(msg).await.is_err() {
                        tracing::debug!("[WS] Failed to send message, closing writer");
                        break;
                    }
                }
                else => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => Frame::Text(text.to_string()),
            Ok(Message::Binary(bytes)) => Frame::Binary(bytes.to_vec()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("[WS] Session {} read error: {}", session.id(), e);
                break;
            }
        };

        // Actions on one socket may run concurrently; replies carry their token.
        let session = session.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = handle_frame(&session, frame.as_bytes()).await {
                if let Some(message) = encode_reply(reply) {
                    let _ = tx.send(message).await;
                }
            }
        });
    }

    send_task.abort();
    session.close().await;

    let active = state.active_sessions.fetch_sub(1, Ordering::Relaxed) - 1;
    tracing::info!("[WS] Session {} closed ({} active)", session.id(), active);
}

/// Decode one frame and run its action. Frames that cannot be decoded or
/// carry no token get no reply, since nothing could correlate it.
pub async fn handle_frame(session: &Session, data: &[u8]) -> Option<Reply> {
    let message = match decode_message(data, DecodeOptions::strict()) {
        Ok(message) => message,
        Err(e) => {
            tracing::error!("[WS] Session {}: dropping undecodable frame: {}", session.id(), e);
            return None;
        }
    };

    let request = match Request::from_document(&message) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("[WS] Session {}: dropping frame: {}", session.id(), e);
            return None;
        }
    };

    Some(dispatch(session, request).await)
}

fn encode_reply(reply: Reply) -> Option<Message> {
    match encode_message(&reply.to_document()) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!("[WS] Failed to encode reply: {}", e);
            // Still answer the caller so its call settles.
            let fallback = Reply::error(reply.token(), e);
            encode_message(&fallback.to_document())
                .ok()
                .map(|text| Message::Text(text.into()))
        }
    }
}
