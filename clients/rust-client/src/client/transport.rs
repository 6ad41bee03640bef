use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::Correlator;
use crate::protocol::{ClientError, Frame};

/// Lifecycle of the client socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Open a WebSocket to the relay and wire it to a fresh [`Correlator`].
///
/// A writer task drains outgoing frames and a reader task feeds incoming
/// frames back; when either side ends the state flips to `Closed`.
pub async fn connect_websocket(url: &str) -> Result<Arc<Correlator>, ClientError> {
    let (correlator, mut outgoing) = Correlator::new();

    tracing::debug!("[WS] Connecting to {}", url);
    let (ws_stream, _) = connect_async(url).await.map_err(|e| {
        correlator.set_state(ConnectionState::Closed);
        ClientError::Connection(format!("Failed to connect to {}: {}", url, e))
    })?;
    let (mut write, mut read) = ws_stream.split();

    correlator.set_state(ConnectionState::Open);

    let writer = correlator.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outgoing.recv() => {
                    let Some(frame) = frame else { break };
                    let message = match frame {
                        Frame::Text(text) => Message::Text(text.into()),
                        Frame::Binary(bytes) => Message::Binary(bytes.into()),
                    };
                    if let Err(e) = write.send(message).await {
                        tracing::debug!("[WS] Failed to send frame, closing writer: {}", e);
                        break;
                    }
                }
                _ = writer.shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer.set_state(ConnectionState::Closed);
    });

    let reader = correlator.clone();
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => reader.handle_frame(text.as_bytes()),
                Ok(Message::Binary(bytes)) => reader.handle_frame(&bytes),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("[WS] Read error: {}", e);
                    break;
                }
            }
        }
        reader.set_state(ConnectionState::Closed);
        // Release the writer too.
        reader.shutdown.notify_one();
    });

    Ok(correlator)
}
