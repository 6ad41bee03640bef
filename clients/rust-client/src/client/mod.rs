//! Request correlation over a single duplex socket
//!
//! Every request gets a fresh token; replies are matched back to the waiting
//! caller by that token alone, so any number of calls may be in flight and
//! replies may arrive in any order.

mod builder;
mod cursor;
mod database;
mod transport;

pub use builder::DbBrowserClientBuilder;
pub use cursor::{cursor_id, drain_cursor, is_ok, CursorState};
pub use database::{ColumnInfo, DbBrowserClient, TableInfo};
pub use transport::{connect_websocket, ConnectionState};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bson::{Bson, Document};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use uuid::Uuid;

use super::protocol::{
    decode_message, encode_message, ClientError, DecodeOptions, Frame, Reply,
};

struct PendingCall {
    reply: oneshot::Sender<Result<Bson, ClientError>>,
    options: Option<DecodeOptions>,
}

type PendingMap = Mutex<HashMap<String, PendingCall>>;

/// Token bookkeeping for one socket.
///
/// Outgoing frames are handed to whatever transport drains the receiver
/// returned by [`Correlator::new`]; incoming frames are fed back through
/// [`Correlator::handle_frame`].
pub struct Correlator {
    outgoing: mpsc::UnboundedSender<Frame>,
    pending: Arc<PendingMap>,
    state: watch::Sender<ConnectionState>,
    pub(crate) shutdown: Notify,
}

impl Correlator {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let correlator = Arc::new(Self {
            outgoing,
            pending: Arc::new(Mutex::new(HashMap::new())),
            state,
            shutdown: Notify::new(),
        });
        (correlator, rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe open/close transitions. The receiver always holds the latest state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Socket state {:?} -> {:?}", previous, state);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send `payload` with a fresh token and return the reply handle.
    ///
    /// Fails without allocating a token when the socket is not open.
    pub fn send(
        &self,
        mut payload: Document,
        options: Option<DecodeOptions>,
    ) -> Result<PendingReply, ClientError> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::NotOpen);
        }

        let token = Uuid::new_v4().to_string();
        payload.insert("token", token.as_str());
        let text = encode_message(&payload)?;

        let (reply, rx) = oneshot::channel();
        self.pending
            .lock()
            .insert(token.clone(), PendingCall { reply, options });

        if self.outgoing.send(Frame::Text(text)).is_err() {
            self.pending.lock().remove(&token);
            return Err(ClientError::NotOpen);
        }

        Ok(PendingReply {
            token,
            rx,
            pending: Arc::downgrade(&self.pending),
        })
    }

    pub async fn call(
        &self,
        payload: Document,
        options: Option<DecodeOptions>,
    ) -> Result<Bson, ClientError> {
        self.send(payload, options)?.await
    }

    /// Route one incoming frame to the call that owns its token.
    ///
    /// The token is read from an untyped first pass; the full decode then
    /// uses the options remembered for that call, and a decode failure
    /// rejects that caller only. Frames with no readable token, or whose
    /// token is not pending, are dropped.
    pub fn handle_frame(&self, data: &[u8]) {
        let token = match serde_json::from_slice::<serde_json::Value>(data) {
            Ok(value) => value
                .get("token")
                .and_then(|token| token.as_str())
                .map(str::to_string),
            Err(e) => {
                tracing::error!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        let Some(token) = token else {
            tracing::warn!("Dropping frame without token");
            return;
        };

        let Some(call) = self.pending.lock().remove(&token) else {
            tracing::trace!("No pending call for token {}", token);
            return;
        };

        let outcome = decode_message(data, call.options.unwrap_or_default())
            .and_then(Reply::from_document)
            .map_err(ClientError::from)
            .and_then(|reply| reply.into_result().map_err(ClientError::Server));

        // The caller may have stopped waiting.
        let _ = call.reply.send(outcome);
    }
}

/// Future resolving to the data of the reply carrying `token`.
///
/// Dropping it before the reply arrives (a timeout, a lost `select!`
/// branch) forgets the token; a late reply is then ignored.
#[derive(Debug)]
pub struct PendingReply {
    token: String,
    rx: oneshot::Receiver<Result<Bson, ClientError>>,
    pending: Weak<PendingMap>,
}

impl PendingReply {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Future for PendingReply {
    type Output = Result<Bson, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(ClientError::Closed)))
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.upgrade() {
            pending.lock().remove(&self.token);
        }
    }
}
