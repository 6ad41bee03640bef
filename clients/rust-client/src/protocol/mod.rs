//! Wire protocol shared by the relay and its clients
//!
//! Messages are extended JSON documents sent as text (or binary) WebSocket
//! frames. Requests carry `action` and `token`; replies echo the token with
//! either `data` or `error`.

pub mod action;
pub mod codec;
pub mod error;
pub mod response;

pub use action::{Action, ActionKind, CommandPayload, Request, UpdateItem};
pub use codec::{
    decode_command_binary, decode_message, encode_command_binary, encode_message, relax,
    DecodeOptions, Frame, MAX_MESSAGE_SIZE,
};
pub use error::{ClientError, ProtocolError};
pub use response::Reply;
