use thiserror::Error;

/// Failures while encoding, decoding or validating a wire message.
///
/// The `Display` renderings of the validation variants are the exact strings
/// the relay puts into failure envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid command")]
    InvalidCommand,

    #[error("invalid url")]
    InvalidUrl,

    #[error("unknown action")]
    UnknownAction(String),

    #[error("missing token")]
    MissingToken,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Message too large")]
    MessageTooLarge,
}

/// Failures surfaced to callers of the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The socket is not open; nothing was sent.
    #[error("socket not connected")]
    NotOpen,

    /// The relay answered with a failure envelope.
    #[error("{0}")]
    Server(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The client was dropped before a reply arrived.
    #[error("connection closed")]
    Closed,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}
