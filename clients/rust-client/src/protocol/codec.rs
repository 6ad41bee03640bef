use bson::{Bson, Document};

use super::error::ProtocolError;

pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Numeric handling applied when turning extended JSON back into BSON.
///
/// Relaxed decoding coerces 64-bit integers to doubles, the way a browser
/// client would read them. Strict decoding keeps `$numberLong` values exact,
/// which matters for cursor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub relaxed: bool,
}

impl DecodeOptions {
    pub fn relaxed() -> Self {
        Self { relaxed: true }
    }

    pub fn strict() -> Self {
        Self { relaxed: false }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::relaxed()
    }
}

/// A single socket frame. Text and binary frames carry the same UTF-8
/// extended JSON payload and are decoded identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

/// Encode a document as canonical extended JSON.
///
/// Canonical form is lossless: int64, decimal128, binary subtypes, dates and
/// regular expressions all survive the trip.
pub fn encode_message(message: &Document) -> Result<String, ProtocolError> {
    let value = Bson::Document(message.clone()).into_canonical_extjson();
    let text = serde_json::to_string(&value)
        .map_err(|e| ProtocolError::Encode(format!("Serialization failed: {}", e)))?;

    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }

    Ok(text)
}

pub fn decode_message(data: &[u8], options: DecodeOptions) -> Result<Document, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge);
    }

    let value: serde_json::Value = serde_json::from_slice(data)
        .map_err(|e| ProtocolError::Decode(format!("Deserialization failed: {}", e)))?;
    let value = Bson::try_from(value)
        .map_err(|e| ProtocolError::Decode(format!("Invalid extended JSON: {}", e)))?;
    let value = if options.relaxed { relax(value) } else { value };

    match value {
        Bson::Document(doc) => Ok(doc),
        other => Err(ProtocolError::Decode(format!(
            "expected a document, found {:?}",
            other.element_type()
        ))),
    }
}

/// Apply relaxed numeric coercion to an already decoded value.
pub fn relax(value: Bson) -> Bson {
    match value {
        Bson::Int64(v) => Bson::Double(v as f64),
        Bson::Array(items) => Bson::Array(items.into_iter().map(relax).collect()),
        Bson::Document(doc) => Bson::Document(doc.into_iter().map(|(k, v)| (k, relax(v))).collect()),
        other => other,
    }
}

/// Serialize a command document to raw BSON bytes wrapped as generic binary,
/// the shape document-store commands travel in.
pub fn encode_command_binary(command: &Document) -> Result<Bson, ProtocolError> {
    let bytes = bson::to_vec(command)
        .map_err(|e| ProtocolError::Encode(format!("BSON serialization failed: {}", e)))?;
    Ok(Bson::Binary(bson::Binary {
        subtype: bson::spec::BinarySubtype::Generic,
        bytes,
    }))
}

pub fn decode_command_binary(bytes: &[u8]) -> Result<Document, ProtocolError> {
    Document::from_reader(bytes)
        .map_err(|e| ProtocolError::Decode(format!("BSON deserialization failed: {}", e)))
}
