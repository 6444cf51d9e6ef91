//! Codec for encoding and decoding Legalize realtime messages.
//!
//! Messages travel as JSON objects in text frames.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::frames::{InboundMessage, MessageKind, OutboundMessage};

/// Maximum encoded message size (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Inbound discriminator member.
pub const KIND_FIELD: &str = "kind";

/// Discriminator member used by outbound messages, also accepted inbound.
pub const TYPE_FIELD: &str = "type";

/// Inbound payload member.
pub const PAYLOAD_FIELD: &str = "payload";

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum size.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// The frame has no string discriminator.
    #[error("Message has no string `kind` or `type` member")]
    MissingKind,

    /// Outbound fields cannot be merged into the envelope.
    #[error("Invalid fields: {0}")]
    InvalidFields(&'static str),
}

/// Decode an inbound message from a frame.
///
/// The discriminator is read from `kind`, falling back to `type`. The
/// `payload` member becomes [`InboundMessage::payload`] and all remaining
/// members are kept in [`InboundMessage::fields`].
///
/// # Errors
///
/// Returns an error if the frame is too large, is not a JSON object, or has
/// no string discriminator.
pub fn decode(data: &[u8]) -> Result<InboundMessage, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    let mut object = match serde_json::from_slice::<Value>(data)? {
        Value::Object(object) => object,
        _ => return Err(ProtocolError::NotAnObject),
    };

    let kind = take_discriminator(&mut object)?;
    let payload = object.remove(PAYLOAD_FIELD).unwrap_or(Value::Null);

    Ok(InboundMessage {
        kind,
        payload,
        fields: object,
    })
}

fn take_discriminator(object: &mut Map<String, Value>) -> Result<MessageKind, ProtocolError> {
    let field = if object.contains_key(KIND_FIELD) {
        KIND_FIELD
    } else {
        TYPE_FIELD
    };

    match object.remove(field) {
        Some(Value::String(kind)) => Ok(MessageKind::from(kind)),
        _ => Err(ProtocolError::MissingKind),
    }
}

/// Encode an outbound message to a JSON text frame.
///
/// The envelope is `{"type": ..., ...fields}`; the discriminator always wins
/// over a `type` member inside the fields.
///
/// # Errors
///
/// Returns an error if custom fields are not an object or the encoded
/// message is too large.
pub fn encode(message: &OutboundMessage) -> Result<String, ProtocolError> {
    let mut object = Map::new();

    match message {
        OutboundMessage::Subscribe { channel } | OutboundMessage::Unsubscribe { channel } => {
            object.insert("channel".to_string(), Value::String(channel.clone()));
        }
        OutboundMessage::Custom { fields, .. } => match fields {
            Value::Object(fields) => object.extend(fields.clone()),
            Value::Null => {}
            _ => return Err(ProtocolError::InvalidFields("fields must be a JSON object")),
        },
    }

    object.insert(
        TYPE_FIELD.to_string(),
        Value::String(message.message_type().to_string()),
    );

    let text = serde_json::to_string(&Value::Object(object))?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_kind_and_payload() {
        let msg = decode(br#"{"kind":"payment_status","payload":{"status":"completed"}}"#)
            .unwrap();
        assert_eq!(msg.kind, MessageKind::PaymentStatus);
        assert_eq!(msg.payload, json!({"status": "completed"}));
        assert!(msg.fields.is_empty());
    }

    #[test]
    fn test_decode_type_fallback_keeps_fields() {
        let msg = decode(br#"{"type":"case_update","case_id":12,"status":"closed"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::CaseUpdate);
        assert_eq!(msg.payload, Value::Null);
        assert_eq!(msg.field("case_id"), Some(&json!(12)));
        assert!(msg.field("type").is_none());
    }

    #[test]
    fn test_decode_kind_wins_over_type() {
        let msg = decode(br#"{"kind":"notification","type":"legacy"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Notification);
        assert_eq!(msg.field("type"), Some(&json!("legacy")));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode(b"not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode(b"[1,2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(
            decode(br#"{"payload":{}}"#),
            Err(ProtocolError::MissingKind)
        ));
        assert!(matches!(
            decode(br#"{"kind":42}"#),
            Err(ProtocolError::MissingKind)
        ));
    }

    #[test]
    fn test_decode_too_large() {
        let data = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(decode(&data), Err(ProtocolError::FrameTooLarge(_))));
    }

    #[test]
    fn test_encode_subscribe() {
        let text = encode(&OutboundMessage::subscribe("case:42")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "subscribe", "channel": "case:42"}));
    }

    #[test]
    fn test_encode_custom_spreads_fields() {
        let msg = OutboundMessage::custom("typing", json!({"case_id": 3, "type": "spoofed"}));
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        assert_eq!(value, json!({"type": "typing", "case_id": 3}));
    }

    #[test]
    fn test_encode_rejects_scalar_fields() {
        let msg = OutboundMessage::custom("typing", json!(5));
        assert!(matches!(encode(&msg), Err(ProtocolError::InvalidFields(_))));
    }
}
