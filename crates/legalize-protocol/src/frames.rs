//! Message types for the Legalize realtime protocol.
//!
//! Every frame on the wire is a JSON object. Inbound frames carry a `kind`
//! discriminator, outbound frames a `type` discriminator; all other members
//! are specific to the message variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Close code for a normal, requested closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the stream ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Kind of an inbound message.
///
/// The six kinds pushed by the Legalize backend have their own variants;
/// anything else is preserved verbatim in [`MessageKind::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// A new user notification.
    Notification,
    /// A case changed status or details.
    CaseUpdate,
    /// An appointment was created, moved or cancelled.
    AppointmentUpdate,
    /// A comment was added to a case.
    CommentAdded,
    /// An AI suggestion finished processing.
    AiSuggestionReady,
    /// A payment changed status.
    PaymentStatus,
    /// Any kind not listed above.
    Unknown(String),
}

impl MessageKind {
    /// All kinds with a dedicated variant.
    pub const KNOWN: [MessageKind; 6] = [
        MessageKind::Notification,
        MessageKind::CaseUpdate,
        MessageKind::AppointmentUpdate,
        MessageKind::CommentAdded,
        MessageKind::AiSuggestionReady,
        MessageKind::PaymentStatus,
    ];

    /// Get the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Notification => "notification",
            MessageKind::CaseUpdate => "case_update",
            MessageKind::AppointmentUpdate => "appointment_update",
            MessageKind::CommentAdded => "comment_added",
            MessageKind::AiSuggestionReady => "ai_suggestion_ready",
            MessageKind::PaymentStatus => "payment_status",
            MessageKind::Unknown(name) => name,
        }
    }

    /// Check whether this kind has a dedicated variant.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, MessageKind::Unknown(_))
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        match s {
            "notification" => MessageKind::Notification,
            "case_update" => MessageKind::CaseUpdate,
            "appointment_update" => MessageKind::AppointmentUpdate,
            "comment_added" => MessageKind::CommentAdded,
            "ai_suggestion_ready" => MessageKind::AiSuggestionReady,
            "payment_status" => MessageKind::PaymentStatus,
            other => MessageKind::Unknown(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match MessageKind::from(s.as_str()) {
            MessageKind::Unknown(_) => MessageKind::Unknown(s),
            known => known,
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> String {
        match kind {
            MessageKind::Unknown(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Message kind.
    pub kind: MessageKind,
    /// The `payload` member, or `Null` if the frame had none.
    pub payload: Value,
    /// Every other top-level member except the discriminator.
    pub fields: Map<String, Value>,
}

impl InboundMessage {
    /// Create a new inbound message with no extra fields.
    #[must_use]
    pub fn new(kind: impl Into<MessageKind>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            fields: Map::new(),
        }
    }

    /// Attach an extra top-level field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up an extra top-level field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Discriminator of a channel subscription request.
pub const SUBSCRIBE_TYPE: &str = "subscribe";

/// Discriminator of a channel unsubscription request.
pub const UNSUBSCRIBE_TYPE: &str = "unsubscribe";

/// An outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Subscribe to a logical channel.
    Subscribe {
        /// Channel name.
        channel: String,
    },

    /// Unsubscribe from a logical channel.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },

    /// Free-form application message.
    Custom {
        /// Value of the `type` member.
        message_type: String,
        /// Members sent alongside `type`. Must be an object or `Null`.
        fields: Value,
    },
}

impl OutboundMessage {
    /// Create a Subscribe message.
    #[must_use]
    pub fn subscribe(channel: impl Into<String>) -> Self {
        OutboundMessage::Subscribe {
            channel: channel.into(),
        }
    }

    /// Create an Unsubscribe message.
    #[must_use]
    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        OutboundMessage::Unsubscribe {
            channel: channel.into(),
        }
    }

    /// Create an application message.
    #[must_use]
    pub fn custom(message_type: impl Into<String>, fields: Value) -> Self {
        OutboundMessage::Custom {
            message_type: message_type.into(),
            fields,
        }
    }

    /// Get the `type` discriminator.
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            OutboundMessage::Subscribe { .. } => SUBSCRIBE_TYPE,
            OutboundMessage::Unsubscribe { .. } => UNSUBSCRIBE_TYPE,
            OutboundMessage::Custom { message_type, .. } => message_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_kinds_roundtrip_names() {
        for kind in MessageKind::KNOWN {
            assert!(kind.is_known());
            assert_eq!(MessageKind::from(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_unknown_kind_preserved() {
        let kind = MessageKind::from("document_shared".to_string());
        assert_eq!(kind, MessageKind::Unknown("document_shared".into()));
        assert!(!kind.is_known());
        assert_eq!(kind.to_string(), "document_shared");
    }

    #[test]
    fn test_kind_serde_as_string() {
        let value = serde_json::to_value(MessageKind::CaseUpdate).unwrap();
        assert_eq!(value, json!("case_update"));

        let kind: MessageKind = serde_json::from_value(json!("payment_status")).unwrap();
        assert_eq!(kind, MessageKind::PaymentStatus);
    }

    #[test]
    fn test_outbound_message_type() {
        assert_eq!(OutboundMessage::subscribe("case:1").message_type(), "subscribe");
        assert_eq!(
            OutboundMessage::unsubscribe("case:1").message_type(),
            "unsubscribe"
        );
        assert_eq!(
            OutboundMessage::custom("typing", Value::Null).message_type(),
            "typing"
        );
    }

    #[test]
    fn test_inbound_fields() {
        let msg = InboundMessage::new(MessageKind::CommentAdded, json!({"text": "hi"}))
            .with_field("case_id", json!(7));
        assert_eq!(msg.field("case_id"), Some(&json!(7)));
        assert!(msg.field("missing").is_none());
    }
}
