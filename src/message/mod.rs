use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Whether the channel a message arrived on is a shared room or a one-on-one
/// chat. Drivers classify this from the platform payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Direct,
    Public,
}

/// Typed media payload attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    Image {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    Video {
        url: String,
    },
    Audio {
        url: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Contact {
        phone: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// One inbound chat message, created once per webhook delivery by the driver.
///
/// Immutable during dispatch except for the `received` middleware
/// normalization pass. The `id` identifies this message instance for
/// per-message middleware idempotency tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub driver: String,
    pub sender_id: String,
    pub channel_id: String,
    pub channel_kind: ChannelKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Opaque platform payload; parsing it belongs to the driver.
    #[serde(default)]
    pub raw: Value,
    #[serde(default)]
    pub extras: HashMap<String, Value>,
    #[serde(default)]
    pub from_bot: bool,
}

impl IncomingMessage {
    pub fn new(
        driver: impl Into<String>,
        sender_id: impl Into<String>,
        channel_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver: driver.into(),
            sender_id: sender_id.into(),
            channel_id: channel_id.into(),
            channel_kind: ChannelKind::Direct,
            content: content.into(),
            timestamp: Utc::now(),
            attachment: None,
            raw: Value::Null,
            extras: HashMap::new(),
            from_bot: false,
        }
    }

    pub fn with_channel_kind(mut self, kind: ChannelKind) -> Self {
        self.channel_kind = kind;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn from_bot(mut self) -> Self {
        self.from_bot = true;
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }
}

/// A reply extracted from an inbound message during an active conversation.
///
/// For plain text replies `text` mirrors the message content. Interactive
/// drivers (button taps, quick replies) set `interactive` and carry the
/// structured payload in `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub interactive: bool,
    pub message: IncomingMessage,
}

impl Answer {
    pub fn from_message(message: &IncomingMessage) -> Self {
        Self {
            text: message.content.clone(),
            value: None,
            interactive: false,
            message: message.clone(),
        }
    }

    pub fn from_interactive(message: &IncomingMessage, value: Value) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            text,
            value: Some(value),
            interactive: true,
            message: message.clone(),
        }
    }

    /// The string form of the answer used for pattern matching: the
    /// structured value when present, otherwise the answer text.
    pub fn value_text(&self) -> String {
        match &self.value {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self.text.clone(),
        }
    }
}

/// Outbound payload handed to the driver for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub extras: HashMap<String, Value>,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
            extras: HashMap::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// The platform user behind a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Result of an outbound delivery, as reported by the driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Platform-specific ID of the sent message, when the platform returns one.
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}
