//! The message envelope sent by publishers and received by subscribers.

/// A message on a topic.
///
/// Immutable once built: the fields are only readable, and
/// [`with_changes`](StreamMessage::with_changes) produces a new message.
///
/// ## Example
///
/// ```
/// use stream_bus::StreamMessage;
///
/// let msg = StreamMessage::new("orders", b"created".to_vec());
/// let moved = msg.with_topic("orders.archive");
///
/// assert_eq!(msg.topic(), "orders");
/// assert_eq!(moved.topic(), "orders.archive");
/// assert_eq!(moved.payload(), b"created");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamMessage {
    topic: String,
    payload: Vec<u8>,
}

/// Partial set of field overrides for [`StreamMessage::with_changes`].
#[derive(Clone, Debug, Default)]
pub struct MessageChanges {
    pub topic: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl MessageChanges {
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

impl StreamMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Copy this message, replacing the fields set in `changes`.
    pub fn with_changes(&self, changes: MessageChanges) -> Self {
        Self {
            topic: changes.topic.unwrap_or_else(|| self.topic.clone()),
            payload: changes.payload.unwrap_or_else(|| self.payload.clone()),
        }
    }

    pub fn with_topic(&self, topic: impl Into<String>) -> Self {
        self.with_changes(MessageChanges::default().topic(topic))
    }

    pub fn with_payload(&self, payload: impl Into<Vec<u8>>) -> Self {
        self.with_changes(MessageChanges::default().payload(payload))
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.topic, self.payload)
    }
}
