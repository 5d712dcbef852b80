//! Messages and publishings.
//!
//! A [`Message`] is the immutable unit that crosses the broker. The outbox
//! stores a [`Publishing`] (the message plus its destination topic); the inbox
//! stores the bare message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Destination routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application-level discriminator, e.g. `"user.created"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Caller-assigned unique id; doubles as the idempotency key.
    pub id: String,
    pub message_type: MessageType,
    /// Opaque bytes.
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        message_type: impl Into<MessageType>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }

    /// Build a message whose payload is `value` encoded as JSON.
    pub fn json<T: Serialize>(
        id: impl Into<String>,
        message_type: impl Into<MessageType>,
        value: &T,
    ) -> Result<Self> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| Error::op("domain.Message.json").wrap(e.into()))?;
        Ok(Self::new(id, message_type, payload))
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| Error::op("domain.Message.decode_json").wrap(e.into()))
    }
}

/// An outbox row: a message bound for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publishing {
    pub topic: Topic,
    pub message: Message,
}

impl Publishing {
    pub fn new(topic: impl Into<Topic>, message: Message) -> Self {
        Self {
            topic: topic.into(),
            message,
        }
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }
}
