use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::DecodeError;

/// Broker client id of a node, also used as the first segment of every topic addressed to it.
///
/// Validated on construction: non-empty, no whitespace and none of the MQTT topic
/// separators or wildcards (`/`, `+`, `#`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn new(id: impl Into<String>) -> Result<Self, DecodeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DecodeError::InvalidField {
                field: "senderID",
                reason: "identity is empty".to_string(),
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| matches!(c, '/' | '+' | '#') || c.is_whitespace())
        {
            return Err(DecodeError::InvalidField {
                field: "senderID",
                reason: format!("identity '{}' contains forbidden character '{}'", id, c),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeIdentity {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeIdentity> for String {
    fn from(id: NodeIdentity) -> Self {
        id.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    LedCommand,
    LedStatus,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::LedCommand => "ledCommand",
            MessageKind::LedStatus => "ledStatus",
        }
    }
}

impl FromStr for MessageKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ledCommand" => Ok(MessageKind::LedCommand),
            "ledStatus" => Ok(MessageKind::LedStatus),
            other => Err(DecodeError::UnknownValue {
                field: "messageKind",
                value: other.to_string(),
            }),
        }
    }
}

/// A concrete `<recipient>/<kind>` topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    recipient: NodeIdentity,
    kind: MessageKind,
    name: String,
}

impl Topic {
    pub fn new(recipient: &NodeIdentity, kind: MessageKind) -> Self {
        Self {
            name: format!("{}/{}", recipient, kind.as_str()),
            recipient: recipient.clone(),
            kind,
        }
    }

    pub fn command_for(recipient: &NodeIdentity) -> Self {
        Self::new(recipient, MessageKind::LedCommand)
    }

    pub fn status_for(recipient: &NodeIdentity) -> Self {
        Self::new(recipient, MessageKind::LedStatus)
    }

    pub fn parse(name: &str) -> Result<Self, DecodeError> {
        let (recipient, kind) = name.split_once('/').ok_or_else(|| {
            DecodeError::Malformed(format!("topic '{}' has no kind segment", name))
        })?;
        Ok(Self::new(&NodeIdentity::new(recipient)?, kind.parse()?))
    }

    pub fn recipient(&self) -> &NodeIdentity {
        &self.recipient
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}
