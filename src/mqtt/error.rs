//! Error types for the broker session and payload codec.
//!
//! None of these are fatal to a node: connect and subscribe failures feed the reconnect path,
//! decode failures are discarded with a diagnostic, and publish failures are caller bugs the
//! runtime guards against by checking readiness first.

use thiserror::Error;

/// Failures reported by a [`Transport`](super::transport::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Broker rejected client: {0}")]
    Rejected(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Request could not be queued: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Transport unreachable: {0}")]
    Unreachable(TransportError),

    #[error("Identity {identity} rejected by broker: {reason}")]
    IdentityRejected { identity: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Subscription attempted outside the connect handshake.
    #[error("Subscribe not permitted in state {0:?}")]
    InvalidState(super::session::ConnectionState),

    #[error("Subscription to {topic} failed: {source}")]
    Failed {
        topic: String,
        #[source]
        source: TransportError,
    },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Session not ready (state {0:?})")]
    NotReady(super::session::ConnectionState),

    #[error("Frame of {size} bytes exceeds transport limit of {limit} bytes")]
    Oversize { size: usize, limit: usize },

    #[error("Transport refused publish: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Unrecognized value '{value}' for field '{field}'")]
    UnknownValue { field: &'static str, value: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Encoded payload of {size} bytes exceeds limit of {limit} bytes")]
    Oversize { size: usize, limit: usize },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure anywhere in connect → subscribe → ready. Both halves take the same retry path.
#[derive(Debug, Error)]
pub enum EstablishError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),
}

/// Errors a message handler can report back to the router.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Output failed: {0}")]
    Output(#[from] crate::hal::HalError),
}
