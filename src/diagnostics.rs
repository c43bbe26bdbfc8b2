//! Append-only diagnostic stream.
//!
//! Every event goes to `tracing`. When a listener is attached (the console printer in the
//! binary, or a test), events are also forwarded over an unbounded channel; the core never
//! reads them back.

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Frame on a topic with no registered handler.
    Unrouted,
    /// Frame whose handler rejected the payload.
    Rejected,
    /// Status report received from the peer node.
    PeerStatus,
    /// Connection lifecycle change or failed attempt.
    Connection,
    /// Local input dropped because the session was not ready.
    InputLost,
    /// Local output changed.
    Output,
}

#[derive(Clone, Debug)]
pub struct DiagnosticEvent {
    pub kind: DiagnosticKind,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl DiagnosticEvent {
    pub fn new(kind: DiagnosticKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: Local::now(),
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.kind,
            self.text
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    listener: Option<mpsc::UnboundedSender<DiagnosticEvent>>,
}

impl Diagnostics {
    /// Handle that only logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle plus the receiving end of its forwarded events.
    pub fn with_listener() -> (Self, mpsc::UnboundedReceiver<DiagnosticEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { listener: Some(tx) }, rx)
    }

    pub fn emit(&self, kind: DiagnosticKind, text: impl Into<String>) {
        let event = DiagnosticEvent::new(kind, text);
        match event.kind {
            DiagnosticKind::Unrouted | DiagnosticKind::Rejected | DiagnosticKind::InputLost => {
                warn!("{:?}: {}", event.kind, event.text)
            }
            _ => info!("{:?}: {}", event.kind, event.text),
        }
        if let Some(listener) = &self.listener {
            // A dropped listener only means nobody is watching any more.
            let _ = listener.send(event);
        }
    }
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<DiagnosticEvent>) -> Vec<DiagnosticEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
