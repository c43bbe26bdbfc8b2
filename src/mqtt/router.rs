use std::collections::HashMap;
use tracing::debug;

use super::error::HandlerError;
use super::topics::Topic;
use super::transport::OutboundFrame;
use crate::diagnostics::{DiagnosticKind, Diagnostics};

/// What a handler produces: optionally one frame to publish in reply.
pub type HandlerResult = Result<Option<OutboundFrame>, HandlerError>;

type Handler<C> = Box<dyn FnMut(&mut C, &[u8]) -> HandlerResult>;

#[derive(Debug)]
pub enum Dispatch {
    Handled(Option<OutboundFrame>),
    /// No handler for the topic; frame discarded.
    Unrouted,
    /// Handler refused the payload; frame discarded.
    Rejected,
}

/// Exact-match table from topic to handler. Handlers receive the role context `C` mutably.
pub struct TopicRouter<C> {
    handlers: HashMap<String, Handler<C>>,
    diagnostics: Diagnostics,
}

impl<C> TopicRouter<C> {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            handlers: HashMap::new(),
            diagnostics,
        }
    }

    /// Registering a topic twice replaces the earlier handler.
    pub fn register<F>(&mut self, topic: Topic, handler: F)
    where
        F: FnMut(&mut C, &[u8]) -> HandlerResult + 'static,
    {
        if self
            .handlers
            .insert(topic.as_str().to_string(), Box::new(handler))
            .is_some()
        {
            debug!("Replaced handler for {}", topic);
        }
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&mut self, ctx: &mut C, topic: &str, payload: &[u8]) -> Dispatch {
        let Some(handler) = self.handlers.get_mut(topic) else {
            self.diagnostics.emit(
                DiagnosticKind::Unrouted,
                format!("Topic \"{}\" unhandled ({} bytes dropped)", topic, payload.len()),
            );
            return Dispatch::Unrouted;
        };

        match handler(ctx, payload) {
            Ok(reply) => Dispatch::Handled(reply),
            Err(e) => {
                self.diagnostics.emit(
                    DiagnosticKind::Rejected,
                    format!("Frame on \"{}\" discarded: {}", topic, e),
                );
                Dispatch::Rejected
            }
        }
    }
}
