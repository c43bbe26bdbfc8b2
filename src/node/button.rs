//! Button role: two push buttons command the peer's LED; status replies are only reported.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::debounce::{Debouncer, Edge};
use super::NodeRole;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::hal::InputLine;
use crate::mqtt::codec::{CommandCodec, CommandMessage, LedState, StatusMessage};
use crate::mqtt::router::{HandlerResult, TopicRouter};
use crate::mqtt::topics::{NodeIdentity, Topic};
use crate::mqtt::transport::OutboundFrame;

struct Button {
    line: Box<dyn InputLine>,
    debouncer: Debouncer,
    cmd: LedState,
}

pub struct ButtonNode {
    identity: NodeIdentity,
    peer: NodeIdentity,
    codec: CommandCodec,
    buttons: [Button; 2],
    diagnostics: Diagnostics,
    last_status: Option<StatusMessage>,
}

impl ButtonNode {
    pub fn new(
        identity: NodeIdentity,
        peer: NodeIdentity,
        codec: CommandCodec,
        on: Box<dyn InputLine>,
        off: Box<dyn InputLine>,
        debounce: Duration,
        diagnostics: Diagnostics,
    ) -> Self {
        info!(
            "Button node {} commanding {} (debounce {}ms)",
            identity,
            peer,
            debounce.as_millis()
        );
        Self {
            identity,
            peer,
            codec,
            buttons: [
                Button {
                    line: on,
                    debouncer: Debouncer::new(debounce),
                    cmd: LedState::On,
                },
                Button {
                    line: off,
                    debouncer: Debouncer::new(debounce),
                    cmd: LedState::Off,
                },
            ],
            diagnostics,
            last_status: None,
        }
    }

    pub fn peer(&self) -> &NodeIdentity {
        &self.peer
    }

    /// Most recent status reported by the peer.
    pub fn last_status(&self) -> Option<&StatusMessage> {
        self.last_status.as_ref()
    }

    fn on_status(&mut self, payload: &[u8]) -> HandlerResult {
        let status = self.codec.decode_status(payload)?;
        self.diagnostics.emit(
            DiagnosticKind::PeerStatus,
            format!("{} LED is {}: {}", self.peer, status.status, status.message),
        );
        self.last_status = Some(status);
        Ok(None)
    }

    fn command(&self, cmd: LedState) -> Option<OutboundFrame> {
        let msg = CommandMessage {
            sender_id: self.identity.clone(),
            cmd,
        };
        match self.codec.encode_command(&msg) {
            Ok(payload) => Some(OutboundFrame {
                topic: Topic::command_for(&self.peer),
                payload,
            }),
            Err(e) => {
                error!("Command '{}' not encoded: {}", cmd, e);
                None
            }
        }
    }
}

impl NodeRole for ButtonNode {
    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![Topic::status_for(&self.identity)]
    }

    fn register_routes(&self, router: &mut TopicRouter<Self>) {
        router.register(Topic::status_for(&self.identity), ButtonNode::on_status);
    }

    fn sample(&mut self, now: Instant, ready: bool) -> Vec<OutboundFrame> {
        let mut pressed = Vec::new();
        for button in &mut self.buttons {
            let raw = match button.line.is_active() {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Reading button '{}' failed: {}", button.line.name(), e);
                    continue;
                }
            };
            match button.debouncer.update(raw, now) {
                Some(Edge::Pressed) => pressed.push(button.cmd),
                Some(Edge::Released) => debug!("Button '{}' released", button.line.name()),
                None => {}
            }
        }

        let mut frames = Vec::new();
        for cmd in pressed {
            if !ready {
                self.diagnostics.emit(
                    DiagnosticKind::InputLost,
                    format!("'{}' press dropped, not connected to broker", cmd),
                );
                continue;
            }
            info!("Button '{}' pressed, commanding {}", cmd, self.peer);
            frames.extend(self.command(cmd));
        }
        frames
    }
}
