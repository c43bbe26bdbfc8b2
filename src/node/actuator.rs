//! Actuator role: executes LED commands and reports the result to whoever sent them.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::NodeRole;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::hal::{HalError, OutputLine};
use crate::mqtt::codec::{CommandCodec, LedState, StatusMessage};
use crate::mqtt::router::{HandlerResult, TopicRouter};
use crate::mqtt::topics::{NodeIdentity, Topic};
use crate::mqtt::transport::OutboundFrame;

/// Fixed confirmation text sent back for each state.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Replies {
    pub on: String,
    pub off: String,
}

impl Default for Replies {
    fn default() -> Self {
        Self {
            on: "I've seen the light!".to_string(),
            off: "And darkness fell upon the land...".to_string(),
        }
    }
}

impl Replies {
    pub fn text(&self, state: LedState) -> &str {
        match state {
            LedState::On => &self.on,
            LedState::Off => &self.off,
        }
    }
}

pub struct ActuatorNode {
    identity: NodeIdentity,
    codec: CommandCodec,
    output: Box<dyn OutputLine>,
    replies: Replies,
    diagnostics: Diagnostics,
    commands_applied: usize,
}

impl ActuatorNode {
    /// Drives the output off before the node goes online.
    pub fn new(
        identity: NodeIdentity,
        codec: CommandCodec,
        mut output: Box<dyn OutputLine>,
        replies: Replies,
        diagnostics: Diagnostics,
    ) -> Result<Self, HalError> {
        output.set(false)?;
        info!("Actuator node {} driving '{}'", identity, output.name());
        Ok(Self {
            identity,
            codec,
            output,
            replies,
            diagnostics,
            commands_applied: 0,
        })
    }

    pub fn output_is_on(&self) -> bool {
        self.output.is_on()
    }

    pub fn commands_applied(&self) -> usize {
        self.commands_applied
    }

    fn on_command(&mut self, payload: &[u8]) -> HandlerResult {
        // Unknown commands fail here, before the output is touched.
        let command = self.codec.decode_command(payload)?;

        self.output.set(command.cmd == LedState::On)?;
        self.commands_applied += 1;
        self.diagnostics.emit(
            DiagnosticKind::Output,
            format!("Turning LED {} for {}", command.cmd, command.sender_id),
        );

        let status = StatusMessage {
            status: command.cmd,
            message: self.replies.text(command.cmd).to_string(),
        };
        Ok(Some(OutboundFrame {
            topic: Topic::status_for(&command.sender_id),
            payload: self.codec.encode_status(&status)?,
        }))
    }
}

impl NodeRole for ActuatorNode {
    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![Topic::command_for(&self.identity)]
    }

    fn register_routes(&self, router: &mut TopicRouter<Self>) {
        router.register(Topic::command_for(&self.identity), ActuatorNode::on_command);
    }
}
