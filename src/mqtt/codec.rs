//! JSON payloads exchanged between button and actuator nodes.
//!
//! ```text
//! <led>/ledCommand   {"senderID":"btnNode07","cmd":"on"}
//! <btn>/ledStatus    {"status":"on","message":"I've seen the light!"}
//! ```
//!
//! Field order on the wire follows struct declaration order. Decoding goes through a loose
//! intermediate form first so that a missing field and an unrecognized enum value produce
//! distinct errors, and neither is ever mapped onto a default action.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{DecodeError, EncodeError};
use super::topics::NodeIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    On,
    Off,
}

impl LedState {
    pub fn as_str(self) -> &'static str {
        match self {
            LedState::On => "on",
            LedState::Off => "off",
        }
    }

    fn from_wire(field: &'static str, value: &str) -> Result<Self, DecodeError> {
        match value {
            "on" => Ok(LedState::On),
            "off" => Ok(LedState::Off),
            other => Err(DecodeError::UnknownValue {
                field,
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandMessage {
    #[serde(rename = "senderID")]
    pub sender_id: NodeIdentity,
    pub cmd: LedState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub status: LedState,
    pub message: String,
}

#[derive(Deserialize)]
struct RawCommand {
    #[serde(rename = "senderID")]
    sender_id: Option<String>,
    cmd: Option<String>,
}

// Older firmware reported status as {"ledStatus": .., "msg": ..}.
#[derive(Deserialize)]
struct RawStatus {
    #[serde(alias = "ledStatus")]
    status: Option<String>,
    #[serde(alias = "msg")]
    message: Option<String>,
}

/// Encoder/decoder bounded by the largest payload the transport can carry.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    max_payload: usize,
}

impl CommandCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn encode_command(&self, msg: &CommandMessage) -> Result<Vec<u8>, EncodeError> {
        self.bounded(serde_json::to_vec(msg)?)
    }

    pub fn decode_command(&self, bytes: &[u8]) -> Result<CommandMessage, DecodeError> {
        let raw: RawCommand = parse(bytes)?;
        let sender = raw.sender_id.ok_or(DecodeError::MissingField("senderID"))?;
        let cmd = raw.cmd.ok_or(DecodeError::MissingField("cmd"))?;
        Ok(CommandMessage {
            sender_id: NodeIdentity::new(sender)?,
            cmd: LedState::from_wire("cmd", &cmd)?,
        })
    }

    pub fn encode_status(&self, msg: &StatusMessage) -> Result<Vec<u8>, EncodeError> {
        self.bounded(serde_json::to_vec(msg)?)
    }

    pub fn decode_status(&self, bytes: &[u8]) -> Result<StatusMessage, DecodeError> {
        let raw: RawStatus = parse(bytes)?;
        let status = raw.status.ok_or(DecodeError::MissingField("status"))?;
        let message = raw.message.ok_or(DecodeError::MissingField("message"))?;
        Ok(StatusMessage {
            status: LedState::from_wire("status", &status)?,
            message,
        })
    }

    fn bounded(&self, bytes: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        if bytes.len() > self.max_payload {
            return Err(EncodeError::Oversize {
                size: bytes.len(),
                limit: self.max_payload,
            });
        }
        Ok(bytes)
    }
}

fn parse<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CommandCodec {
        CommandCodec::new(256)
    }

    fn btn() -> NodeIdentity {
        NodeIdentity::new("btnNode07").unwrap()
    }

    #[test]
    fn command_wire_format_is_key_ordered() {
        let msg = CommandMessage {
            sender_id: btn(),
            cmd: LedState::On,
        };
        let bytes = codec().encode_command(&msg).unwrap();
        assert_eq!(bytes, br#"{"senderID":"btnNode07","cmd":"on"}"#);
    }

    #[test]
    fn status_wire_format_is_key_ordered() {
        let msg = StatusMessage {
            status: LedState::Off,
            message: "dark".to_string(),
        };
        let bytes = codec().encode_status(&msg).unwrap();
        assert_eq!(bytes, br#"{"status":"off","message":"dark"}"#);
    }

    #[test]
    fn round_trips() {
        let codec = codec();
        for cmd in [LedState::On, LedState::Off] {
            let msg = CommandMessage {
                sender_id: btn(),
                cmd,
            };
            let decoded = codec
                .decode_command(&codec.encode_command(&msg).unwrap())
                .unwrap();
            assert_eq!(decoded, msg);

            let status = StatusMessage {
                status: cmd,
                message: "with \"quotes\" and ünicode".to_string(),
            };
            let decoded = codec
                .decode_status(&codec.encode_status(&status).unwrap())
                .unwrap();
            assert_eq!(decoded, status);
        }
    }

    #[test]
    fn unknown_command_is_an_error_not_a_default() {
        let err = codec()
            .decode_command(br#"{"senderID":"btnNode07","cmd":"blink"}"#)
            .unwrap_err();
        match err {
            DecodeError::UnknownValue { field, value } => {
                assert_eq!(field, "cmd");
                assert_eq!(value, "blink");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let codec = codec();
        let cases: [&[u8]; 7] = [
            b"",
            b"not json",
            b"[1,2,3]",
            br#"{"cmd":"on"}"#,
            br#"{"senderID":"btnNode07"}"#,
            br#"{"senderID":"btn/Node07","cmd":"on"}"#,
            br#"{"senderID":42,"cmd":"on"}"#,
        ];
        for case in cases {
            assert!(codec.decode_command(case).is_err(), "accepted {:?}", case);
        }

        assert!(matches!(
            codec.decode_status(br#"{"status":"on"}"#),
            Err(DecodeError::MissingField("message"))
        ));
        assert!(codec.decode_status(br#"{"status":"dim","message":"x"}"#).is_err());
        assert!(codec.decode_status(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn legacy_status_keys_are_accepted() {
        let status = codec()
            .decode_status(br#"{"ledStatus":"on","msg":"I've seen the light!"}"#)
            .unwrap();
        assert_eq!(status.status, LedState::On);
        assert_eq!(status.message, "I've seen the light!");
    }

    #[test]
    fn oversize_output_is_rejected_not_truncated() {
        let codec = CommandCodec::new(32);
        let msg = StatusMessage {
            status: LedState::On,
            message: "x".repeat(64),
        };
        match codec.encode_status(&msg) {
            Err(EncodeError::Oversize { size, limit }) => {
                assert!(size > 64);
                assert_eq!(limit, 32);
            }
            other => panic!("expected oversize, got {:?}", other),
        }
    }
}
