//! Local I/O lines consumed by the node roles.
//!
//! The button role reads two input lines (On and Off push buttons) and the actuator role
//! drives one output line (the LED). [`sim`] lines are shared in-memory flags; [`gpio`]
//! lines talk to Raspberry Pi pins and are only built with the `gpio` feature.

#[cfg(feature = "gpio")]
pub mod gpio;
pub mod sim;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("Failed to open pin {pin}: {reason}")]
    Open { pin: u8, reason: String },

    #[error("I/O on line '{line}' failed: {reason}")]
    Io { line: String, reason: String },
}

/// A digital input, already normalized so that `true` means "pressed".
pub trait InputLine {
    fn name(&self) -> &str;

    fn is_active(&mut self) -> Result<bool, HalError>;
}

/// A binary output such as an LED.
pub trait OutputLine {
    fn name(&self) -> &str;

    fn set(&mut self, on: bool) -> Result<(), HalError>;

    fn is_on(&self) -> bool;
}
