//! MQTT button and LED nodes.
//!
//! A button node publishes on/off commands to its peer; an LED (actuator) node executes them
//! and reports the resulting state back to the sender. Both share one broker session design,
//! one reconnect policy and one control loop.

pub mod config;
pub mod diagnostics;
pub mod hal;
pub mod mqtt;
pub mod node;
