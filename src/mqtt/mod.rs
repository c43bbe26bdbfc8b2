//! # MQTT Protocol Module
//!
//! Everything a node needs to talk to its peer through the broker.
//!
//! ```text
//! mqtt/
//! ├── transport.rs   - Transport trait and the rumqttc-backed implementation
//! ├── session.rs     - BrokerSession: connection state machine, publish, poll
//! ├── reconnect.rs   - Fixed-interval retry timing
//! ├── router.rs      - Exact-match topic → handler dispatch
//! ├── codec.rs       - JSON command/status payloads
//! ├── topics.rs      - Node identities and `<recipient>/<kind>` topics
//! └── error.rs       - Error taxonomy
//! ```
//!
//! Topics always name the *recipient*: a button node publishes to `<led>/ledCommand` and
//! subscribes to `<self>/ledStatus`; an actuator node subscribes to `<self>/ledCommand` and
//! replies to `<sender>/ledStatus`. All traffic is QoS 0.

pub mod codec;
pub mod error;
pub mod reconnect;
pub mod router;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;
pub mod topics;
pub mod transport;
