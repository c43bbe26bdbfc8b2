//! Node roles and the control loop that drives them.
//!
//! ```text
//! InputLine ──► Debouncer ──► ButtonNode ──► <led>/ledCommand
//!                                  ▲
//!                     <btn>/ledStatus (surfaced as diagnostics)
//!
//! <led>/ledCommand ──► ActuatorNode ──► OutputLine
//!                           └──────────► <sender>/ledStatus
//! ```
//!
//! Both roles run inside the same single-threaded [`runtime::NodeRuntime`] loop: reconnect
//! when due, drain inbound frames, sample local input.

pub mod actuator;
pub mod button;
pub mod debounce;
pub mod runtime;

use tokio::time::Instant;

use crate::mqtt::router::TopicRouter;
use crate::mqtt::topics::{NodeIdentity, Topic};
use crate::mqtt::transport::OutboundFrame;

pub use actuator::{ActuatorNode, Replies};
pub use button::ButtonNode;
pub use runtime::{NodeRuntime, RuntimeSettings};

/// Role-specific behaviour plugged into the shared runtime.
pub trait NodeRole: Sized + 'static {
    fn identity(&self) -> &NodeIdentity;

    /// Topics that must be subscribed before the session may become ready.
    fn subscriptions(&self) -> Vec<Topic>;

    fn register_routes(&self, router: &mut TopicRouter<Self>);

    /// Sample local input. Returns frames to publish; `ready` tells whether publishing is
    /// currently possible.
    fn sample(&mut self, _now: Instant, _ready: bool) -> Vec<OutboundFrame> {
        Vec::new()
    }
}
