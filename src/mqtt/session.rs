//! Broker session: one logical connection, one owner.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──handshake ok──► Subscribing ──ready──► Ready
//!      ▲                         │                            │                  │
//!      └─────────────────────────┴──── any transport error ───┴──────────────────┘
//! ```
//!
//! The runtime [`ConnectionState`] is what `publish` and `is_ready` look at. The connect
//! handshake itself is a typestate machine: `connect` hands back a [`Connected`] value,
//! subscriptions are only possible while holding it, and `ready` consumes it. A session can
//! therefore not reach `Ready` without going through the subscription step.

use chrono::{DateTime, Local};
use statum::{machine, state};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{ConnectError, PublishError, SubscribeError, TransportError};
use super::router::{Dispatch, TopicRouter};
use super::topics::{NodeIdentity, Topic};
use super::transport::{Transport, TransportEvent};

/// Bytes of fixed header, length prefix and topic length field around every PUBLISH.
pub const PUBLISH_OVERHEAD: usize = 7;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribing,
    Ready,
}

#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    pub connects: usize,
    pub frames_received: usize,
    pub frames_published: usize,
    pub last_activity: Option<DateTime<Local>>,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub poll_timeout: Duration,
    pub max_frames_per_poll: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            poll_timeout: Duration::from_millis(5),
            max_frames_per_poll: 32,
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum HandshakeState {
    Connecting,
    Subscribing,
}

#[machine]
#[derive(Debug)]
pub struct Handshake<S: HandshakeState> {
    identity: NodeIdentity,
    subscribed: Vec<Topic>,
}

/// Proof of a completed transport handshake; required to subscribe and to become ready.
pub type Connected = Handshake<Subscribing>;

impl Handshake<Connecting> {
    fn begin(identity: NodeIdentity) -> Self {
        Self::new(identity, Vec::new())
    }

    fn accepted(self) -> Handshake<Subscribing> {
        self.transition()
    }
}

impl Handshake<Subscribing> {
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn subscribed(&self) -> &[Topic] {
        &self.subscribed
    }
}

pub struct BrokerSession<T: Transport> {
    transport: T,
    settings: SessionSettings,
    status: SessionStatus,
}

impl<T: Transport> BrokerSession<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            status: SessionStatus::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status.connection_state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.status.connection_state != next {
            debug!("Session {:?} -> {:?}", self.status.connection_state, next);
            self.status.connection_state = next;
        }
    }

    fn touch(&mut self) {
        self.status.last_activity = Some(Local::now());
    }

    /// Open the transport session. The returned handshake must be used to subscribe and then
    /// passed to [`ready`](Self::ready).
    pub async fn connect(&mut self, identity: &NodeIdentity) -> Result<Connected, ConnectError> {
        self.set_state(ConnectionState::Connecting);
        let handshake = Handshake::<Connecting>::begin(identity.clone());

        let timeout = self.settings.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.transport.connect(identity)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
        };

        match result {
            Ok(()) => {
                self.status.connects += 1;
                self.touch();
                self.set_state(ConnectionState::Subscribing);
                info!("Connected to broker as {}", identity);
                Ok(handshake.accepted())
            }
            Err(e) => {
                self.transport.disconnect().await;
                self.set_state(ConnectionState::Disconnected);
                Err(match e {
                    TransportError::Rejected(reason) => ConnectError::IdentityRejected {
                        identity: identity.to_string(),
                        reason,
                    },
                    other => ConnectError::Unreachable(other),
                })
            }
        }
    }

    pub async fn subscribe(
        &mut self,
        handshake: &mut Connected,
        topic: &Topic,
    ) -> Result<(), SubscribeError> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Subscribing => {}
            other => return Err(SubscribeError::InvalidState(other)),
        }

        let timeout = self.settings.connect_timeout;
        let result =
            match tokio::time::timeout(timeout, self.transport.subscribe(topic.as_str())).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
            };

        match result {
            Ok(()) => {
                info!("Subscribed to {}", topic);
                handshake.subscribed.push(topic.clone());
                self.touch();
                Ok(())
            }
            Err(source) => {
                error!("Subscription to {} failed: {}", topic, source);
                self.transport.disconnect().await;
                self.set_state(ConnectionState::Disconnected);
                Err(SubscribeError::Failed {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }

    /// Finish the handshake. Fails if the session dropped while subscribing.
    pub fn ready(&mut self, handshake: Connected) -> Result<(), SubscribeError> {
        if self.state() != ConnectionState::Subscribing {
            return Err(SubscribeError::InvalidState(self.state()));
        }
        info!(
            "Session ready as {} ({} subscriptions)",
            handshake.identity(),
            handshake.subscribed().len()
        );
        self.set_state(ConnectionState::Ready);
        Ok(())
    }

    pub async fn publish(&mut self, topic: &Topic, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self.is_ready() {
            return Err(PublishError::NotReady(self.state()));
        }

        let size = topic.as_str().len() + payload.len() + PUBLISH_OVERHEAD;
        let limit = self.transport.max_frame_size();
        if size > limit {
            return Err(PublishError::Oversize { size, limit });
        }

        match self.transport.publish(topic.as_str(), payload).await {
            Ok(()) => {
                self.status.frames_published += 1;
                self.touch();
                debug!("Published {} bytes to {}", size, topic);
                Ok(())
            }
            Err(e) => {
                if matches!(e, TransportError::ConnectionLost(_)) {
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(PublishError::Transport(e))
            }
        }
    }

    /// Drain the frames the transport has buffered and dispatch them in arrival order.
    ///
    /// Each wait is bounded by the poll timeout and at most `max_frames_per_poll` frames are
    /// handled per call. Replies produced by handlers are published immediately, before the
    /// next frame is dispatched. Returns the number of frames dispatched.
    pub async fn poll<C>(&mut self, router: &mut TopicRouter<C>, ctx: &mut C) -> usize {
        if !self.is_ready() {
            return 0;
        }

        let mut dispatched = 0;
        let mut events = 0;
        while dispatched < self.settings.max_frames_per_poll
            && events < self.settings.max_frames_per_poll * 4
        {
            events += 1;
            let frame = match self.transport.recv(self.settings.poll_timeout).await {
                Ok(Some(TransportEvent::Frame(frame))) => frame,
                Ok(Some(TransportEvent::Idle)) => continue,
                Ok(None) => break,
                Err(e) => {
                    warn!("Transport error while polling: {}", e);
                    self.transport.disconnect().await;
                    self.set_state(ConnectionState::Disconnected);
                    break;
                }
            };

            self.status.frames_received += 1;
            self.touch();
            dispatched += 1;

            if let Dispatch::Handled(Some(reply)) =
                router.dispatch(ctx, &frame.topic, &frame.payload)
            {
                if let Err(e) = self.publish(&reply.topic, reply.payload).await {
                    error!("Reply to {} not sent: {}", reply.topic, e);
                }
            }

            if !self.is_ready() {
                break;
            }
        }
        dispatched
    }

    pub async fn disconnect(&mut self) {
        if self.state() != ConnectionState::Disconnected {
            info!("Disconnecting from broker");
        }
        self.transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
    }
}
