//! The node's single control loop.
//!
//! Every tick, in order:
//!
//! 1. if the session is not ready and the reconnect policy says so, run
//!    connect → subscribe → ready;
//! 2. drain and dispatch inbound frames;
//! 3. sample local input and publish whatever the role produced.
//!
//! Every step is bounded by a transport timeout, so local input keeps being sampled during
//! broker outages.

use chrono::Local;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::NodeRole;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::mqtt::error::EstablishError;
use crate::mqtt::reconnect::ReconnectPolicy;
use crate::mqtt::router::TopicRouter;
use crate::mqtt::session::BrokerSession;
use crate::mqtt::transport::Transport;

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub tick: Duration,
    pub stats_interval: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            stats_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Default, Debug)]
struct Stats {
    ticks: u64,
    frames: u64,
    published: u64,
}

pub struct NodeRuntime<T: Transport, R: NodeRole> {
    session: BrokerSession<T>,
    router: TopicRouter<R>,
    role: R,
    policy: ReconnectPolicy,
    diagnostics: Diagnostics,
    settings: RuntimeSettings,
    was_ready: bool,
    stats: Stats,
}

impl<T: Transport, R: NodeRole> NodeRuntime<T, R> {
    pub fn new(
        session: BrokerSession<T>,
        role: R,
        policy: ReconnectPolicy,
        diagnostics: Diagnostics,
        settings: RuntimeSettings,
    ) -> Self {
        let mut router = TopicRouter::new(diagnostics.clone());
        role.register_routes(&mut router);
        debug!("Registered {} routes for {}", router.len(), role.identity());
        Self {
            session,
            router,
            role,
            policy,
            diagnostics,
            settings,
            was_ready: false,
            stats: Stats::default(),
        }
    }

    pub fn session(&self) -> &BrokerSession<T> {
        &self.session
    }

    pub fn role(&self) -> &R {
        &self.role
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Run until `shutdown` is cancelled, then disconnect cleanly.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Starting {} loop with {}ms tick",
            self.role.identity(),
            self.settings.tick.as_millis()
        );
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::from_std(self.settings.stats_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.step(Instant::now()).await,
            }

            let now = Local::now();
            if now - last_stats_time > stats_interval {
                let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
                info!(
                    "Node stats: {} ticks, {} frames in, {} published in {} seconds (state {:?})",
                    self.stats.ticks,
                    self.stats.frames,
                    self.stats.published,
                    elapsed_seconds,
                    self.session.state()
                );
                self.stats = Stats::default();
                last_stats_time = now;
            }
        }

        info!("Shutting down {}", self.role.identity());
        self.session.disconnect().await;
    }

    /// One pass of the control loop at time `now`.
    pub async fn step(&mut self, now: Instant) {
        self.stats.ticks += 1;

        if !self.session.is_ready() && self.policy.due(now) {
            self.establish(now).await;
        }

        if self.session.is_ready() {
            self.stats.frames += self.session.poll(&mut self.router, &mut self.role).await as u64;
            self.note_loss(now);
        }

        let frames = self.role.sample(now, self.session.is_ready());
        for frame in frames {
            match self.session.publish(&frame.topic, frame.payload).await {
                Ok(()) => self.stats.published += 1,
                Err(e) => error!("Publish to {} failed: {}", frame.topic, e),
            }
        }
        self.note_loss(now);
    }

    fn note_loss(&mut self, now: Instant) {
        if self.was_ready && !self.session.is_ready() {
            self.was_ready = false;
            self.policy.connection_lost(now);
            self.diagnostics.emit(
                DiagnosticKind::Connection,
                "Lost connection to broker, reconnecting",
            );
        }
    }

    async fn establish(&mut self, now: Instant) {
        let identity = self.role.identity().clone();
        info!(
            "Connecting to MQTT broker as {} (attempt {})",
            identity,
            self.policy.attempts() + 1
        );

        match self.try_establish().await {
            Ok(()) => {
                self.policy.record_success();
                self.was_ready = true;
                self.diagnostics.emit(
                    DiagnosticKind::Connection,
                    "MQTT initialization complete, ready",
                );
            }
            Err(e) => {
                self.policy.record_failure(now);
                self.diagnostics.emit(
                    DiagnosticKind::Connection,
                    format!(
                        "Connecting as {} failed: {}. Trying again in {} sec.",
                        identity,
                        e,
                        self.policy.interval().as_secs()
                    ),
                );
            }
        }
    }

    async fn try_establish(&mut self) -> Result<(), EstablishError> {
        let mut handshake = self.session.connect(self.role.identity()).await?;
        for topic in self.role.subscriptions() {
            self.session.subscribe(&mut handshake, &topic).await?;
        }
        self.session.ready(handshake)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::drain;
    use crate::hal::sim::{LineHandle, SimInput, SimOutput};
    use crate::mqtt::codec::CommandCodec;
    use crate::mqtt::error::TransportError;
    use crate::mqtt::session::{ConnectionState, SessionSettings};
    use crate::mqtt::testing::MockTransport;
    use crate::mqtt::topics::NodeIdentity;
    use crate::node::{ActuatorNode, ButtonNode, Replies};

    const TICK: Duration = Duration::from_millis(10);

    fn id(s: &str) -> NodeIdentity {
        NodeIdentity::new(s).unwrap()
    }

    fn button_runtime(
        mock: &MockTransport,
        diagnostics: Diagnostics,
    ) -> (NodeRuntime<MockTransport, ButtonNode>, LineHandle, LineHandle) {
        let (on, on_handle) = SimInput::new("on");
        let (off, off_handle) = SimInput::new("off");
        let role = ButtonNode::new(
            id("btnNode07"),
            id("ledNode07"),
            CommandCodec::new(256),
            Box::new(on),
            Box::new(off),
            TICK,
            diagnostics.clone(),
        );
        let runtime = NodeRuntime::new(
            BrokerSession::new(mock.clone(), SessionSettings::default()),
            role,
            ReconnectPolicy::new(Duration::from_secs(5)),
            diagnostics,
            RuntimeSettings::default(),
        );
        (runtime, on_handle, off_handle)
    }

    fn actuator_runtime(
        mock: &MockTransport,
        diagnostics: Diagnostics,
    ) -> (NodeRuntime<MockTransport, ActuatorNode>, LineHandle) {
        let (led, handle) = SimOutput::new("led");
        let role = ActuatorNode::new(
            id("ledNode07"),
            CommandCodec::new(256),
            Box::new(led),
            Replies::default(),
            diagnostics.clone(),
        )
        .unwrap();
        let runtime = NodeRuntime::new(
            BrokerSession::new(mock.clone(), SessionSettings::default()),
            role,
            ReconnectPolicy::default(),
            diagnostics,
            RuntimeSettings::default(),
        );
        (runtime, handle)
    }

    #[tokio::test]
    async fn button_press_publishes_command() {
        let mock = MockTransport::new();
        let (mut runtime, on, _) = button_runtime(&mock, Diagnostics::new());
        let t0 = Instant::now();

        runtime.step(t0).await;
        assert!(runtime.session().is_ready());
        assert_eq!(mock.subscriptions(), vec!["btnNode07/ledStatus".to_string()]);

        on.set(true);
        runtime.step(t0 + TICK).await;
        runtime.step(t0 + 2 * TICK).await;

        assert_eq!(
            mock.published(),
            vec![(
                "ledNode07/ledCommand".to_string(),
                br#"{"senderID":"btnNode07","cmd":"on"}"#.to_vec()
            )]
        );
    }

    #[tokio::test]
    async fn actuator_executes_command_and_replies() {
        let mock = MockTransport::new();
        let (mut runtime, led) = actuator_runtime(&mock, Diagnostics::new());
        let t0 = Instant::now();
        runtime.step(t0).await;
        assert_eq!(mock.subscriptions(), vec!["ledNode07/ledCommand".to_string()]);

        mock.push_inbound(
            "ledNode07/ledCommand",
            br#"{"senderID":"btnNode07","cmd":"on"}"#,
        );
        runtime.step(t0 + TICK).await;

        assert!(led.get());
        assert!(runtime.role().output_is_on());
        assert_eq!(
            mock.published(),
            vec![(
                "btnNode07/ledStatus".to_string(),
                br#"{"status":"on","message":"I've seen the light!"}"#.to_vec()
            )]
        );
    }

    #[tokio::test]
    async fn actuator_ignores_unknown_command() {
        let mock = MockTransport::new();
        let (diagnostics, mut rx) = Diagnostics::with_listener();
        let (mut runtime, led) = actuator_runtime(&mock, diagnostics);
        let t0 = Instant::now();
        runtime.step(t0).await;
        drain(&mut rx);

        mock.push_inbound(
            "ledNode07/ledCommand",
            br#"{"senderID":"btnNode07","cmd":"blink"}"#,
        );
        runtime.step(t0 + TICK).await;

        assert!(!led.get());
        assert_eq!(led.writes(), 1);
        assert!(mock.published().is_empty());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DiagnosticKind::Rejected);
    }

    #[tokio::test]
    async fn reconnects_on_next_tick_then_every_interval() {
        let mock = MockTransport::new();
        let (mut runtime, _) = actuator_runtime(&mock, Diagnostics::new());
        let t0 = Instant::now();
        runtime.step(t0).await;
        assert!(runtime.session().is_ready());
        assert_eq!(mock.connect_attempts(), 1);

        for _ in 0..3 {
            mock.fail_next_connect(TransportError::Unreachable("broker down".to_string()));
        }
        mock.drop_connection();
        runtime.step(t0 + TICK).await;
        assert_eq!(runtime.session().state(), ConnectionState::Disconnected);
        assert_eq!(mock.connect_attempts(), 1);

        // Very next tick retries.
        let t1 = t0 + 2 * TICK;
        runtime.step(t1).await;
        assert_eq!(mock.connect_attempts(), 2);
        assert_eq!(runtime.session().state(), ConnectionState::Disconnected);

        // Nothing until the fixed interval elapsed.
        runtime.step(t1 + Duration::from_secs(4)).await;
        assert_eq!(mock.connect_attempts(), 2);
        runtime.step(t1 + Duration::from_secs(5)).await;
        assert_eq!(mock.connect_attempts(), 3);
        runtime.step(t1 + Duration::from_secs(10)).await;
        assert_eq!(mock.connect_attempts(), 4);
        assert_eq!(runtime.policy().attempts(), 3);

        runtime.step(t1 + Duration::from_secs(15)).await;
        assert_eq!(mock.connect_attempts(), 5);
        assert!(runtime.session().is_ready());
        assert_eq!(runtime.policy().attempts(), 0);
    }

    #[tokio::test]
    async fn unrouted_frame_is_discarded() {
        let mock = MockTransport::new();
        let (diagnostics, mut rx) = Diagnostics::with_listener();
        let (mut runtime, led) = actuator_runtime(&mock, diagnostics);
        let t0 = Instant::now();
        runtime.step(t0).await;
        drain(&mut rx);

        mock.push_inbound("ledNode99/ledCommand", br#"{"senderID":"x","cmd":"on"}"#);
        runtime.step(t0 + TICK).await;

        assert!(!led.get());
        assert!(mock.published().is_empty());
        assert!(runtime.session().is_ready());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DiagnosticKind::Unrouted);
    }

    #[tokio::test]
    async fn failed_subscription_retries_like_failed_connect() {
        let mock = MockTransport::new();
        mock.fail_next_subscribe();
        let (mut runtime, _, _) = button_runtime(&mock, Diagnostics::new());
        let t0 = Instant::now();

        runtime.step(t0).await;
        assert!(!runtime.session().is_ready());
        assert_eq!(runtime.policy().attempts(), 1);

        runtime.step(t0 + Duration::from_secs(5)).await;
        assert!(runtime.session().is_ready());
    }

    #[tokio::test]
    async fn run_stops_on_cancel_and_disconnects() {
        let mock = MockTransport::new();
        let (runtime, _) = actuator_runtime(&mock, Diagnostics::new());
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });
        runtime.run(shutdown).await;
        handle.await.unwrap();

        assert_eq!(mock.connect_attempts(), 1);
        assert!(mock.disconnects() >= 1);
    }
}
