//! Broker transport boundary.
//!
//! [`BrokerSession`](super::session::BrokerSession) talks to the broker only through the
//! [`Transport`] trait. [`RumqttTransport`] is the production implementation on top of a
//! `rumqttc` client and event loop; tests script their own.

use std::collections::VecDeque;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode,
};
use tracing::{debug, info, warn};

use super::error::TransportError;
use super::topics::{NodeIdentity, Topic};
use crate::config::BrokerConfig;

/// Capacity of the request channel between client handle and event loop.
const REQUEST_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(InboundFrame),
    /// Protocol traffic that carries no application frame (acks, pings, outgoing echoes).
    Idle,
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Open a session under `identity`. Completes once the broker acknowledged the client.
    async fn connect(&mut self, identity: &NodeIdentity) -> Result<(), TransportError>;

    /// Subscribe and wait for the broker's acknowledgement.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Wait at most `wait` for the next event. `Ok(None)` means nothing arrived in time.
    async fn recv(&mut self, wait: Duration) -> Result<Option<TransportEvent>, TransportError>;

    async fn disconnect(&mut self);

    /// Largest frame (topic plus payload plus header) the transport will carry.
    fn max_frame_size(&self) -> usize;
}

struct Link {
    client: AsyncClient,
    eventloop: EventLoop,
}

pub struct RumqttTransport {
    config: BrokerConfig,
    link: Option<Link>,
    backlog: VecDeque<InboundFrame>,
}

impl RumqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            link: None,
            backlog: VecDeque::new(),
        }
    }

    fn options(&self, identity: &NodeIdentity) -> MqttOptions {
        let mut mqtt_options =
            MqttOptions::new(identity.as_str(), self.config.host.clone(), self.config.port);
        mqtt_options
            .set_keep_alive(Duration::from_secs(self.config.keep_alive_secs))
            .set_clean_session(true)
            .set_max_packet_size(self.config.max_packet_size, self.config.max_packet_size);
        mqtt_options
    }

    fn link(&mut self) -> Result<&mut Link, TransportError> {
        self.link
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionLost("not connected".to_string()))
    }

    fn lost(&mut self, reason: String) -> TransportError {
        warn!("Broker connection lost: {}", reason);
        self.link = None;
        TransportError::ConnectionLost(reason)
    }
}

/// Only a refused client id is the identity's fault; every other code is a broker problem.
fn refused(code: ConnectReturnCode) -> TransportError {
    match code {
        ConnectReturnCode::BadClientId => TransportError::Rejected(format!("{:?}", code)),
        other => TransportError::Unreachable(format!("broker refused connection: {:?}", other)),
    }
}

impl Transport for RumqttTransport {
    async fn connect(&mut self, identity: &NodeIdentity) -> Result<(), TransportError> {
        self.link = None;
        self.backlog.clear();

        let (client, mut eventloop) = AsyncClient::new(self.options(identity), REQUEST_CAPACITY);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(refused(ack.code));
                    }
                    info!(
                        "Broker {}:{} accepted {}",
                        self.config.host, self.config.port, identity
                    );
                    self.link = Some(Link { client, eventloop });
                    return Ok(());
                }
                Ok(event) => debug!("Handshake event: {:?}", event),
                Err(ConnectionError::ConnectionRefused(code)) => return Err(refused(code)),
                Err(e) => return Err(TransportError::Unreachable(e.to_string())),
            }
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let link = self.link()?;
        link.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut pkid = None;
        loop {
            let event = match self.link()?.eventloop.poll().await {
                Ok(event) => event,
                Err(e) => return Err(self.lost(e.to_string())),
            };
            match event {
                Event::Outgoing(Outgoing::Subscribe(id)) => pkid = Some(id),
                Event::Incoming(Packet::SubAck(ack)) if Some(ack.pkid) == pkid => {
                    return match ack.return_codes.first() {
                        Some(SubscribeReasonCode::Success(_)) => Ok(()),
                        other => Err(TransportError::Rejected(format!(
                            "subscription to {} refused: {:?}",
                            topic, other
                        ))),
                    };
                }
                // Frames for earlier subscriptions may arrive before the ack.
                Event::Incoming(Packet::Publish(publish)) => {
                    self.backlog.push_back(InboundFrame {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    })
                }
                Event::Incoming(Packet::Disconnect) => {
                    return Err(self.lost("broker sent disconnect".to_string()))
                }
                other => debug!("Event while subscribing: {:?}", other),
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.link()?
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<TransportEvent>, TransportError> {
        if let Some(frame) = self.backlog.pop_front() {
            return Ok(Some(TransportEvent::Frame(frame)));
        }

        let polled = tokio::time::timeout(wait, self.link()?.eventloop.poll()).await;
        match polled {
            Err(_elapsed) => Ok(None),
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                Ok(Some(TransportEvent::Frame(InboundFrame {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                })))
            }
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                Err(self.lost("broker sent disconnect".to_string()))
            }
            Ok(Ok(_)) => Ok(Some(TransportEvent::Idle)),
            Ok(Err(e)) => Err(self.lost(e.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
                return;
            }
            // Give the event loop one chance to flush the DISCONNECT packet.
            let wait = Duration::from_millis(self.config.poll_timeout_ms);
            let _ = tokio::time::timeout(wait, link.eventloop.poll()).await;
        }
        self.backlog.clear();
    }

    fn max_frame_size(&self) -> usize {
        self.config.max_packet_size
    }
}
