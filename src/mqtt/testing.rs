//! Scriptable in-memory transport for tests. Clones share state, so a test keeps one handle
//! while the session owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::TransportError;
use super::topics::NodeIdentity;
use super::transport::{InboundFrame, Transport, TransportEvent};

#[derive(Default)]
struct Inner {
    connected: bool,
    connect_failures: VecDeque<TransportError>,
    fail_subscribe: bool,
    lose_connection: bool,
    inbound: VecDeque<InboundFrame>,
    published: Vec<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    connect_attempts: usize,
    disconnects: usize,
}

#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    max_frame: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_max_frame(512)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_frame,
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn fail_next_connect(&self, error: TransportError) {
        self.inner().connect_failures.push_back(error);
    }

    pub fn fail_next_subscribe(&self) {
        self.inner().fail_subscribe = true;
    }

    /// The next transport call after this reports the connection as lost.
    pub fn drop_connection(&self) {
        self.inner().lose_connection = true;
    }

    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        self.inner().inbound.push_back(InboundFrame {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner().published.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner().subscriptions.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner().connect_attempts
    }

    pub fn disconnects(&self) -> usize {
        self.inner().disconnects
    }

    fn check_link(inner: &mut Inner) -> Result<(), TransportError> {
        if inner.lose_connection {
            inner.lose_connection = false;
            inner.connected = false;
            return Err(TransportError::ConnectionLost("socket closed".to_string()));
        }
        if !inner.connected {
            return Err(TransportError::ConnectionLost("not connected".to_string()));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self, _identity: &NodeIdentity) -> Result<(), TransportError> {
        let mut inner = self.inner();
        inner.connect_attempts += 1;
        if let Some(error) = inner.connect_failures.pop_front() {
            return Err(error);
        }
        inner.connected = true;
        inner.lose_connection = false;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut inner = self.inner();
        Self::check_link(&mut inner)?;
        if inner.fail_subscribe {
            inner.fail_subscribe = false;
            return Err(TransportError::Rejected(format!("{} refused", topic)));
        }
        inner.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut inner = self.inner();
        Self::check_link(&mut inner)?;
        inner.published.push((topic.to_string(), payload));
        Ok(())
    }

    async fn recv(&mut self, _wait: Duration) -> Result<Option<TransportEvent>, TransportError> {
        let mut inner = self.inner();
        Self::check_link(&mut inner)?;
        Ok(inner.inbound.pop_front().map(TransportEvent::Frame))
    }

    async fn disconnect(&mut self) {
        let mut inner = self.inner();
        inner.connected = false;
        inner.disconnects += 1;
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame
    }
}
