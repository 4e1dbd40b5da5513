use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::ChannelKind,
    protocol::{ClientRequest, ServerEvent},
};
use tokio::sync::mpsc;

use crate::{
    auth::NoopAuthFallback,
    error::SessionError,
    registry::SessionRegistry,
    session::{ChannelSession, ReconnectPolicy, SessionOptions},
    transport::{Transport, TransportLink, TransportSignal},
};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

/// Server side of one in-memory connection.
pub(crate) struct RemoteEnd {
    pub channel: ChannelKind,
    pub sent: mpsc::Receiver<String>,
    pub push: mpsc::Sender<TransportSignal>,
}

impl RemoteEnd {
    pub async fn next_request(&mut self) -> ClientRequest {
        let frame = tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("request in time")
            .expect("connection open");
        serde_json::from_str(&frame).expect("client request json")
    }

    pub async fn push_event(&self, event: &ServerEvent) {
        let frame = serde_json::to_string(event).expect("server event json");
        self.push
            .send(TransportSignal::Frame(frame))
            .await
            .expect("session reading");
    }

    pub async fn fail(&self, message: &str) {
        let _ = self.push.send(TransportSignal::Failed(message.into())).await;
    }
}

/// Hands every accepted connection's server side to the test; the first
/// `refusals` connects fail.
pub(crate) struct InMemoryTransport {
    refusals: AtomicUsize,
    pub connects: AtomicUsize,
    accepted: mpsc::UnboundedSender<RemoteEnd>,
}

impl InMemoryTransport {
    pub fn new(refusals: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            refusals: AtomicUsize::new(refusals),
            connects: AtomicUsize::new(0),
            accepted,
        });
        (transport, rx)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(
        &self,
        channel: ChannelKind,
        _options: &SessionOptions,
    ) -> Result<TransportLink, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SessionError::Transport("connection refused".into()));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let _ = self.accepted.send(RemoteEnd {
            channel,
            sent: outbound_rx,
            push: inbound_tx,
        });
        Ok(TransportLink::new(outbound_tx, inbound_rx))
    }
}

pub(crate) fn quick_reconnect(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

pub(crate) fn options_without_reconnect() -> SessionOptions {
    SessionOptions::new("http://chat.test").with_reconnect(ReconnectPolicy::disabled())
}

pub(crate) async fn accept(rx: &mut mpsc::UnboundedReceiver<RemoteEnd>) -> RemoteEnd {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("connection in time")
        .expect("transport alive")
}

/// Registry over an in-memory transport with a live session on `channel`.
pub(crate) async fn live_channel(
    channel: ChannelKind,
) -> (Arc<SessionRegistry>, Arc<ChannelSession>, RemoteEnd) {
    let (transport, mut accepted) = InMemoryTransport::new(0);
    let registry = SessionRegistry::new(transport, Arc::new(NoopAuthFallback), Duration::ZERO);
    let session = registry
        .obtain_session(channel, options_without_reconnect())
        .await;
    let remote = accept(&mut accepted).await;
    session.wait_until_live(WAIT).await.expect("session live");
    (registry, session, remote)
}
