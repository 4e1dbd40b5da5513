use std::{sync::Arc, time::Duration};

use shared::{
    domain::ChannelKind,
    protocol::{ClientRequest, ServerEvent},
};
use tokio::{
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
        watch, Mutex,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthError, AuthErrorRouter},
    error::SessionError,
    transport::{Transport, TransportLink, TransportSignal},
};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialMode {
    Anonymous,
    Bearer(String),
}

/// Exponential reconnect backoff: `base_delay * 2^attempt`, capped at
/// `max_delay`, for at most `max_attempts` consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether another connect may follow `attempt` consecutive failures.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.enabled && attempt < self.max_attempts
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1_u32 << attempt.min(20);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub server_url: String,
    pub credentials: CredentialMode,
    pub reconnect: ReconnectPolicy,
}

impl SessionOptions {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            credentials: CredentialMode::Anonymous,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: CredentialMode) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    /// Terminal. The registry replaces closed sessions on the next request.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Closed { reason: Option<String> },
    Reconnecting { attempt: u32, delay: Duration },
    Server(ServerEvent),
}

/// One channel's connection: a driver task owns the transport, reconnects
/// per policy, and fans server events out on a broadcast channel.
pub struct ChannelSession {
    channel: ChannelKind,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSession {
    pub(crate) async fn open(
        channel: ChannelKind,
        options: SessionOptions,
        transport: Arc<dyn Transport>,
        auth: Arc<AuthErrorRouter>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Connecting);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let session = Arc::new(Self {
            channel,
            state,
            events,
            outbound: Mutex::new(None),
            driver: Mutex::new(None),
        });

        let driver = tokio::spawn(Arc::clone(&session).drive(options, transport, auth));
        *session.driver.lock().await = Some(driver);
        session
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    /// Live, connecting or reconnecting; anything but closed.
    pub fn is_usable(&self) -> bool {
        self.state() != SessionState::Closed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn wait_until_live(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut state = self.state.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|s| matches!(s, SessionState::Live | SessionState::Closed)),
        )
        .await
        .map_err(|_| SessionError::Timeout(timeout))?
        .map(|s| *s)
        .map_err(|_| SessionError::NotConnected(self.channel))?;

        match settled {
            SessionState::Live => Ok(()),
            _ => Err(SessionError::NotConnected(self.channel)),
        }
    }

    /// Encodes and hands the request to the writer. Fails fast when the
    /// channel is not live or the writer is backed up; never waits.
    pub async fn emit(&self, request: &ClientRequest) -> Result<(), SessionError> {
        let event = request.event_name();
        let outbound = self
            .outbound
            .lock()
            .await
            .clone()
            .filter(|_| self.is_live())
            .ok_or(SessionError::NotConnected(self.channel))?;
        let frame = serde_json::to_string(request)
            .map_err(|source| SessionError::Encode { event, source })?;

        outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => SessionError::Saturated(self.channel),
            TrySendError::Closed(_) => SessionError::NotConnected(self.channel),
        })?;
        debug!(channel = %self.channel, event, "session: emitted");
        Ok(())
    }

    /// Stops the driver and drops the connection. Idempotent.
    pub(crate) async fn shutdown(&self) {
        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
        }
        self.outbound.lock().await.take();
        let was_open = self.state.send_replace(SessionState::Closed) != SessionState::Closed;
        if was_open {
            let _ = self.events.send(SessionEvent::Closed {
                reason: Some("disconnected".into()),
            });
            info!(channel = %self.channel, "session: disconnected");
        }
    }

    async fn drive(
        self: Arc<Self>,
        options: SessionOptions,
        transport: Arc<dyn Transport>,
        auth: Arc<AuthErrorRouter>,
    ) {
        let policy = options.reconnect;
        let mut attempt = 0_u32;
        loop {
            match transport.connect(self.channel, &options).await {
                Ok(link) => {
                    attempt = 0;
                    let reason = self.run_link(link, &auth, policy.allows_attempt(attempt)).await;
                    info!(channel = %self.channel, reason = ?reason, "session: connection closed");
                    let _ = self.events.send(SessionEvent::Closed { reason });
                }
                Err(err) => {
                    warn!(channel = %self.channel, error = %err, "session: connect failed");
                    if !policy.allows_attempt(attempt) {
                        self.state.send_replace(SessionState::Closed);
                    }
                    auth.dispatch(self.channel, AuthError::transport(err.to_string()))
                        .await;
                }
            }

            if !policy.allows_attempt(attempt) {
                break;
            }
            let delay = policy.delay_for_attempt(attempt);
            attempt += 1;
            self.state.send_replace(SessionState::Reconnecting { attempt });
            let _ = self.events.send(SessionEvent::Reconnecting { attempt, delay });
            info!(channel = %self.channel, attempt, delay_ms = delay.as_millis() as u64, "session: reconnecting");
            tokio::time::sleep(delay).await;
        }

        self.state.send_replace(SessionState::Closed);
        info!(channel = %self.channel, "session: closed");
    }

    /// Serves one connection until it ends, leaving the state `Connecting`
    /// when the driver will reconnect and `Closed` otherwise.
    async fn run_link(
        &self,
        mut link: TransportLink,
        auth: &Arc<AuthErrorRouter>,
        reconnects: bool,
    ) -> Option<String> {
        *self.outbound.lock().await = Some(link.outbound.clone());
        self.state.send_replace(SessionState::Live);
        let _ = self.events.send(SessionEvent::Opened);
        info!(channel = %self.channel, "session: live");

        let reason = loop {
            match link.inbound.recv().await {
                Some(TransportSignal::Frame(text)) => self.handle_frame(&text, auth).await,
                Some(TransportSignal::Closed { reason }) => break reason,
                Some(TransportSignal::Failed(message)) => {
                    warn!(channel = %self.channel, error = %message, "session: transport failed");
                    auth.dispatch(self.channel, AuthError::transport(message.clone()))
                        .await;
                    break Some(message);
                }
                None => break None,
            }
        };

        self.outbound.lock().await.take();
        self.state.send_replace(if reconnects {
            SessionState::Connecting
        } else {
            SessionState::Closed
        });
        reason
    }

    async fn handle_frame(&self, text: &str, auth: &Arc<AuthErrorRouter>) {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "session: invalid server event");
                return;
            }
        };

        if let ServerEvent::Error(error) = &event {
            if AuthError::is_auth_related(error) {
                auth.dispatch(self.channel, AuthError::from(error.clone()))
                    .await;
            } else {
                debug!(channel = %self.channel, code = ?error.code, message = %error.message, "session: server error");
            }
        }
        let _ = self.events.send(SessionEvent::Server(event));
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
