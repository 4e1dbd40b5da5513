use std::{collections::HashMap, sync::Arc, time::Duration};

use shared::domain::ChannelKind;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    auth::{AuthError, AuthErrorRouter, AuthFallbackPolicy},
    session::{ChannelSession, SessionOptions},
    transport::{Transport, WebSocketTransport},
};

/// Owns at most one session per channel. Callers share the registry by `Arc`.
pub struct SessionRegistry {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthErrorRouter>,
    sessions: Mutex<HashMap<ChannelKind, Arc<ChannelSession>>>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        fallback: Arc<dyn AuthFallbackPolicy>,
        auth_grace: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            auth: AuthErrorRouter::new(fallback, auth_grace),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn websocket(fallback: Arc<dyn AuthFallbackPolicy>, auth_grace: Duration) -> Arc<Self> {
        Self::new(Arc::new(WebSocketTransport), fallback, auth_grace)
    }

    /// Returns the channel's session, creating one unless a live or
    /// reconnecting session already exists. `options` only apply on creation.
    pub async fn obtain_session(
        &self,
        channel: ChannelKind,
        options: SessionOptions,
    ) -> Arc<ChannelSession> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&channel).filter(|s| s.is_usable()) {
            debug!(channel = %channel, "registry: reusing session");
            return Arc::clone(existing);
        }

        let session = ChannelSession::open(
            channel,
            options,
            Arc::clone(&self.transport),
            Arc::clone(&self.auth),
        )
        .await;
        sessions.insert(channel, Arc::clone(&session));
        info!(channel = %channel, "registry: session created");
        session
    }

    /// The channel's session if it has not closed.
    pub async fn session(&self, channel: ChannelKind) -> Option<Arc<ChannelSession>> {
        self.sessions
            .lock()
            .await
            .get(&channel)
            .filter(|s| s.is_usable())
            .cloned()
    }

    /// Registers the channel's auth-error handler, replacing any previous one.
    pub async fn on_auth_error(
        &self,
        channel: ChannelKind,
        handler: impl Fn(AuthError) + Send + Sync + 'static,
    ) {
        self.auth.subscribe(channel, Arc::new(handler)).await;
    }

    pub fn auth(&self) -> &Arc<AuthErrorRouter> {
        &self.auth
    }

    pub async fn disconnect(&self, channel: ChannelKind) {
        let removed = self.sessions.lock().await.remove(&channel);
        if let Some(session) = removed {
            session.shutdown().await;
        }
    }

    /// Disconnects and also drops the channel's auth-error subscription.
    pub async fn reset_channel(&self, channel: ChannelKind) {
        self.disconnect(channel).await;
        self.auth.unsubscribe(channel).await;
    }

    /// Logout: every channel disconnected, every subscription cleared.
    pub async fn reset_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (_, session) in drained {
            session.shutdown().await;
        }
        self.auth.clear().await;
        info!("registry: all channels reset");
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
