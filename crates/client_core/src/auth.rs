use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::ChannelKind,
    error::{ApiError, ErrorCode},
};
use storage::{KeyValueStore, CREDENTIAL_KEYS};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Authentication or connectivity failure reported for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub message: String,
    pub code: ErrorCode,
    pub requires_login: bool,
}

impl AuthError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: ErrorCode::Transport,
            requires_login: false,
        }
    }

    /// Whether a pushed server error should travel the auth-error path.
    pub fn is_auth_related(error: &ApiError) -> bool {
        error.requires_login || matches!(error.code, ErrorCode::Unauthorized | ErrorCode::TokenExpired)
    }
}

impl From<ApiError> for AuthError {
    fn from(error: ApiError) -> Self {
        Self {
            message: error.message,
            code: error.code,
            requires_login: error.requires_login,
        }
    }
}

pub type AuthErrorHandler = Arc<dyn Fn(AuthError) + Send + Sync>;

/// What happens to an auth error nobody subscribed to.
#[async_trait]
pub trait AuthFallbackPolicy: Send + Sync {
    async fn handle(&self, channel: ChannelKind, error: AuthError);
}

pub struct NoopAuthFallback;

#[async_trait]
impl AuthFallbackPolicy for NoopAuthFallback {
    async fn handle(&self, channel: ChannelKind, error: AuthError) {
        debug!(channel = %channel, code = ?error.code, "auth: unhandled error ignored");
    }
}

pub trait LoginNavigator: Send + Sync {
    fn redirect_to_login(&self, error: &AuthError);
}

/// Discards stored credentials and sends the user back to login, but only for
/// errors flagged `requires_login`; transport hiccups are left alone.
pub struct ClearCredentialsAndRedirect {
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn LoginNavigator>,
}

impl ClearCredentialsAndRedirect {
    pub fn new(store: Arc<dyn KeyValueStore>, navigator: Arc<dyn LoginNavigator>) -> Self {
        Self { store, navigator }
    }
}

#[async_trait]
impl AuthFallbackPolicy for ClearCredentialsAndRedirect {
    async fn handle(&self, channel: ChannelKind, error: AuthError) {
        if !error.requires_login {
            debug!(channel = %channel, code = ?error.code, "auth: error does not require login");
            return;
        }

        for key in CREDENTIAL_KEYS {
            if let Err(err) = self.store.remove(key).await {
                warn!(key, error = %err, "auth: failed to clear stored credential");
            }
        }
        info!(channel = %channel, "auth: credentials cleared; redirecting to login");
        self.navigator.redirect_to_login(&error);
    }
}

/// Per-channel auth-error subscriptions with a fallback for channels that
/// have none. Subscribing replaces the previous handler.
pub struct AuthErrorRouter {
    handlers: RwLock<HashMap<ChannelKind, AuthErrorHandler>>,
    fallback: Arc<dyn AuthFallbackPolicy>,
    grace: Duration,
}

impl AuthErrorRouter {
    pub fn new(fallback: Arc<dyn AuthFallbackPolicy>, grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            handlers: RwLock::new(HashMap::new()),
            fallback,
            grace,
        })
    }

    pub async fn subscribe(&self, channel: ChannelKind, handler: AuthErrorHandler) {
        let replaced = self.handlers.write().await.insert(channel, handler);
        if replaced.is_some() {
            debug!(channel = %channel, "auth: replaced previous error subscription");
        }
    }

    pub async fn unsubscribe(&self, channel: ChannelKind) {
        self.handlers.write().await.remove(&channel);
    }

    pub async fn clear(&self) {
        self.handlers.write().await.clear();
    }

    pub async fn has_subscription(&self, channel: ChannelKind) -> bool {
        self.handlers.read().await.contains_key(&channel)
    }

    /// Delivers to the channel's subscriber, or after the grace delay (and a
    /// second look for a late subscriber) to the fallback policy.
    pub async fn dispatch(self: &Arc<Self>, channel: ChannelKind, error: AuthError) {
        if let Some(handler) = self.handler(channel).await {
            handler(error);
            return;
        }

        let router = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(router.grace).await;
            match router.handler(channel).await {
                Some(handler) => handler(error),
                None => router.fallback.handle(channel, error).await,
            }
        });
    }

    async fn handler(&self, channel: ChannelKind) -> Option<AuthErrorHandler> {
        self.handlers.read().await.get(&channel).cloned()
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
