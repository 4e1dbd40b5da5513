pub mod auth;
pub mod chat;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod history;
pub mod identity;
pub mod offline_queue;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod signaling;
pub mod timeline;
pub mod transport;

pub use auth::{
    AuthError, AuthErrorRouter, AuthFallbackPolicy, ClearCredentialsAndRedirect, LoginNavigator,
    NoopAuthFallback,
};
pub use chat::{ChatChannel, MediaTarget};
pub use config::{load_settings, ClientSettings};
pub use connectivity::{ConnectivityMonitor, MessageDispatcher, SweepReport};
pub use error::{HistoryError, QueueError, SessionError, SettingsError};
pub use history::HistoryClient;
pub use identity::{content_key, identity_key};
pub use offline_queue::{
    FailureOutcome, OfflineQueue, OutboundMessage, QueueStatus, QueuedMessage,
};
pub use reconcile::{deduplicate, merge};
pub use registry::SessionRegistry;
pub use session::{
    ChannelSession, CredentialMode, ReconnectPolicy, SessionEvent, SessionOptions, SessionState,
};
pub use signaling::{SignalTarget, VideoSignaling};
pub use timeline::ConversationTimeline;
pub use transport::{Transport, TransportLink, TransportSignal, WebSocketTransport};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
