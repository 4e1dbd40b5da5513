use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::domain::ChannelKind;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::SessionError,
    session::{CredentialMode, SessionOptions},
};

const OUTBOUND_BUFFER: usize = 100;
const INBOUND_BUFFER: usize = 256;

/// What the read side of a connection reports to the session driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Frame(String),
    Closed { reason: Option<String> },
    Failed(String),
}

/// One established connection. Dropping the link stops its background tasks.
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportSignal>,
    tasks: Vec<JoinHandle<()>>,
}

impl TransportLink {
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<TransportSignal>) -> Self {
        Self {
            outbound,
            inbound,
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        channel: ChannelKind,
        options: &SessionOptions,
    ) -> Result<TransportLink, SessionError>;
}

/// Maps `http(s)://host[/base]` to `ws(s)://host[/base]/ws/<channel>`.
pub fn channel_endpoint(server_url: &str, channel: ChannelKind) -> Result<Url, SessionError> {
    let invalid = |reason: String| SessionError::InvalidEndpoint {
        url: server_url.to_string(),
        reason,
    };
    let mut url = Url::parse(server_url.trim()).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to {scheme}")))?;

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/ws/{channel}"));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// JSON text frames over a WebSocket per channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        channel: ChannelKind,
        options: &SessionOptions,
    ) -> Result<TransportLink, SessionError> {
        let endpoint = channel_endpoint(&options.server_url, channel)?;
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|err| SessionError::Transport(err.to_string()))?;
        if let CredentialMode::Bearer(token) = &options.credentials {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                SessionError::Transport("bearer token is not a valid header value".into())
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|err| SessionError::Transport(format!("failed to connect {endpoint}: {err}")))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        // Ends once every outbound sender is dropped, closing the socket cleanly.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(channel = %channel, error = %err, "transport: websocket write failed");
                    return;
                }
            }
            let _ = ws_writer.close().await;
            debug!(channel = %channel, "transport: writer closed");
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                let signal = match frame {
                    Ok(Message::Text(text)) => TransportSignal::Frame(text),
                    Ok(Message::Close(close)) => {
                        let _ = inbound_tx
                            .send(TransportSignal::Closed {
                                reason: close.map(|frame| frame.reason.to_string()),
                            })
                            .await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        let _ = inbound_tx.send(TransportSignal::Failed(err.to_string())).await;
                        return;
                    }
                };
                if inbound_tx.send(signal).await.is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportSignal::Closed { reason: None }).await;
        });

        Ok(TransportLink::new(outbound_tx, inbound_rx).with_task(reader))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
