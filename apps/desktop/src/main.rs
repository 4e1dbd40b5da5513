use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, AuthError, ChatChannel, ClearCredentialsAndRedirect, ConnectivityMonitor,
    CredentialMode, LoginNavigator, OfflineQueue, OutboundMessage, SessionEvent, SessionRegistry,
};
use shared::domain::{ChannelKind, MessageMode};
use storage::{KeyValueStore, SqliteStore, AUTH_TOKEN_KEY};
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Sender identity for outgoing messages.
    #[arg(long)]
    user: String,
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message, queueing it for later when the server is unreachable.
    Send {
        to: String,
        text: String,
        #[arg(long)]
        group: bool,
    },
    /// Print events pushed on the chat channel.
    Listen,
    /// Connect and replay the offline queue.
    Drain,
}

struct ConsoleLogin;

impl LoginNavigator for ConsoleLogin {
    fn redirect_to_login(&self, error: &AuthError) {
        warn!(code = ?error.code, "desktop: session rejected: {}", error.message);
        eprintln!("credentials cleared; log in again with --token");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    if settings.user_email.is_empty() {
        settings.user_email = args.user.clone();
    }

    let store = Arc::new(
        SqliteStore::open(&settings.database_url)
            .await
            .context("failed to open client store")?,
    );
    let queue = OfflineQueue::with_max_retries(store.clone(), settings.max_retries);
    let fallback = ClearCredentialsAndRedirect::new(store.clone(), Arc::new(ConsoleLogin));
    let registry = SessionRegistry::websocket(Arc::new(fallback), settings.auth_grace());

    let token = match args.token {
        Some(token) => {
            store.set(AUTH_TOKEN_KEY, token.clone()).await?;
            Some(token)
        }
        None => store.get(AUTH_TOKEN_KEY).await?,
    };
    let credentials = token
        .map(CredentialMode::Bearer)
        .unwrap_or(CredentialMode::Anonymous);
    let session = registry
        .obtain_session(ChannelKind::Chat, settings.session_options(credentials))
        .await;
    let live = session.wait_until_live(CONNECT_TIMEOUT).await.is_ok();
    let chat = ChatChannel::new(registry.clone());

    match args.command {
        Command::Send { to, text, group } => {
            let (message, mode) = if group {
                (OutboundMessage::group(&args.user, &to, &text), MessageMode::Group)
            } else {
                (OutboundMessage::private(&args.user, &to, &text), MessageMode::Private)
            };
            let sent = if live {
                match mode {
                    MessageMode::Private => chat.send_private_message(&args.user, &to, &text).await,
                    MessageMode::Group => chat.send_group_message(&args.user, &to, &text).await,
                }
            } else {
                Err(client_core::SessionError::NotConnected(ChannelKind::Chat))
            };
            match sent {
                Ok(()) => println!("sent to {to}"),
                Err(err) => {
                    let id = queue.enqueue(&to, message, mode).await?;
                    println!("queued {id} for {to} ({err})");
                }
            }
        }
        Command::Listen => {
            if !live {
                anyhow::bail!("chat channel did not come up within {CONNECT_TIMEOUT:?}");
            }
            let mut events = session.subscribe();
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::Server(event) => println!("{}", serde_json::to_string(&event)?),
                    SessionEvent::Closed { reason } => info!(reason = ?reason, "desktop: chat closed"),
                    other => info!(event = ?other, "desktop: session event"),
                }
            }
        }
        Command::Drain => {
            let monitor = ConnectivityMonitor::new(
                queue.clone(),
                Arc::new(chat),
                store.clone(),
                settings.user_email.clone(),
                settings.sending_timeout(),
            );
            match monitor.set_online(live).await {
                Some(report) => println!(
                    "delivered={} failed={} evicted={}",
                    report.delivered, report.failed, report.evicted
                ),
                None => println!("offline; {} message(s) waiting", queue.get_pending().await.len()),
            }
        }
    }

    registry.reset_all().await;
    Ok(())
}
