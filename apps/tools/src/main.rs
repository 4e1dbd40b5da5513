use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{OfflineQueue, QueueStatus};
use storage::{last_connection_key, KeyValueStore, SqliteStore};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/client.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every queued outbound message.
    List,
    /// Drop the whole offline queue.
    Clear,
    /// Drop one entry by id.
    Remove { id: String },
    LastConnection { user_email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let cli = Cli::parse();
    let store = Arc::new(SqliteStore::open(&cli.database_url).await?);
    let queue = OfflineQueue::new(store.clone());

    match cli.command {
        Command::List => {
            let entries = queue.get_queue().await;
            if entries.is_empty() {
                println!("offline queue is empty");
            }
            for entry in entries {
                let status = match entry.status {
                    QueueStatus::Pending => "pending",
                    QueueStatus::Sending => "sending",
                    QueueStatus::Failed => "failed",
                };
                println!(
                    "{} chat={} type={} status={status} retries={} text={:?}",
                    entry.id,
                    entry.chat_name,
                    entry.kind.as_str(),
                    entry.retry_count,
                    entry.message.text
                );
            }
        }
        Command::Clear => {
            queue.clear().await?;
            println!("offline queue cleared");
        }
        Command::Remove { id } => {
            if queue.dequeue(&id).await? {
                println!("removed {id}");
            } else {
                println!("no queued message with id {id}");
            }
        }
        Command::LastConnection { user_email } => {
            match store.get(&last_connection_key(&user_email)).await? {
                Some(at) => println!("{user_email} last connected at {at}"),
                None => println!("no connection recorded for {user_email}"),
            }
        }
    }

    Ok(())
}
