use std::{sync::Arc, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use shared::{domain::MessageMode, protocol::MessagePayload};
use storage::{KeyValueStore, OFFLINE_QUEUE_KEY};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::QueueError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_UPDATE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Sending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub text: String,
}

impl OutboundMessage {
    pub fn private(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: Some(receiver.into()),
            group_name: None,
            text: text.into(),
        }
    }

    pub fn group(
        sender: impl Into<String>,
        group_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: None,
            group_name: Some(group_name.into()),
            text: text.into(),
        }
    }
}

/// One undelivered message as persisted under `offline_message_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: String,
    pub chat_name: String,
    pub message: OutboundMessage,
    #[serde(rename = "type")]
    pub kind: MessageMode,
    /// Enqueue time, milliseconds since the epoch.
    pub timestamp: i64,
    pub retry_count: u32,
    pub status: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
}

impl QueuedMessage {
    pub fn is_retry_candidate(&self) -> bool {
        matches!(self.status, QueueStatus::Pending | QueueStatus::Failed)
    }

    /// Optimistic rendering of this entry, carrying a provisional id that the
    /// reconciler replaces once the server echoes the message back.
    pub fn provisional_message(&self) -> MessagePayload {
        let enqueued_at = DateTime::<Utc>::from_timestamp_millis(self.timestamp);
        MessagePayload {
            id: Some(format!("offline-{}", self.id)),
            sender: self.message.sender.clone(),
            receiver: self.message.receiver.clone(),
            group_name: self.message.group_name.clone(),
            content: self.message.text.clone(),
            mode: Some(self.kind),
            created_at: enqueued_at.map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            time: enqueued_at.map(|at| at.format("%H:%M").to_string()),
            ..MessagePayload::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retained { retry_count: u32 },
    /// The retry ceiling was reached and the entry was dropped.
    Evicted,
    Missing,
}

/// Durable outbound queue.
///
/// Every mutation is a compare-and-swap against the stored JSON array, so two
/// writers sharing a store retry instead of overwriting each other.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    max_retries: u32,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_max_retries(store, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(store: Arc<dyn KeyValueStore>, max_retries: u32) -> Self {
        Self {
            store,
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn enqueue(
        &self,
        chat_name: &str,
        message: OutboundMessage,
        kind: MessageMode,
    ) -> Result<String, QueueError> {
        let timestamp = Utc::now().timestamp_millis();
        let entry = QueuedMessage {
            id: format!("{timestamp}-{}", Uuid::new_v4().simple()),
            chat_name: chat_name.to_string(),
            message,
            kind,
            timestamp,
            retry_count: 0,
            status: QueueStatus::Pending,
            last_attempt_at: None,
        };
        let id = entry.id.clone();

        self.update(|entries| entries.push(entry.clone())).await?;
        info!(queue_id = %id, chat_name, "offline_queue: message queued");
        Ok(id)
    }

    /// Every entry in insertion order. Read failures degrade to empty.
    pub async fn get_queue(&self) -> Vec<QueuedMessage> {
        match self.read_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, "offline_queue: read failed; reporting an empty queue");
                Vec::new()
            }
        }
    }

    /// Entries eligible for a delivery attempt (`pending` or `failed`).
    pub async fn get_pending(&self) -> Vec<QueuedMessage> {
        self.get_queue()
            .await
            .into_iter()
            .filter(QueuedMessage::is_retry_candidate)
            .collect()
    }

    /// Returns `false` when no entry has this id.
    pub async fn mark_sending(&self, id: &str) -> Result<bool, QueueError> {
        let now = Utc::now().timestamp_millis();
        self.update(|entries| {
            let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) else {
                return false;
            };
            entry.status = QueueStatus::Sending;
            entry.last_attempt_at = Some(now);
            true
        })
        .await
    }

    pub async fn mark_failed(&self, id: &str) -> Result<FailureOutcome, QueueError> {
        let max_retries = self.max_retries;
        let outcome = self
            .update(|entries| match entries.iter().position(|entry| entry.id == id) {
                Some(position) => record_failure(entries, position, max_retries),
                None => FailureOutcome::Missing,
            })
            .await?;
        log_failure(id, outcome);
        Ok(outcome)
    }

    /// Unconditional removal after confirmed delivery.
    pub async fn dequeue(&self, id: &str) -> Result<bool, QueueError> {
        let removed = self
            .update(|entries| {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                entries.len() != before
            })
            .await?;
        if removed {
            debug!(queue_id = %id, "offline_queue: entry delivered and removed");
        }
        Ok(removed)
    }

    /// Drops the whole queue, e.g. on logout.
    pub async fn clear(&self) -> Result<(), QueueError> {
        self.store.remove(OFFLINE_QUEUE_KEY).await?;
        info!("offline_queue: cleared");
        Ok(())
    }

    /// Fails every entry that has been `sending` for at least `timeout`.
    pub async fn expire_stale_sending(
        &self,
        timeout: Duration,
    ) -> Result<Vec<(String, FailureOutcome)>, QueueError> {
        let cutoff = Utc::now().timestamp_millis()
            - i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let max_retries = self.max_retries;
        let expired = self
            .update(|entries| {
                let stale: Vec<String> = entries
                    .iter()
                    .filter(|entry| {
                        entry.status == QueueStatus::Sending
                            && entry.last_attempt_at.unwrap_or(i64::MIN) <= cutoff
                    })
                    .map(|entry| entry.id.clone())
                    .collect();
                stale
                    .into_iter()
                    .filter_map(|id| {
                        let position = entries.iter().position(|entry| entry.id == id)?;
                        Some((id, record_failure(entries, position, max_retries)))
                    })
                    .collect::<Vec<_>>()
            })
            .await?;
        for (id, outcome) in &expired {
            warn!(queue_id = %id, "offline_queue: delivery attempt timed out");
            log_failure(id, *outcome);
        }
        Ok(expired)
    }

    async fn read_entries(&self) -> Result<Vec<QueuedMessage>, QueueError> {
        let raw = self.store.get(OFFLINE_QUEUE_KEY).await?;
        decode(raw.as_deref())
    }

    async fn update<T>(
        &self,
        mut apply: impl FnMut(&mut Vec<QueuedMessage>) -> T,
    ) -> Result<T, QueueError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let raw = self.store.get(OFFLINE_QUEUE_KEY).await?;
            let mut entries = decode(raw.as_deref())?;
            let result = apply(&mut entries);
            let next = if entries.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&entries)?)
            };
            if next == raw {
                return Ok(result);
            }
            if self
                .store
                .compare_and_swap(OFFLINE_QUEUE_KEY, raw.as_deref(), next)
                .await?
            {
                return Ok(result);
            }
            debug!(attempt, "offline_queue: concurrent write detected; retrying update");
        }
        Err(QueueError::Contended {
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }
}

fn decode(raw: Option<&str>) -> Result<Vec<QueuedMessage>, QueueError> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(Vec::new()),
    }
}

/// `retry_count` is compared with `>=`, so the `max_retries`-th failure evicts.
fn record_failure(
    entries: &mut Vec<QueuedMessage>,
    position: usize,
    max_retries: u32,
) -> FailureOutcome {
    let entry = &mut entries[position];
    entry.retry_count += 1;
    if entry.retry_count >= max_retries {
        entries.remove(position);
        return FailureOutcome::Evicted;
    }
    entry.status = QueueStatus::Failed;
    FailureOutcome::Retained {
        retry_count: entry.retry_count,
    }
}

fn log_failure(id: &str, outcome: FailureOutcome) {
    match outcome {
        FailureOutcome::Retained { retry_count } => {
            info!(queue_id = %id, retry_count, "offline_queue: delivery failed; will retry");
        }
        FailureOutcome::Evicted => {
            warn!(queue_id = %id, "offline_queue: retry ceiling reached; message dropped");
        }
        FailureOutcome::Missing => {
            debug!(queue_id = %id, "offline_queue: failure reported for unknown entry");
        }
    }
}

#[cfg(test)]
#[path = "tests/offline_queue_tests.rs"]
mod tests;
