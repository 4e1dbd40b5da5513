use std::{
    ops::AddAssign,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use storage::{last_connection_key, KeyValueStore};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::SessionError,
    offline_queue::{FailureOutcome, OfflineQueue, QueuedMessage},
};

/// Delivers one queued message over whatever transport is live.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn dispatch(&self, entry: &QueuedMessage) -> Result<(), SessionError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
}

impl AddAssign for SweepReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.evicted += other.evicted;
    }
}

/// Tracks the last known connectivity and replays the offline queue when the
/// client comes back online.
pub struct ConnectivityMonitor {
    queue: OfflineQueue,
    dispatcher: Arc<dyn MessageDispatcher>,
    store: Arc<dyn KeyValueStore>,
    user_email: String,
    delivery_timeout: Duration,
    online: AtomicBool,
    sweep_lock: Mutex<()>,
}

impl ConnectivityMonitor {
    pub fn new(
        queue: OfflineQueue,
        dispatcher: Arc<dyn MessageDispatcher>,
        store: Arc<dyn KeyValueStore>,
        user_email: impl Into<String>,
        delivery_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            dispatcher,
            store,
            user_email: user_email.into(),
            delivery_timeout,
            online: AtomicBool::new(false),
            sweep_lock: Mutex::new(()),
        })
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records the new state; an offline to online transition stamps the last
    /// connection time and runs a sweep, whose report is returned.
    pub async fn set_online(&self, online: bool) -> Option<SweepReport> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return None;
        }
        if !online {
            info!("connectivity: offline");
            return None;
        }

        info!("connectivity: online");
        self.record_connection().await;
        Some(self.sweep().await)
    }

    /// Replays pending entries: serially within a chat, concurrently across
    /// chats. Does nothing while offline.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        if !self.is_online() {
            debug!("connectivity: offline; sweep skipped");
            return SweepReport::default();
        }

        let mut report = SweepReport::default();
        match self.queue.expire_stale_sending(self.delivery_timeout).await {
            Ok(expired) => {
                for (_, outcome) in expired {
                    report += outcome_report(outcome);
                }
            }
            Err(err) => warn!(error = %err, "connectivity: failed to expire stale deliveries"),
        }

        let groups = group_by_chat(self.queue.get_pending().await);
        if groups.is_empty() {
            return report;
        }
        info!(chats = groups.len(), "connectivity: replaying offline queue");

        let results = join_all(groups.into_iter().map(|group| self.replay_chat(group))).await;
        for result in results {
            report += result;
        }
        info!(
            delivered = report.delivered,
            failed = report.failed,
            evicted = report.evicted,
            "connectivity: sweep finished"
        );
        report
    }

    /// Follows connectivity changes until the sender side goes away.
    pub async fn watch(&self, mut online: watch::Receiver<bool>) {
        let current = *online.borrow_and_update();
        self.set_online(current).await;
        while online.changed().await.is_ok() {
            let current = *online.borrow_and_update();
            self.set_online(current).await;
        }
        debug!("connectivity: watch ended");
    }

    pub fn spawn_watch(self: &Arc<Self>, online: watch::Receiver<bool>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.watch(online).await })
    }

    pub async fn last_connection(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(&last_connection_key(&self.user_email)).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "connectivity: failed to read last connection");
                return None;
            }
        };
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    async fn record_connection(&self) {
        let key = last_connection_key(&self.user_email);
        if let Err(err) = self.store.set(&key, Utc::now().to_rfc3339()).await {
            warn!(error = %err, "connectivity: failed to record last connection");
        }
    }

    async fn replay_chat(&self, entries: Vec<QueuedMessage>) -> SweepReport {
        let mut report = SweepReport::default();
        for entry in entries {
            report += self.replay_entry(&entry).await;
        }
        report
    }

    async fn replay_entry(&self, entry: &QueuedMessage) -> SweepReport {
        match self.queue.mark_sending(&entry.id).await {
            Ok(true) => {}
            Ok(false) => return SweepReport::default(),
            Err(err) => {
                warn!(queue_id = %entry.id, error = %err, "connectivity: could not claim entry");
                return SweepReport::default();
            }
        }

        let attempt = tokio::time::timeout(self.delivery_timeout, self.dispatcher.dispatch(entry))
            .await
            .unwrap_or(Err(SessionError::Timeout(self.delivery_timeout)));

        match attempt {
            Ok(()) => match self.queue.dequeue(&entry.id).await {
                Ok(_) => SweepReport {
                    delivered: 1,
                    ..SweepReport::default()
                },
                Err(err) => {
                    warn!(queue_id = %entry.id, error = %err, "connectivity: delivered but not dequeued");
                    SweepReport {
                        delivered: 1,
                        ..SweepReport::default()
                    }
                }
            },
            Err(err) => {
                debug!(queue_id = %entry.id, chat_name = %entry.chat_name, error = %err, "connectivity: delivery failed");
                match self.queue.mark_failed(&entry.id).await {
                    Ok(outcome) => outcome_report(outcome),
                    Err(err) => {
                        warn!(queue_id = %entry.id, error = %err, "connectivity: could not record failure");
                        SweepReport {
                            failed: 1,
                            ..SweepReport::default()
                        }
                    }
                }
            }
        }
    }
}

fn outcome_report(outcome: FailureOutcome) -> SweepReport {
    match outcome {
        FailureOutcome::Retained { .. } => SweepReport {
            failed: 1,
            ..SweepReport::default()
        },
        FailureOutcome::Evicted => SweepReport {
            evicted: 1,
            ..SweepReport::default()
        },
        FailureOutcome::Missing => SweepReport::default(),
    }
}

/// Groups by `chat_name` in first-seen order, keeping entry order per group.
fn group_by_chat(entries: Vec<QueuedMessage>) -> Vec<Vec<QueuedMessage>> {
    let mut groups: Vec<Vec<QueuedMessage>> = Vec::new();
    for entry in entries {
        match groups
            .iter_mut()
            .find(|group| group[0].chat_name == entry.chat_name)
        {
            Some(group) => group.push(entry),
            None => groups.push(vec![entry]),
        }
    }
    groups
}

#[cfg(test)]
#[path = "tests/connectivity_tests.rs"]
mod tests;
