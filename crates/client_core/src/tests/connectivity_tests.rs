use super::*;
use crate::offline_queue::{OutboundMessage, QueueStatus};
use shared::domain::{ChannelKind, MessageMode};
use std::{collections::HashSet, sync::Mutex as StdMutex};
use storage::MemoryStore;

/// Records deliveries; entries whose text is in `reject` fail.
#[derive(Default)]
struct ScriptedDispatcher {
    delivered: StdMutex<Vec<String>>,
    reject: HashSet<String>,
    stall: bool,
}

impl ScriptedDispatcher {
    fn rejecting(texts: &[&str]) -> Self {
        Self {
            reject: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().expect("dispatcher lock").clone()
    }
}

#[async_trait]
impl MessageDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, entry: &QueuedMessage) -> Result<(), SessionError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.reject.contains(&entry.message.text) {
            return Err(SessionError::NotConnected(ChannelKind::Chat));
        }
        self.delivered
            .lock()
            .expect("dispatcher lock")
            .push(entry.message.text.clone());
        Ok(())
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    queue: OfflineQueue,
    dispatcher: Arc<ScriptedDispatcher>,
    monitor: Arc<ConnectivityMonitor>,
}

fn fixture(dispatcher: ScriptedDispatcher) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let queue = OfflineQueue::new(store.clone());
    let dispatcher = Arc::new(dispatcher);
    let monitor = ConnectivityMonitor::new(
        queue.clone(),
        dispatcher.clone(),
        store.clone(),
        "a@example.com",
        Duration::from_millis(200),
    );
    Fixture {
        store,
        queue,
        dispatcher,
        monitor,
    }
}

async fn enqueue_private(queue: &OfflineQueue, peer: &str, text: &str) -> String {
    queue
        .enqueue(peer, OutboundMessage::private("a", peer, text), MessageMode::Private)
        .await
        .expect("enqueue")
}

#[tokio::test]
async fn coming_online_delivers_and_dequeues_in_order() {
    let f = fixture(ScriptedDispatcher::default());
    enqueue_private(&f.queue, "b", "one").await;
    enqueue_private(&f.queue, "b", "two").await;
    f.queue
        .enqueue("devs", OutboundMessage::group("a", "devs", "three"), MessageMode::Group)
        .await
        .expect("enqueue");

    let report = f.monitor.set_online(true).await.expect("transition sweeps");

    assert_eq!(
        report,
        SweepReport {
            delivered: 3,
            failed: 0,
            evicted: 0
        }
    );
    let delivered = f.dispatcher.delivered();
    let position = |text: &str| delivered.iter().position(|t| t == text).expect("delivered");
    assert!(position("one") < position("two"));
    assert!(f.queue.get_queue().await.is_empty());
}

#[tokio::test]
async fn only_transitions_trigger_sweeps() {
    let f = fixture(ScriptedDispatcher::default());
    assert!(f.monitor.set_online(false).await.is_none());
    assert!(f.monitor.set_online(true).await.is_some());
    assert!(f.monitor.set_online(true).await.is_none());
    assert!(f.monitor.is_online());
    assert!(f.monitor.set_online(false).await.is_none());
    assert!(!f.monitor.is_online());
}

#[tokio::test]
async fn sweep_while_offline_touches_nothing() {
    let f = fixture(ScriptedDispatcher::default());
    enqueue_private(&f.queue, "b", "hi").await;

    assert_eq!(f.monitor.sweep().await, SweepReport::default());
    assert!(f.dispatcher.delivered().is_empty());
    assert_eq!(f.queue.get_queue().await[0].status, QueueStatus::Pending);
}

#[tokio::test]
async fn failed_deliveries_count_towards_eviction() {
    let f = fixture(ScriptedDispatcher::rejecting(&["doomed"]));
    enqueue_private(&f.queue, "b", "doomed").await;
    enqueue_private(&f.queue, "c", "fine").await;

    let first = f.monitor.set_online(true).await.expect("sweep");
    assert_eq!(first.delivered, 1);
    assert_eq!(first.failed, 1);
    let remaining = f.queue.get_queue().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, QueueStatus::Failed);
    assert_eq!(remaining[0].retry_count, 1);

    assert_eq!(f.monitor.sweep().await.failed, 1);
    let last = f.monitor.sweep().await;
    assert_eq!(last.evicted, 1);
    assert!(f.queue.get_queue().await.is_empty());
}

#[tokio::test]
async fn stalled_delivery_times_out_into_failed() {
    let f = fixture(ScriptedDispatcher {
        stall: true,
        ..ScriptedDispatcher::default()
    });
    enqueue_private(&f.queue, "b", "slow").await;

    let report = f.monitor.set_online(true).await.expect("sweep");

    assert_eq!(report.failed, 1);
    let entry = f.queue.get_queue().await.remove(0);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.retry_count, 1);
}

#[tokio::test]
async fn entries_stuck_in_sending_are_expired_by_sweep() {
    let f = fixture(ScriptedDispatcher::default());
    let id = enqueue_private(&f.queue, "b", "stuck").await;
    f.queue.mark_sending(&id).await.expect("sending");
    tokio::time::sleep(Duration::from_millis(250)).await;

    let report = f.monitor.set_online(true).await.expect("sweep");

    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(f.dispatcher.delivered(), vec!["stuck".to_string()]);
    assert!(f.queue.get_queue().await.is_empty());
}

#[tokio::test]
async fn records_last_connection_per_user() {
    let f = fixture(ScriptedDispatcher::default());
    assert!(f.monitor.last_connection().await.is_none());

    let before = Utc::now();
    f.monitor.set_online(true).await;

    let recorded = f.monitor.last_connection().await.expect("recorded");
    assert!(recorded >= before - chrono::Duration::seconds(1));
    assert!(f
        .store
        .get("last_connection_a@example.com")
        .await
        .expect("get")
        .is_some());
}

#[tokio::test]
async fn watch_follows_connectivity_changes() {
    let f = fixture(ScriptedDispatcher::default());
    let (tx, rx) = watch::channel(false);
    let handle = f.monitor.spawn_watch(rx);

    enqueue_private(&f.queue, "b", "queued while offline").await;
    tx.send(true).expect("watcher alive");

    tokio::time::timeout(Duration::from_secs(2), async {
        while !f.queue.get_queue().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained");
    assert!(f.monitor.is_online());

    drop(tx);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("watch ends")
        .expect("task ok");
}

#[test]
fn grouping_keeps_first_seen_chat_order() {
    let entry = |id: &str, chat: &str| QueuedMessage {
        id: id.into(),
        chat_name: chat.into(),
        message: OutboundMessage::private("a", chat, id),
        kind: MessageMode::Private,
        timestamp: 0,
        retry_count: 0,
        status: QueueStatus::Pending,
        last_attempt_at: None,
    };
    let groups = group_by_chat(vec![
        entry("1", "b"),
        entry("2", "c"),
        entry("3", "b"),
    ]);
    let ids: Vec<Vec<&str>> = groups
        .iter()
        .map(|g| g.iter().map(|e| e.id.as_str()).collect())
        .collect();
    assert_eq!(ids, vec![vec!["1", "3"], vec!["2"]]);
}
