use shared::protocol::MessagePayload;

use crate::reconcile::merge;

/// Reconciled message history for one conversation, bounded to `max_items`
/// (oldest dropped first).
#[derive(Debug, Clone)]
pub struct ConversationTimeline {
    items: Vec<MessagePayload>,
    max_items: usize,
}

impl ConversationTimeline {
    /// Create a timeline with an item cap (`max_items >= 1`).
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items: max_items.max(1),
        }
    }

    pub fn items(&self) -> &[MessagePayload] {
        &self.items
    }

    /// Replace the history with cached messages reconciled against a fetch.
    pub fn load(&mut self, cached: Vec<MessagePayload>, fetched: Vec<MessagePayload>) {
        self.items = merge(cached, fetched);
        self.trim_to_max();
    }

    /// Apply a message pushed by a live session.
    pub fn push_live(&mut self, message: MessagePayload) {
        self.items = merge(std::mem::take(&mut self.items), vec![message]);
        self.trim_to_max();
    }

    /// Show a message that has not reached the server yet.
    pub fn push_optimistic(&mut self, message: MessagePayload) {
        let mut local = std::mem::take(&mut self.items);
        local.push(message);
        self.items = merge(local, Vec::new());
        self.trim_to_max();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn trim_to_max(&mut self) {
        if self.items.len() <= self.max_items {
            return;
        }

        let excess = self.items.len() - self.max_items;
        self.items.drain(0..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_ID: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn live_echo_replaces_optimistic_message() {
        let mut timeline = ConversationTimeline::new(50);
        timeline.load(
            Vec::new(),
            vec![MessagePayload::text("b", "hello")
                .with_id("507f1f77bcf86cd799439000")
                .with_created_at("2024-01-01T09:00:00Z")],
        );
        timeline.push_optimistic(
            MessagePayload::text("a", "hi")
                .with_id("offline-1704-abc")
                .with_time("10:00"),
        );
        assert_eq!(timeline.items().len(), 2);

        timeline.push_live(
            MessagePayload::text("a", "hi")
                .with_id(SERVER_ID)
                .with_created_at("2024-01-01T10:00:00Z"),
        );

        let ids: Vec<_> = timeline
            .items()
            .iter()
            .map(|m| m.id.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["507f1f77bcf86cd799439000", SERVER_ID]);
    }

    #[test]
    fn repeated_live_push_is_deduplicated() {
        let mut timeline = ConversationTimeline::new(10);
        let message = MessagePayload::text("b", "ping")
            .with_id(SERVER_ID)
            .with_created_at("2024-01-01T10:00:00Z");
        timeline.push_live(message.clone());
        timeline.push_live(message);
        assert_eq!(timeline.items().len(), 1);
    }

    #[test]
    fn trims_oldest_when_over_max_items() {
        let mut timeline = ConversationTimeline::new(2);
        timeline.load(
            vec![
                MessagePayload::text("a", "one").with_created_at("2024-01-01T10:01:00Z"),
                MessagePayload::text("a", "three").with_created_at("2024-01-01T10:03:00Z"),
            ],
            vec![MessagePayload::text("b", "two").with_created_at("2024-01-01T10:02:00Z")],
        );

        let contents: Vec<_> = timeline.items().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }
}
