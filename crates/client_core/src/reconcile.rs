use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, NaiveDateTime};
use shared::protocol::MessagePayload;

use crate::identity::{content_key, echo_key, identity_key, is_provisional_id, server_id};

/// Keeps the first occurrence of every identity key, preserving input order.
///
/// This does not sort; callers that need chronological order sort first.
pub fn deduplicate(messages: impl IntoIterator<Item = MessagePayload>) -> Vec<MessagePayload> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|message| seen.insert(identity_key(message)))
        .collect()
}

/// Merges a local snapshot with server messages, server winning on collision.
///
/// A server message with a well-formed id replaces the unconfirmed local copy
/// it confirms, even when the server assigned a different timestamp. The
/// result is sorted ascending by `createdAt` (missing sorts first).
pub fn merge(local: Vec<MessagePayload>, server: Vec<MessagePayload>) -> Vec<MessagePayload> {
    let mut merged = MergeMap::with_capacity(local.len() + server.len());

    for message in local {
        merged.insert_local(message);
    }
    for message in server {
        merged.insert_server(message);
    }

    let mut ordered = merged.into_messages();
    ordered.sort_by_key(created_at_millis);
    deduplicate(ordered)
}

/// Milliseconds since the epoch of `createdAt`, or 0 when absent/unparseable.
pub fn created_at_millis(message: &MessagePayload) -> i64 {
    let Some(raw) = message.created_at.as_deref() else {
        return 0;
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.timestamp_millis();
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp_millis())
        .unwrap_or(0)
}

/// Local messages the server may echo back under a different timestamp:
/// provisional ids, or no `createdAt` of their own.
fn awaits_echo(message: &MessagePayload) -> bool {
    message.id.as_deref().is_some_and(is_provisional_id)
        || message.created_at.as_deref().map_or(true, str::is_empty)
}

struct Slot {
    message: MessagePayload,
    placeholder: bool,
}

/// Key to message mapping that keeps first-insertion positions so ties in the
/// final sort stay deterministic.
struct MergeMap {
    slots: Vec<Option<Slot>>,
    index: HashMap<String, usize>,
    placeholders: HashMap<String, VecDeque<String>>,
}

impl MergeMap {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            placeholders: HashMap::new(),
        }
    }

    fn insert_local(&mut self, message: MessagePayload) {
        let key = identity_key(&message);
        let placeholder = server_id(&message).is_none();
        if placeholder && awaits_echo(&message) {
            self.placeholders
                .entry(echo_key(&message))
                .or_default()
                .push_back(key.clone());
        }
        self.upsert(key, message, placeholder);
    }

    fn insert_server(&mut self, message: MessagePayload) {
        let key = identity_key(&message);
        if server_id(&message).is_some() {
            let evicted = self.evict_placeholder(&content_key(&message));
            if !evicted && !self.index.contains_key(&key) {
                self.evict_echoed_placeholder(&message);
            }
        }
        self.upsert(key, message, false);
    }

    /// Consumes the oldest unconfirmed local copy with the same sender and
    /// content, for echoes whose timestamp differs from the local one.
    fn evict_echoed_placeholder(&mut self, confirmed: &MessagePayload) {
        let echo = echo_key(confirmed);
        while let Some(candidate) = self
            .placeholders
            .get_mut(&echo)
            .and_then(VecDeque::pop_front)
        {
            if self.evict_placeholder(&candidate) {
                break;
            }
        }
    }

    fn evict_placeholder(&mut self, key: &str) -> bool {
        let Some(&position) = self.index.get(key) else {
            return false;
        };
        let is_placeholder = self.slots[position]
            .as_ref()
            .is_some_and(|slot| slot.placeholder);
        if !is_placeholder {
            return false;
        }
        self.slots[position] = None;
        self.index.remove(key);
        true
    }

    fn upsert(&mut self, key: String, message: MessagePayload, placeholder: bool) {
        let slot = Slot {
            message,
            placeholder,
        };
        match self.index.get(&key) {
            Some(&position) => self.slots[position] = Some(slot),
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(Some(slot));
            }
        }
    }

    fn into_messages(self) -> Vec<MessagePayload> {
        self.slots
            .into_iter()
            .flatten()
            .map(|slot| slot.message)
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
