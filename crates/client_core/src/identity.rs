//! Stable identity keys for chat messages.
//!
//! A message is identified by its server id when it has a well-formed one,
//! otherwise by `(sender, content, createdAt)` and finally by
//! `(sender, content, time)`.

use shared::protocol::MessagePayload;
use uuid::Uuid;

/// Joins key components. Components are escaped so it never occurs inside one.
pub const KEY_SEPARATOR: char = '\u{1f}';
pub const SERVER_ID_LEN: usize = 24;
pub const PROVISIONAL_ID_PREFIXES: [&str; 2] = ["offline-", "temp-"];

pub fn is_provisional_id(id: &str) -> bool {
    PROVISIONAL_ID_PREFIXES
        .iter()
        .any(|prefix| id.starts_with(prefix))
}

pub fn is_server_id(id: &str) -> bool {
    !is_provisional_id(id) && id.len() == SERVER_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The message's id when it is a well-formed server id.
pub fn server_id(message: &MessagePayload) -> Option<&str> {
    message.id.as_deref().filter(|id| is_server_id(id))
}

pub fn identity_key(message: &MessagePayload) -> String {
    match server_id(message) {
        Some(id) => id.to_string(),
        None => content_key(message),
    }
}

/// Identity key computed without the server-id rule.
///
/// `createdAt` is used as the raw string: reparsing could collapse distinct
/// timestamps under lossy formatting.
pub fn content_key(message: &MessagePayload) -> String {
    let body = key_body(message);
    if message.sender.is_empty() && body.is_empty() {
        return format!("unkeyed{KEY_SEPARATOR}{}", Uuid::new_v4().simple());
    }

    let stamp = non_empty(message.created_at.as_deref())
        .or_else(|| non_empty(message.time.as_deref()))
        .unwrap_or_default();

    join_components(&[&message.sender, body, stamp])
}

/// `(sender, content)` only; pairs an unconfirmed local message with its
/// server echo when the two carry different timestamps.
pub(crate) fn echo_key(message: &MessagePayload) -> String {
    join_components(&[&message.sender, key_body(message)])
}

fn key_body(message: &MessagePayload) -> &str {
    if message.content.is_empty() {
        message.media_url.as_deref().unwrap_or_default()
    } else {
        &message.content
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn join_components(components: &[&str]) -> String {
    let mut key = String::new();
    for (index, component) in components.iter().enumerate() {
        if index > 0 {
            key.push(KEY_SEPARATOR);
        }
        escape_into(&mut key, component);
    }
    key
}

fn escape_into(out: &mut String, component: &str) {
    for ch in component.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            KEY_SEPARATOR => out.push_str("\\u001f"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
