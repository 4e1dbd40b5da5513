use super::*;

const SERVER_ID: &str = "507f1f77bcf86cd799439011";

#[test]
fn well_formed_server_id_is_returned_verbatim() {
    let message = MessagePayload::text("a", "hi")
        .with_id(SERVER_ID)
        .with_created_at("2024-01-01T10:00:00Z");
    assert_eq!(identity_key(&message), SERVER_ID);
}

#[test]
fn provisional_and_malformed_ids_fall_back_to_content() {
    let provisional = MessagePayload::text("a", "hi")
        .with_id("offline-1717-abc")
        .with_created_at("2024-01-01T10:00:00Z");
    let short = MessagePayload::text("a", "hi")
        .with_id("1234")
        .with_created_at("2024-01-01T10:00:00Z");
    let plain = MessagePayload::text("a", "hi").with_created_at("2024-01-01T10:00:00Z");

    assert_eq!(identity_key(&provisional), identity_key(&plain));
    assert_eq!(identity_key(&short), identity_key(&plain));
}

#[test]
fn server_id_requires_exact_hex_shape() {
    assert!(!is_server_id("temp-507f1f77bcf86cd7994"));
    assert!(!is_server_id("507f1f77bcf86cd79943901z"));
    assert!(is_server_id(SERVER_ID));
}

#[test]
fn created_at_takes_precedence_over_time() {
    let first = MessagePayload::text("a", "hi")
        .with_created_at("2024-01-01T10:00:00Z")
        .with_time("10:00");
    let second = MessagePayload::text("a", "hi")
        .with_created_at("2024-01-01T10:00:00Z")
        .with_time("10:00 AM");
    assert_eq!(identity_key(&first), identity_key(&second));
}

#[test]
fn created_at_is_not_reparsed() {
    let utc = MessagePayload::text("a", "hi").with_created_at("2024-01-01T10:00:00Z");
    let offset = MessagePayload::text("a", "hi").with_created_at("2024-01-01T10:00:00+00:00");
    assert_ne!(identity_key(&utc), identity_key(&offset));
}

#[test]
fn time_is_used_when_created_at_is_missing() {
    let morning = MessagePayload::text("a", "hi").with_time("10:00");
    let evening = MessagePayload::text("a", "hi").with_time("22:00");
    assert_ne!(identity_key(&morning), identity_key(&evening));
    assert_eq!(
        identity_key(&morning),
        identity_key(&MessagePayload::text("a", "hi").with_time("10:00"))
    );
}

#[test]
fn separator_inside_fields_cannot_forge_a_collision() {
    let sep = KEY_SEPARATOR;
    let shifted_sender = MessagePayload::text(format!("a{sep}b"), "c").with_time("t");
    let shifted_content = MessagePayload::text("a", format!("b{sep}c")).with_time("t");
    assert_ne!(identity_key(&shifted_sender), identity_key(&shifted_content));

    let escaped_looking = MessagePayload::text("a\\u001fb", "c").with_time("t");
    assert_ne!(identity_key(&shifted_sender), identity_key(&escaped_looking));
}

#[test]
fn media_url_stands_in_for_empty_content() {
    let mut photo = MessagePayload::text("a", "").with_time("10:00");
    photo.media_url = Some("https://cdn.example.org/1.png".into());
    let mut other = photo.clone();
    other.media_url = Some("https://cdn.example.org/2.png".into());
    assert_ne!(identity_key(&photo), identity_key(&other));
}

#[test]
fn messages_without_sender_or_content_never_collide() {
    let blank = MessagePayload::default();
    assert_ne!(identity_key(&blank), identity_key(&blank));
    assert!(identity_key(&blank).starts_with("unkeyed"));
}
