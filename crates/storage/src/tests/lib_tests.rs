use super::*;

#[tokio::test]
async fn memory_store_gets_sets_and_removes() {
    let store = MemoryStore::new();
    assert_eq!(store.get("k").await.expect("get"), None);

    store.set("k", "v1".into()).await.expect("set");
    assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v1"));

    store.remove("k").await.expect("remove");
    assert_eq!(store.get("k").await.expect("get"), None);
}

#[tokio::test]
async fn memory_store_compare_and_swap_rejects_stale_expectation() {
    let store = MemoryStore::new();
    assert!(store
        .compare_and_swap("k", None, Some("first".into()))
        .await
        .expect("cas insert"));
    assert!(!store
        .compare_and_swap("k", None, Some("second".into()))
        .await
        .expect("cas insert again"));
    assert!(!store
        .compare_and_swap("k", Some("stale"), Some("second".into()))
        .await
        .expect("cas stale"));
    assert!(store
        .compare_and_swap("k", Some("first"), Some("second".into()))
        .await
        .expect("cas update"));
    assert_eq!(store.get("k").await.expect("get").as_deref(), Some("second"));
    assert!(store
        .compare_and_swap("k", Some("second"), None)
        .await
        .expect("cas delete"));
    assert_eq!(store.get("k").await.expect("get"), None);
}

#[tokio::test]
async fn sqlite_store_health_check_succeeds_for_live_pool() {
    let store = SqliteStore::open("sqlite::memory:").await.expect("db");
    store.health_check().await.expect("health check");
}

#[tokio::test]
async fn sqlite_store_overwrites_existing_values() {
    let store = SqliteStore::open("sqlite::memory:").await.expect("db");
    store.set(OFFLINE_QUEUE_KEY, "[]".into()).await.expect("set");
    store
        .set(OFFLINE_QUEUE_KEY, "[1]".into())
        .await
        .expect("overwrite");
    assert_eq!(
        store.get(OFFLINE_QUEUE_KEY).await.expect("get").as_deref(),
        Some("[1]")
    );
}

#[tokio::test]
async fn sqlite_store_compare_and_swap_matches_memory_semantics() {
    let store = SqliteStore::open("sqlite::memory:").await.expect("db");
    assert!(store
        .compare_and_swap("k", None, None)
        .await
        .expect("cas absent"));
    assert!(store
        .compare_and_swap("k", None, Some("a".into()))
        .await
        .expect("cas insert"));
    assert!(!store
        .compare_and_swap("k", None, None)
        .await
        .expect("cas absent after insert"));
    assert!(!store
        .compare_and_swap("k", Some("b"), Some("c".into()))
        .await
        .expect("cas stale"));
    assert!(store
        .compare_and_swap("k", Some("a"), Some("c".into()))
        .await
        .expect("cas update"));
    assert!(store
        .compare_and_swap("k", Some("c"), None)
        .await
        .expect("cas delete"));
    assert_eq!(store.get("k").await.expect("get"), None);
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("client.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let store = SqliteStore::open(&database_url).await.expect("db");
    drop(store);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/client.db"),
        "sqlite://./data/client.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), "sqlite::memory:");
}

#[test]
fn last_connection_key_embeds_user_email() {
    assert_eq!(
        last_connection_key("alice@example.org"),
        "last_connection_alice@example.org"
    );
}
