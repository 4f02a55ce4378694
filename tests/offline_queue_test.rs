use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vestig::domain::{LogEntry, LogLevel, Runtime};
use vestig::transport::{
    ClientHttpTransport, ClientTransportConfig, MemoryStore, OfflineQueueConfig, OfflineStore,
    RetryPolicy, TransportOptions,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const STORAGE_KEY: &str = "vestig_offline_queue";

fn entry(message: &str) -> LogEntry {
    LogEntry::new(LogLevel::Info, message, Runtime::Browser)
}

fn fast_options() -> TransportOptions {
    TransportOptions {
        max_retries: 1,
        retry: RetryPolicy::fixed(Duration::from_millis(1)),
        ..Default::default()
    }
}

fn read_queue(store: &MemoryStore) -> Vec<LogEntry> {
    match store.read(STORAGE_KEY).unwrap() {
        Some(raw) => serde_json::from_str(&raw).unwrap(),
        None => Vec::new(),
    }
}

#[tokio::test]
async fn failed_flush_persists_the_batch_instead_of_requeueing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let transport = ClientHttpTransport::create(
        ClientTransportConfig::new(server.uri()),
        Arc::clone(&store) as Arc<dyn OfflineStore>,
        fast_options(),
    )
    .unwrap();

    transport.log(entry("queued1"));
    transport.log(entry("queued2"));
    assert!(transport.flush().await.is_err());

    // The snapshot went to storage, not back into the buffer.
    assert_eq!(transport.buffer_size(), 0);
    assert!(!transport.online());

    let queued = read_queue(&store);
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].message, "queued1");
    assert_eq!(queued[1].message, "queued2");
}

#[tokio::test]
async fn init_restores_persisted_entries_ahead_of_new_ones() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let persisted = vec![entry("restored1"), entry("restored2")];
    store
        .write(STORAGE_KEY, &serde_json::to_string(&persisted).unwrap())
        .unwrap();

    let restored = Arc::new(AtomicUsize::new(0));
    let restored_hook = Arc::clone(&restored);
    let mut config = ClientTransportConfig::new(server.uri());
    config.offline = OfflineQueueConfig {
        on_restore: Some(Box::new(move |count| {
            restored_hook.fetch_add(count, Ordering::SeqCst);
        })),
        ..Default::default()
    };

    let transport = ClientHttpTransport::create(
        config,
        Arc::clone(&store) as Arc<dyn OfflineStore>,
        fast_options(),
    )
    .unwrap();
    transport.init().await.unwrap();

    assert_eq!(restored.load(Ordering::SeqCst), 2);
    // The record is consumed on restore.
    assert!(store.read(STORAGE_KEY).unwrap().is_none());

    transport.log(entry("fresh"));
    transport.flush().await.unwrap();
    assert!(transport.online());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, vec!["restored1", "restored2", "fresh"]);
}

#[tokio::test]
async fn malformed_queue_record_restores_as_empty() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    store.write(STORAGE_KEY, "{ not json").unwrap();

    let restored = Arc::new(AtomicUsize::new(0));
    let restored_hook = Arc::clone(&restored);
    let mut config = ClientTransportConfig::new(server.uri());
    config.offline = OfflineQueueConfig {
        on_restore: Some(Box::new(move |count| {
            restored_hook.fetch_add(count, Ordering::SeqCst);
        })),
        ..Default::default()
    };

    let transport = ClientHttpTransport::create(
        config,
        Arc::clone(&store) as Arc<dyn OfflineStore>,
        fast_options(),
    )
    .unwrap();
    transport.init().await.unwrap();

    assert_eq!(restored.load(Ordering::SeqCst), 0);
    assert_eq!(transport.buffer_size(), 0);
    // The unreadable record is still cleared.
    assert!(store.read(STORAGE_KEY).unwrap().is_none());
}

#[tokio::test]
async fn queue_cap_drops_oldest_and_reports_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let persisted_count = Arc::new(AtomicUsize::new(0));
    let dropped_count = Arc::new(AtomicUsize::new(0));
    let persisted_hook = Arc::clone(&persisted_count);
    let dropped_hook = Arc::clone(&dropped_count);

    let mut config = ClientTransportConfig::new(server.uri());
    config.offline = OfflineQueueConfig {
        max_size: 2,
        on_persist: Some(Box::new(move |count| {
            persisted_hook.fetch_add(count, Ordering::SeqCst);
        })),
        on_drop: Some(Box::new(move |count| {
            dropped_hook.fetch_add(count, Ordering::SeqCst);
        })),
        ..Default::default()
    };

    let transport = ClientHttpTransport::create(
        config,
        Arc::clone(&store) as Arc<dyn OfflineStore>,
        fast_options(),
    )
    .unwrap();

    for i in 0..5 {
        transport.log(entry(&format!("m{i}")));
    }
    assert!(transport.flush().await.is_err());

    assert_eq!(persisted_count.load(Ordering::SeqCst), 2);
    assert_eq!(dropped_count.load(Ordering::SeqCst), 3);

    let queued = read_queue(&store);
    assert_eq!(queued.len(), 2);
    // Newest entries survive the cap.
    assert_eq!(queued[0].message, "m3");
    assert_eq!(queued[1].message, "m4");
}

#[tokio::test]
async fn persist_now_snapshots_the_buffer_to_storage() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let persisted_count = Arc::new(AtomicUsize::new(0));
    let persisted_hook = Arc::clone(&persisted_count);

    let mut config = ClientTransportConfig::new(server.uri());
    config.offline = OfflineQueueConfig {
        on_persist: Some(Box::new(move |count| {
            persisted_hook.fetch_add(count, Ordering::SeqCst);
        })),
        ..Default::default()
    };
    let transport = ClientHttpTransport::create(
        config,
        Arc::clone(&store) as Arc<dyn OfflineStore>,
        fast_options(),
    )
    .unwrap();

    transport.log(entry("unload1"));
    transport.log(entry("unload2"));
    let persisted = transport.persist_now().await.unwrap();

    assert_eq!(persisted, 2);
    assert_eq!(transport.buffer_size(), 0);
    // The unload path reports through the same hook as retry exhaustion.
    assert_eq!(persisted_count.load(Ordering::SeqCst), 2);
    let queued = read_queue(&store);
    assert_eq!(queued[0].message, "unload1");
    assert_eq!(queued[1].message, "unload2");

    // Nothing left to persist on a second call.
    assert_eq!(transport.persist_now().await.unwrap(), 0);
}

#[tokio::test]
async fn outgoing_entries_carry_client_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ClientTransportConfig::new(server.uri());
    config.session_id = Some("session-7".to_string());
    let transport = ClientHttpTransport::create(
        config,
        Arc::new(MemoryStore::new()) as Arc<dyn OfflineStore>,
        fast_options(),
    )
    .unwrap();

    transport.log(entry("tagged"));
    transport.flush().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let client = &body[0]["metadata"]["_client"];
    assert_eq!(client["session_id"], "session-7");
    assert_eq!(client["sdk_version"], vestig::VERSION);
    assert!(client["user_agent"].as_str().unwrap().starts_with("vestig/"));
}
