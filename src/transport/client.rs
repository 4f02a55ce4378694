use super::http::{HttpSender, HttpSenderConfig};
use super::offline::{OfflineStore, StoreError};
use super::{
    BatchTransport, BoxFuture, CountHook, Sender, Transport, TransportError, TransportOptions,
};
use crate::domain::LogEntry;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

pub const DEFAULT_STORAGE_KEY: &str = "vestig_offline_queue";
const DEFAULT_QUEUE_MAX: usize = 500;

// Persistence hooks are observed from two places (the sender's retry
// exhaustion path and `persist_now`), so they are shared by Arc.
type SharedCountHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Offline queue settings for [`ClientHttpTransport`].
pub struct OfflineQueueConfig {
    pub enabled: bool,
    /// Store key holding the persisted queue: a single JSON array of entries.
    pub storage_key: String,
    /// Queue cap; the oldest persisted entries beyond it are dropped.
    pub max_size: usize,
    pub on_persist: Option<CountHook>,
    pub on_restore: Option<CountHook>,
    /// Reports entries dropped from the persisted queue (cap or quota).
    pub on_drop: Option<CountHook>,
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_size: DEFAULT_QUEUE_MAX,
            on_persist: None,
            on_restore: None,
            on_drop: None,
        }
    }
}

pub struct ClientTransportConfig {
    pub http: HttpSenderConfig,
    pub offline: OfflineQueueConfig,
    /// Included in the `_client` metadata attached to outgoing entries.
    pub session_id: Option<String>,
}

impl ClientTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: HttpSenderConfig::new(url),
            offline: OfflineQueueConfig::default(),
            session_id: None,
        }
    }
}

/// HTTP sender with a durable offline queue.
///
/// On retry exhaustion the failed snapshot is merged into the persisted queue
/// instead of being requeued in memory; on init any persisted entries are
/// restored ahead of newly buffered ones, preserving temporal order across
/// restarts.
pub struct ClientHttpSender {
    http: HttpSender,
    store: Arc<dyn OfflineStore>,
    queue: OfflineQueueConfig,
    online: Arc<AtomicBool>,
    session_id: Option<String>,
    user_agent: String,
}

impl ClientHttpSender {
    /// Attach `_client` metadata at flush time, so it reflects the current
    /// client state rather than the state at log time.
    fn enrich(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        let mut client: Map<String, Value> = Map::new();
        client.insert("user_agent".into(), Value::String(self.user_agent.clone()));
        client.insert(
            "sdk_version".into(),
            Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );
        if let Some(session) = &self.session_id {
            client.insert("session_id".into(), Value::String(session.clone()));
        }

        entries
            .iter()
            .cloned()
            .map(|mut entry| {
                let metadata = entry.metadata.get_or_insert_with(Map::new);
                metadata.insert("_client".into(), Value::Object(client.clone()));
                entry
            })
            .collect()
    }
}

impl Sender for ClientHttpSender {
    async fn init(&mut self) -> Result<Vec<LogEntry>, TransportError> {
        if !self.queue.enabled {
            return Ok(Vec::new());
        }

        // Malformed or unreadable records are equivalent to an empty queue;
        // restore never fails the transport.
        let restored: Vec<LogEntry> = match self.store.read(&self.queue.storage_key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "malformed offline queue record, treating as empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "offline store read failed, treating as empty");
                Vec::new()
            }
        };

        if let Err(err) = self.store.remove(&self.queue.storage_key) {
            warn!(error = %err, "failed to clear restored offline queue record");
        }

        if !restored.is_empty()
            && let Some(hook) = &self.queue.on_restore
        {
            hook(restored.len());
        }
        Ok(restored)
    }

    async fn send(&mut self, entries: &[LogEntry]) -> Result<(), TransportError> {
        let enriched = self.enrich(entries);
        let result = self.http.send(&enriched).await;
        self.online.store(result.is_ok(), Ordering::Release);
        result
    }

    async fn handle_failed(&mut self, entries: Vec<LogEntry>) -> Vec<LogEntry> {
        if !self.queue.enabled {
            // Base disposition: re-merge into the in-memory buffer.
            return entries;
        }

        let (persisted, dropped) = persist_merged(
            self.store.as_ref(),
            &self.queue.storage_key,
            self.queue.max_size,
            entries,
        );
        if dropped > 0
            && let Some(hook) = &self.queue.on_drop
        {
            hook(dropped);
        }
        if let Some(hook) = &self.queue.on_persist {
            hook(persisted);
        }
        Vec::new()
    }
}

/// Read-merge-write the entries into the persisted queue record.
///
/// Pre-existing persisted entries stay ahead of the new ones; the combined
/// queue is capped at `max_size` by dropping from the oldest end. A
/// quota-exceeded write is retried with progressively fewer entries rather
/// than losing the whole queue. Returns `(persisted, dropped)` counts.
fn persist_merged(
    store: &dyn OfflineStore,
    key: &str,
    max_size: usize,
    entries: Vec<LogEntry>,
) -> (usize, usize) {
    let mut queued: Vec<LogEntry> = match store.read(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(error = %err, "offline store read failed during persist, starting fresh");
            Vec::new()
        }
    };
    queued.extend(entries);

    let mut dropped = 0;
    if queued.len() > max_size {
        dropped = queued.len() - max_size;
        queued.drain(..dropped);
    }

    loop {
        let payload = match serde_json::to_string(&queued) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "offline queue serialization failed, dropping batch");
                return (0, dropped + queued.len());
            }
        };
        match store.write(key, &payload) {
            Ok(()) => break,
            Err(StoreError::QuotaExceeded) => {
                if queued.is_empty() {
                    warn!("offline store rejected even an empty queue record");
                    return (0, dropped);
                }
                let shrink = (queued.len() / 2).max(1);
                queued.drain(..shrink);
                dropped += shrink;
            }
            Err(err) => {
                warn!(error = %err, "offline persist failed, dropping batch");
                return (0, dropped + queued.len());
            }
        }
    }
    (queued.len(), dropped)
}

/// Browser-style HTTP transport with a durable offline queue.
///
/// Logging is never blocked while offline; only the flush path distinguishes
/// online from offline by the outcome of `send`.
pub struct ClientHttpTransport {
    inner: BatchTransport<ClientHttpSender>,
    store: Arc<dyn OfflineStore>,
    storage_key: String,
    queue_max: usize,
    online: Arc<AtomicBool>,
    on_persist: Option<SharedCountHook>,
    on_drop: Option<SharedCountHook>,
}

impl ClientHttpTransport {
    pub fn create(
        mut config: ClientTransportConfig,
        store: Arc<dyn OfflineStore>,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let online = Arc::new(AtomicBool::new(true));
        let storage_key = config.offline.storage_key.clone();
        let queue_max = config.offline.max_size;
        let user_agent = config.http.user_agent.clone();

        let on_persist: Option<SharedCountHook> =
            config.offline.on_persist.take().map(Arc::from);
        let on_drop: Option<SharedCountHook> = config.offline.on_drop.take().map(Arc::from);
        if let Some(hook) = &on_persist {
            let hook = Arc::clone(hook);
            config.offline.on_persist = Some(Box::new(move |count| hook(count)));
        }
        if let Some(hook) = &on_drop {
            let hook = Arc::clone(hook);
            config.offline.on_drop = Some(Box::new(move |count| hook(count)));
        }

        let sender = ClientHttpSender {
            http: HttpSender::new(config.http)?,
            store: Arc::clone(&store),
            queue: config.offline,
            online: Arc::clone(&online),
            session_id: config.session_id,
            user_agent,
        };

        Ok(Self {
            inner: BatchTransport::new(sender, options),
            store,
            storage_key,
            queue_max,
            online,
            on_persist,
            on_drop,
        })
    }

    pub async fn init(&self) -> Result<(), TransportError> {
        self.inner.init().await
    }

    pub fn log(&self, entry: LogEntry) {
        self.inner.log(entry);
    }

    pub async fn flush(&self) -> Result<(), TransportError> {
        self.inner.flush().await
    }

    pub async fn destroy(&self) -> Result<(), TransportError> {
        self.inner.destroy().await
    }

    /// Snapshot the current buffer straight into storage, e.g. from a
    /// shutdown or page-unload path. Drains the buffer so the entries are
    /// replayed from storage rather than delivered twice. Reports through the
    /// same `on_persist`/`on_drop` hooks as the retry-exhaustion path, and
    /// returns the number of entries now persisted under the key.
    pub async fn persist_now(&self) -> Result<usize, TransportError> {
        let entries = self.inner.drain_buffer();
        if entries.is_empty() {
            return Ok(0);
        }
        let (persisted, dropped) = persist_merged(
            self.store.as_ref(),
            &self.storage_key,
            self.queue_max,
            entries,
        );
        if dropped > 0
            && let Some(hook) = &self.on_drop
        {
            hook(dropped);
        }
        if let Some(hook) = &self.on_persist {
            hook(persisted);
        }
        Ok(persisted)
    }

    /// Whether the last delivery attempt succeeded. Callers can gate UI on
    /// this; the transport itself keeps buffering regardless.
    pub fn online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size()
    }
}

impl Transport for ClientHttpTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn log(&self, entry: LogEntry) {
        ClientHttpTransport::log(self, entry);
    }

    fn flush(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { ClientHttpTransport::flush(self).await })
    }

    fn destroy(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { ClientHttpTransport::destroy(self).await })
    }

    fn buffer_size(&self) -> usize {
        ClientHttpTransport::buffer_size(self)
    }
}
