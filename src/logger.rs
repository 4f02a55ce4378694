//! Thin logging facade over the transport family.
//!
//! Builds `LogEntry` values (timestamp, namespace, runtime, sanitized
//! metadata) and fans them out to every registered transport. Delivery is
//! entirely the transports' concern; calls here never fail.

use crate::breadcrumb::BreadcrumbStore;
use crate::domain::{ErrorInfo, LogEntry, LogLevel, Runtime, VestigError};
use crate::sanitize::Sanitizer;
use crate::transport::Transport;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct LoggerConfig {
    pub namespace: Option<String>,
    /// Entries below this level are discarded before buffering.
    pub min_level: LogLevel,
    pub runtime: Runtime,
    /// Sanitize metadata and context before they reach any transport.
    pub sanitize: bool,
    pub additional_sensitive_fields: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            min_level: LogLevel::Trace,
            runtime: Runtime::Server,
            sanitize: true,
            additional_sensitive_fields: Vec::new(),
        }
    }
}

/// The SDK entry point: one logger, many transports.
#[derive(Clone)]
pub struct Logger {
    namespace: Option<String>,
    min_level: LogLevel,
    runtime: Runtime,
    sanitizer: Option<Sanitizer>,
    context: Option<Map<String, Value>>,
    breadcrumbs: Option<BreadcrumbStore>,
    transports: Vec<Arc<dyn Transport>>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Self {
        let sanitizer = config.sanitize.then(|| {
            Sanitizer::with_additional_fields(&config.additional_sensitive_fields)
        });
        Self {
            namespace: config.namespace,
            min_level: config.min_level,
            runtime: config.runtime,
            sanitizer,
            context: None,
            breadcrumbs: None,
            transports: Vec::new(),
        }
    }

    pub fn add_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transports.push(transport);
        self
    }

    /// Attach a breadcrumb trail. Error-level entries carry a snapshot of it
    /// in their metadata under `breadcrumbs`.
    pub fn with_breadcrumbs(mut self, store: BreadcrumbStore) -> Self {
        self.breadcrumbs = Some(store);
        self
    }

    /// Record a breadcrumb, if a trail is attached. Not a log entry; only
    /// surfaced as part of later error-level entries.
    pub fn breadcrumb(&self, category: impl Into<String>, message: impl Into<String>) {
        if let Some(store) = &self.breadcrumbs {
            store.add(crate::breadcrumb::Breadcrumb::new(category, message));
        }
    }

    /// Derive a logger with a nested namespace, sharing transports.
    pub fn child(&self, namespace: &str) -> Self {
        let mut child = self.clone();
        child.namespace = Some(match &self.namespace {
            Some(parent) => format!("{parent}.{namespace}"),
            None => namespace.to_string(),
        });
        child
    }

    /// Derive a logger carrying correlation context attached to every entry.
    pub fn with_context(&self, context: Map<String, Value>) -> Self {
        let mut derived = self.clone();
        let merged = match &self.context {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.extend(context);
                merged
            }
            None => context,
        };
        derived.context = Some(merged);
        derived
    }

    pub fn trace(&self, message: impl Into<String>, metadata: Option<Map<String, Value>>) {
        self.log(LogLevel::Trace, message, metadata);
    }

    pub fn debug(&self, message: impl Into<String>, metadata: Option<Map<String, Value>>) {
        self.log(LogLevel::Debug, message, metadata);
    }

    pub fn info(&self, message: impl Into<String>, metadata: Option<Map<String, Value>>) {
        self.log(LogLevel::Info, message, metadata);
    }

    pub fn warn(&self, message: impl Into<String>, metadata: Option<Map<String, Value>>) {
        self.log(LogLevel::Warn, message, metadata);
    }

    pub fn error(&self, message: impl Into<String>, metadata: Option<Map<String, Value>>) {
        self.log(LogLevel::Error, message, metadata);
    }

    /// Log an error-level entry with a structured error description.
    pub fn error_with(
        &self,
        message: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) {
        if LogLevel::Error < self.min_level {
            return;
        }
        let info = ErrorInfo {
            name: "Error".to_string(),
            message: error.to_string(),
            stack: error.source().map(|source| source.to_string()),
        };
        let entry = self.entry(LogLevel::Error, message.into(), None).with_error(info);
        self.dispatch(entry);
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: Option<Map<String, Value>>,
    ) {
        if level < self.min_level {
            return;
        }
        let entry = self.entry(level, message.into(), metadata);
        self.dispatch(entry);
    }

    /// Flush every transport, returning the first delivery error encountered.
    pub async fn flush_all(&self) -> Result<(), VestigError> {
        let flushes = self.transports.iter().map(|t| t.flush());
        for result in futures::future::join_all(flushes).await {
            result?;
        }
        Ok(())
    }

    /// Destroy every transport: final best-effort flush, then resource
    /// release. Logging afterwards is a no-op.
    pub async fn shutdown(&self) -> Result<(), VestigError> {
        let destroys = self.transports.iter().map(|t| t.destroy());
        for result in futures::future::join_all(destroys).await {
            result?;
        }
        Ok(())
    }

    fn entry(
        &self,
        level: LogLevel,
        message: String,
        metadata: Option<Map<String, Value>>,
    ) -> LogEntry {
        let metadata = self.attach_breadcrumbs(level, metadata);
        let metadata = metadata.map(|m| self.scrub(m));
        let context = self.context.clone().map(|c| self.scrub(c));

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            message,
            metadata,
            namespace: self.namespace.clone(),
            runtime: self.runtime,
            context,
            error: None,
        }
    }

    /// Fold the breadcrumb trail into error-level metadata. Runs before
    /// sanitization so breadcrumb payloads are scrubbed like everything else.
    fn attach_breadcrumbs(
        &self,
        level: LogLevel,
        metadata: Option<Map<String, Value>>,
    ) -> Option<Map<String, Value>> {
        let Some(store) = &self.breadcrumbs else {
            return metadata;
        };
        if level < LogLevel::Error || store.is_empty() {
            return metadata;
        }
        let trail = match serde_json::to_value(store.get_all()) {
            Ok(trail) => trail,
            Err(_) => return metadata,
        };
        let mut metadata = metadata.unwrap_or_default();
        metadata.insert("breadcrumbs".into(), trail);
        Some(metadata)
    }

    fn scrub(&self, map: Map<String, Value>) -> Map<String, Value> {
        match &self.sanitizer {
            Some(sanitizer) => sanitizer.sanitize_map(&map),
            None => map,
        }
    }

    fn dispatch(&self, entry: LogEntry) {
        for transport in &self.transports {
            transport.log(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::REDACTED;
    use crate::transport::{BatchTransport, Sender, TransportError, TransportOptions};
    use parking_lot::Mutex;
    use serde_json::json;

    struct CaptureSender {
        sent: Arc<Mutex<Vec<LogEntry>>>,
    }

    impl Sender for CaptureSender {
        async fn send(&mut self, entries: &[LogEntry]) -> Result<(), TransportError> {
            self.sent.lock().extend_from_slice(entries);
            Ok(())
        }
    }

    fn capture_transport() -> (Arc<BatchTransport<CaptureSender>>, Arc<Mutex<Vec<LogEntry>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(BatchTransport::new(
            CaptureSender { sent: Arc::clone(&sent) },
            TransportOptions::named("capture"),
        ));
        (transport, sent)
    }

    #[tokio::test]
    async fn entries_carry_namespace_and_sanitized_metadata() {
        let (transport, sent) = capture_transport();
        let mut logger = Logger::new(LoggerConfig::default());
        logger.add_transport(transport.clone());
        let logger = logger.child("checkout");

        let metadata = json!({"password": "hunter2", "amount": 99})
            .as_object()
            .cloned()
            .unwrap();
        logger.info("payment accepted", Some(metadata));
        transport.flush().await.unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].namespace.as_deref(), Some("checkout"));
        let metadata = sent[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["password"], json!(REDACTED));
        assert_eq!(metadata["amount"], json!(99));
    }

    #[tokio::test]
    async fn min_level_filters_before_buffering() {
        let (transport, _) = capture_transport();
        let mut logger = Logger::new(LoggerConfig {
            min_level: LogLevel::Warn,
            ..Default::default()
        });
        logger.add_transport(transport.clone());

        logger.debug("quiet", None);
        logger.info("quiet too", None);
        assert_eq!(transport.buffer_size(), 0);

        logger.error("loud", None);
        assert_eq!(transport.buffer_size(), 1);
    }

    #[tokio::test]
    async fn error_entries_carry_the_breadcrumb_trail() {
        let (transport, sent) = capture_transport();
        let mut logger = Logger::new(LoggerConfig::default());
        logger.add_transport(transport.clone());
        let logger = logger.with_breadcrumbs(BreadcrumbStore::new());

        logger.breadcrumb("nav", "opened /checkout");
        logger.breadcrumb("click", "pay now");
        logger.info("progress", None);
        logger.error("payment failed", None);
        transport.flush().await.unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        // Only the error-level entry carries the trail.
        assert!(sent[0].metadata.is_none());
        let trail = sent[1].metadata.as_ref().unwrap()["breadcrumbs"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0]["message"], "opened /checkout");
        assert_eq!(trail[1]["category"], "click");
    }

    #[tokio::test]
    async fn context_is_attached_to_every_entry() {
        let (transport, sent) = capture_transport();
        let mut logger = Logger::new(LoggerConfig::default());
        logger.add_transport(transport.clone());
        let logger =
            logger.with_context(json!({"request_id": "r-42"}).as_object().cloned().unwrap());

        logger.info("one", None);
        logger.warn("two", None);
        transport.flush().await.unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        for entry in sent.iter() {
            assert_eq!(entry.context.as_ref().unwrap()["request_id"], json!("r-42"));
        }
    }
}
