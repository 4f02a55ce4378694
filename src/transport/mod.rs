//! Batching log transports.
//!
//! A transport buffers entries in memory and flushes them as batches through a
//! pluggable [`Sender`]. The base machinery ([`BatchTransport`]) owns the
//! buffer, a recurring flush timer, the retry loop and the drop policy;
//! senders supply delivery (HTTP, file append, offline-aware client HTTP).

pub mod batch;
pub mod client;
pub mod file;
pub mod http;
pub mod offline;
pub mod retry;

pub use batch::BatchTransport;
pub use client::{ClientHttpTransport, ClientTransportConfig, OfflineQueueConfig};
pub use file::{FileSender, FileSenderConfig, FileTransport, RotateInterval};
pub use http::{HttpMethod, HttpSender, HttpSenderConfig, HttpTransport, HttpTransportError};
pub use offline::{FileStore, MemoryStore, OfflineStore, StoreError};
pub use retry::{RetryPolicy, RetryStrategy};

use crate::domain::LogEntry;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] HttpTransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport destroyed")]
    Destroyed,
}

impl TransportError {
    /// Whether the retry loop should attempt delivery again.
    ///
    /// Network failures, timeouts, 5xx responses and file IO errors are
    /// transient; 4xx responses and local serialization/configuration
    /// problems fail fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_retryable(),
            Self::Io(_) => true,
            Self::Serialization(_)
            | Self::Storage(_)
            | Self::InvalidConfig(_)
            | Self::Destroyed => false,
        }
    }
}

/// Delivery primitive plugged into a [`BatchTransport`].
///
/// `send` must fail on any delivery error (network error, non-2xx response,
/// write error) so the base retry logic triggers uniformly.
pub trait Sender: Send + Sync + 'static {
    fn send(
        &mut self,
        entries: &[LogEntry],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sender-specific setup. Entries returned here (e.g. a restored offline
    /// queue) are prepended to the buffer ahead of newly logged entries.
    fn init(&mut self) -> impl Future<Output = Result<Vec<LogEntry>, TransportError>> + Send {
        async { Ok(Vec::new()) }
    }

    /// Disposition of a snapshot whose delivery exhausted all retries.
    /// Returned entries are re-merged at the front of the buffer; return an
    /// empty vec when the snapshot was persisted elsewhere.
    fn handle_failed(
        &mut self,
        entries: Vec<LogEntry>,
    ) -> impl Future<Output = Vec<LogEntry>> + Send {
        async { entries }
    }

    /// Release sender resources. Called once from `destroy()` after the final
    /// flush.
    fn shutdown(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }
}

pub type CountHook = Box<dyn Fn(usize) + Send + Sync>;
pub type ErrorHook = Box<dyn Fn(&TransportError) + Send + Sync>;

/// Observer callbacks shared by all transports. Delivery failures are only
/// ever visible through these; `log()` itself never fails.
#[derive(Default)]
pub struct TransportHooks {
    pub on_flush_success: Option<CountHook>,
    pub on_flush_error: Option<ErrorHook>,
    pub on_drop: Option<CountHook>,
}

/// Construction options common to every transport.
pub struct TransportOptions {
    pub name: String,
    pub enabled: bool,
    /// Buffer length at which a background flush is triggered.
    pub batch_size: usize,
    /// Recurring flush timer period.
    pub flush_interval: Duration,
    /// Total send attempts per flush cycle (3 means three `send` calls).
    pub max_retries: u32,
    pub retry: RetryPolicy,
    /// Hard buffer cap; oldest entries beyond it are dropped.
    pub max_buffer_entries: usize,
    pub hooks: TransportHooks,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            name: "transport".to_string(),
            enabled: true,
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
            max_retries: 3,
            retry: RetryPolicy::default(),
            max_buffer_entries: 500,
            hooks: TransportHooks::default(),
        }
    }
}

impl TransportOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn on_flush_success(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hooks.on_flush_success = Some(Box::new(hook));
        self
    }

    pub fn on_flush_error(
        mut self,
        hook: impl Fn(&TransportError) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_flush_error = Some(Box::new(hook));
        self
    }

    pub fn on_drop(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hooks.on_drop = Some(Box::new(hook));
        self
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe transport surface, so a logger can fan out to heterogeneous
/// transports behind `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Append an entry to the buffer. Never fails; a no-op after destroy or
    /// when the transport is disabled.
    fn log(&self, entry: LogEntry);

    fn flush(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    fn destroy(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    fn buffer_size(&self) -> usize;
}
