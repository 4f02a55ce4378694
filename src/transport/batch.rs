use super::{BoxFuture, Sender, Transport, TransportError, TransportOptions};
use crate::domain::LogEntry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Batching transport base: buffers entries and flushes them through a
/// [`Sender`] on size threshold, timer tick or explicit call.
///
/// Lifecycle: `new` (no I/O) -> `init` (sender setup, offline restore,
/// background worker) -> buffering/flushing -> `destroy`.
///
/// Invariants:
/// - entries are sent in the order they were logged; restored entries precede
///   entries logged after restoration
/// - at most one send is in flight per instance at any time
/// - the buffer never exceeds `max_buffer_entries`; the oldest entries are
///   evicted first and every eviction is reported through `on_drop`
/// - `log()` never fails; delivery problems are only observable through the
///   configured hooks
pub struct BatchTransport<S: Sender> {
    inner: Arc<Inner<S>>,
}

impl<S: Sender> Clone for BatchTransport<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    options: TransportOptions,
    buffer: Mutex<VecDeque<LogEntry>>,
    sender: AsyncMutex<S>,
    flush_in_progress: AtomicBool,
    initialized: AtomicBool,
    destroyed: AtomicBool,
    flush_notify: Notify,
    shutdown: CancellationToken,
}

impl<S: Sender> BatchTransport<S> {
    /// Construct without performing any I/O.
    pub fn new(sender: S, options: TransportOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                buffer: Mutex::new(VecDeque::new()),
                sender: AsyncMutex::new(sender),
                flush_in_progress: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                flush_notify: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Run sender setup, restore any persisted entries ahead of the buffer,
    /// and start the recurring flush worker. Subsequent calls are no-ops.
    pub async fn init(&self) -> Result<(), TransportError> {
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let restored = {
            let mut sender = self.inner.sender.lock().await;
            sender.init().await?
        };
        if !restored.is_empty() {
            debug!(
                transport = %self.inner.options.name,
                count = restored.len(),
                "restored persisted entries ahead of buffer"
            );
            let dropped = self.inner.prepend(restored);
            self.inner.report_dropped(dropped);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.options.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = inner.flush_notify.notified() => {}
                }
                if let Err(err) = inner.flush().await {
                    debug!(
                        transport = %inner.options.name,
                        error = %err,
                        "background flush failed"
                    );
                }
            }
        });

        Ok(())
    }

    /// Append an entry. No-op once destroyed or when the transport is
    /// disabled. Reaching `batch_size` wakes the background worker; the
    /// caller is never blocked on delivery.
    pub fn log(&self, entry: LogEntry) {
        let inner = &self.inner;
        if !inner.options.enabled || inner.destroyed.load(Ordering::Acquire) {
            return;
        }

        let (len, dropped) = {
            let mut buffer = inner.buffer.lock();
            buffer.push_back(entry);
            let mut dropped = 0;
            while buffer.len() > inner.options.max_buffer_entries {
                buffer.pop_front();
                dropped += 1;
            }
            (buffer.len(), dropped)
        };

        inner.report_dropped(dropped);
        if len >= inner.options.batch_size {
            inner.flush_notify.notify_one();
        }
    }

    /// Deliver everything currently buffered.
    ///
    /// A concurrent call while a flush is in flight returns immediately
    /// without starting a second send; an empty buffer returns without
    /// invoking the sender.
    pub async fn flush(&self) -> Result<(), TransportError> {
        self.inner.flush().await
    }

    /// Stop the worker, mark the transport destroyed (so `log()` becomes a
    /// no-op immediately), run one final best-effort flush of the remaining
    /// buffer, then release sender resources.
    pub async fn destroy(&self) -> Result<(), TransportError> {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.shutdown.cancel();

        let flush_result = self.inner.flush().await;
        let shutdown_result = {
            let mut sender = self.inner.sender.lock().await;
            sender.shutdown().await
        };
        flush_result.and(shutdown_result)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Take every buffered entry out of the transport, preserving order.
    pub(crate) fn drain_buffer(&self) -> Vec<LogEntry> {
        self.inner.buffer.lock().drain(..).collect()
    }
}

impl<S: Sender> Inner<S> {
    async fn flush(&self) -> Result<(), TransportError> {
        // At most one concurrent send per transport instance.
        if self
            .flush_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let result = self.flush_cycle().await;
        self.flush_in_progress.store(false, Ordering::Release);
        result
    }

    async fn flush_cycle(&self) -> Result<(), TransportError> {
        // Swap the snapshot out before any I/O begins; entries logged from
        // here on land in the fresh buffer.
        let snapshot: Vec<LogEntry> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.drain(..).collect()
        };

        let attempts = self.options.max_retries.max(1);
        let mut sender = self.sender.lock().await;
        let mut last_err: Option<TransportError> = None;

        for attempt in 1..=attempts {
            match sender.send(&snapshot).await {
                Ok(()) => {
                    debug!(
                        transport = %self.options.name,
                        entries = snapshot.len(),
                        attempt,
                        "batch delivered"
                    );
                    if let Some(hook) = &self.options.hooks.on_flush_success {
                        hook(snapshot.len());
                    }
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        transport = %self.options.name,
                        attempt,
                        error = %err,
                        "batch delivery failed"
                    );
                    let retryable = err.is_retryable();
                    last_err = Some(err);
                    if !retryable || attempt == attempts {
                        break;
                    }
                    tokio::time::sleep(self.options.retry.delay_for(attempt)).await;
                }
            }
        }

        let Some(err) = last_err else { return Ok(()) };
        if let Some(hook) = &self.options.hooks.on_flush_error {
            hook(&err);
        }

        let requeue = sender.handle_failed(snapshot).await;
        drop(sender);
        if !requeue.is_empty() {
            let dropped = self.prepend(requeue);
            self.report_dropped(dropped);
        }
        Err(err)
    }

    /// Re-insert entries ahead of the current buffer, preserving their order,
    /// then enforce the cap by evicting from the oldest end. Returns the
    /// eviction count.
    fn prepend(&self, entries: Vec<LogEntry>) -> usize {
        let mut buffer = self.buffer.lock();
        for entry in entries.into_iter().rev() {
            buffer.push_front(entry);
        }
        let mut dropped = 0;
        while buffer.len() > self.options.max_buffer_entries {
            buffer.pop_front();
            dropped += 1;
        }
        dropped
    }

    fn report_dropped(&self, dropped: usize) {
        if dropped == 0 {
            return;
        }
        warn!(
            transport = %self.options.name,
            dropped,
            "buffer cap exceeded, oldest entries dropped"
        );
        if let Some(hook) = &self.options.hooks.on_drop {
            hook(dropped);
        }
    }
}

impl<S: Sender> Transport for BatchTransport<S> {
    fn name(&self) -> &str {
        &self.inner.options.name
    }

    fn log(&self, entry: LogEntry) {
        BatchTransport::log(self, entry);
    }

    fn flush(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { self.inner.flush().await })
    }

    fn destroy(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { BatchTransport::destroy(self).await })
    }

    fn buffer_size(&self) -> usize {
        BatchTransport::buffer_size(self)
    }
}
