#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::cast_precision_loss,      // Acceptable for jitter math
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. TransportError in transport module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

//! vestig: structured logging SDK core.
//!
//! Two subsystems carry the weight here: the batching transport family
//! (HTTP, rotating file, offline-aware client HTTP) and the PII sanitization
//! engine. A thin [`Logger`] facade wires them together.

pub mod breadcrumb;
pub mod domain;
pub mod logger;
pub mod sanitize;
pub mod transport;

// Re-export main types for easy access
pub use breadcrumb::{Breadcrumb, BreadcrumbStore};
pub use domain::{ErrorInfo, LogEntry, LogLevel, Runtime, VestigError};
pub use logger::{Logger, LoggerConfig};
pub use sanitize::{FieldRule, Sanitizer, create_sanitizer, sanitize, sanitize_with};
pub use transport::{
    BatchTransport, ClientHttpTransport, ClientTransportConfig, FileSenderConfig, FileStore,
    FileTransport, HttpSenderConfig, HttpTransport, MemoryStore, OfflineQueueConfig,
    OfflineStore, RetryPolicy, Sender, Transport, TransportError, TransportOptions,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
