//! Domain layer for vestig.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEntry`: the SDK's core data type
//! - `LogLevel`: log severity (Trace/Debug/Info/Warn/Error)
//! - `Runtime`: originating execution environment
//! - `VestigError`: top-level error type

pub mod error;
pub mod log_entry;
pub mod log_level;

pub use error::VestigError;
pub use log_entry::{ErrorInfo, LogEntry, Runtime};
pub use log_level::LogLevel;
