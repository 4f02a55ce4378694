//! PII sanitization engine.
//!
//! Recursive depth-first redaction over JSON-like values: sensitive fields are
//! replaced wholesale with `[REDACTED]`, string values have emails, card
//! numbers and JWTs masked, and a depth bound keeps adversarially deep input
//! from recursing unboundedly. Pure over its input; never panics on acyclic
//! JSON.

pub mod patterns;
pub mod rules;
pub mod sanitizer;

pub use patterns::JWT_REDACTED;
pub use rules::{DEFAULT_SENSITIVE_FIELDS, FieldRule, PathRule};
pub use sanitizer::{
    DEFAULT_MAX_DEPTH, MAX_DEPTH_MARKER, REDACTED, Sanitizer, create_sanitizer, sanitize,
    sanitize_with,
};
