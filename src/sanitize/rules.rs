//! Field matching rules for the sanitizer.
//!
//! A rule either names a sensitive key outright (case-insensitive substring
//! match against the key alone) or describes a dot-separated path from the
//! root of the value, where `*` matches exactly one segment and `**` matches
//! any number of segments, including none.

/// Field names redacted by default, matched case-insensitively as substrings.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "pass",
    "token",
    "access_token",
    "refresh_token",
    "api_key",
    "apikey",
    "api-key",
    "authorization",
    "bearer",
    "auth",
    "credential",
    "session_id",
    "sessionid",
    "cookie",
    "secret",
    "private_key",
    "credit_card",
    "card_number",
    "cvv",
    "ssn",
    "social_security",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one path segment.
    Any,
    /// `**`: zero or more path segments.
    Deep,
}

/// A single sanitization rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Bare field name, matched case-insensitively as a substring of the key.
    Name(String),
    /// Dot path from the root, with `*` and `**` wildcards.
    Path(PathRule),
}

impl FieldRule {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into().to_lowercase())
    }

    pub fn path(path: &str) -> Self {
        Self::Path(PathRule::parse(path))
    }

    /// Test a key at a traversal position. `path` is the dot-joined ancestry
    /// of the key (not including the key itself).
    pub fn matches(&self, path: &[String], key: &str) -> bool {
        match self {
            Self::Name(name) => key.to_lowercase().contains(name.as_str()),
            Self::Path(rule) => rule.matches(path, key),
        }
    }
}

/// Compiled dot-path rule matched against the full traversal path from root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    segments: Vec<Segment>,
}

impl PathRule {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "*" => Segment::Any,
                "**" => Segment::Deep,
                literal => Segment::Literal(literal.to_lowercase()),
            })
            .collect();
        Self { segments }
    }

    fn matches(&self, path: &[String], key: &str) -> bool {
        let mut full: Vec<&str> = path.iter().map(String::as_str).collect();
        full.push(key);
        glob_match(&self.segments, &full)
    }
}

fn glob_match(segments: &[Segment], path: &[&str]) -> bool {
    match (segments.first(), path.first()) {
        (None, None) => true,
        (Some(Segment::Deep), _) => {
            // `**` either consumes nothing or one segment and stays greedy.
            glob_match(&segments[1..], path)
                || (!path.is_empty() && glob_match(segments, &path[1..]))
        }
        (Some(Segment::Any), Some(_)) => glob_match(&segments[1..], &path[1..]),
        (Some(Segment::Literal(lit)), Some(seg)) => {
            lit.eq_ignore_ascii_case(seg) && glob_match(&segments[1..], &path[1..])
        }
        _ => false,
    }
}
