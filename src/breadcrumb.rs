//! Bounded trail of recent application events.
//!
//! Error reports are far more useful with the steps leading up to the failure
//! attached. The store is an explicit object shared by handle; there is no
//! process-wide instance, so scoping (per request, per session, per test) is
//! the caller's choice.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_MAX_BREADCRUMBS: usize = 50;

/// One recorded step: a navigation, a click, a query, a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// ISO-8601 timestamp with millisecond precision.
    pub timestamp: String,
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Breadcrumb {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            category: category.into(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// FIFO store with bounded-size insertion: once full, adding evicts the
/// oldest breadcrumb. Cloning shares the underlying trail.
#[derive(Clone)]
pub struct BreadcrumbStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    crumbs: VecDeque<Breadcrumb>,
    max_size: usize,
}

impl Default for BreadcrumbStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BreadcrumbStore {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_BREADCRUMBS)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                crumbs: VecDeque::new(),
                max_size,
            })),
        }
    }

    pub fn add(&self, crumb: Breadcrumb) {
        let mut inner = self.inner.lock();
        inner.crumbs.push_back(crumb);
        while inner.crumbs.len() > inner.max_size {
            inner.crumbs.pop_front();
        }
    }

    /// Snapshot of the trail, oldest first.
    pub fn get_all(&self) -> Vec<Breadcrumb> {
        self.inner.lock().crumbs.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().crumbs.clear();
    }

    /// Shrinking below the current length trims the oldest breadcrumbs
    /// immediately.
    pub fn set_max_size(&self, max_size: usize) {
        let mut inner = self.inner.lock();
        inner.max_size = max_size;
        while inner.crumbs.len() > inner.max_size {
            inner.crumbs.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().crumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().crumbs.is_empty()
    }
}
