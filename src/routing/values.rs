//! Route values and per-request routing state.
//!
//! # Responsibilities
//! - Hold matched route values with case-insensitive keys
//! - Carry the immutable request snapshot used by selection and binding
//! - Carry the route data that the route handler copies and restores
//!
//! # Design Decisions
//! - Keys are normalized to lower case on insert
//! - An empty value is equivalent to an absent value
//! - `RouteData` is shared as `Arc` so a failed request can restore the
//!   original instance, not an equal copy

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use tokio::sync::watch;

use crate::pipeline::context::ResponseSink;

/// Normalizes a route value for case-insensitive comparison.
pub fn normalize_value(value: &str) -> String {
    value.to_lowercase()
}

/// Compares two route values the way route constraints do.
pub fn values_equal(left: &str, right: &str) -> bool {
    left == right || normalize_value(left) == normalize_value(right)
}

/// String-keyed route values with case-insensitive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteValues {
    entries: BTreeMap<String, String>,
}

impl RouteValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value for the same key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries.insert(key.as_ref().to_lowercase(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&key.to_lowercase())
    }

    /// Returns the value for `key` if present and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of `self` with every entry of `overlay` applied on top.
    pub fn overlaid_with(&self, overlay: &RouteValues) -> RouteValues {
        let mut merged = self.clone();
        for (key, value) in overlay.iter() {
            merged.insert(key, value);
        }
        merged
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RouteValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut values = RouteValues::new();
        for (k, v) in iter {
            values.insert(k, v);
        }
        values
    }
}

/// Matched route values plus the names of the routers that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteData {
    pub values: RouteValues,
    pub routers: Vec<String>,
}

impl RouteData {
    pub fn new(values: RouteValues) -> Self {
        Self {
            values,
            routers: Vec::new(),
        }
    }
}

/// Immutable snapshot of the incoming request.
#[derive(Debug, Clone)]
pub struct RequestData {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestData {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Content type of the body without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    }
}

/// Signal that the client abandoned the request.
///
/// Clones observe the same signal. A context built without a sender is never
/// aborted.
#[derive(Debug, Clone)]
pub struct RequestAborted {
    rx: watch::Receiver<bool>,
}

impl RequestAborted {
    /// Returns the sending half together with the signal.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // A dropped sender never flips the value.
        drop(tx);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the request is aborted. Pending forever otherwise.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for RequestAborted {
    fn default() -> Self {
        Self::never()
    }
}

/// Per-request routing state, owned by the request being processed.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub request: Arc<RequestData>,
    pub route_data: Arc<RouteData>,
    /// Set by the route handler once an action produced a response.
    pub is_handled: bool,
    /// Response written by the invoked action, moved here on success.
    pub response: Option<ResponseSink>,
    pub aborted: RequestAborted,
}

impl RouteContext {
    pub fn new(request: RequestData, route_data: RouteData) -> Self {
        Self {
            request: Arc::new(request),
            route_data: Arc::new(route_data),
            is_handled: false,
            response: None,
            aborted: RequestAborted::never(),
        }
    }

    pub fn with_aborted(mut self, aborted: RequestAborted) -> Self {
        self.aborted = aborted;
        self
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn values(&self) -> &RouteValues {
        &self.route_data.values
    }
}

/// Values available when generating a URL rather than matching one.
#[derive(Debug, Clone, Default)]
pub struct UrlGenerationContext {
    pub values: RouteValues,
    pub ambient_values: RouteValues,
    /// Values explicitly supplied by the caller; they win over `values`.
    pub provided_values: RouteValues,
}

impl UrlGenerationContext {
    /// Values used for matching: `values` overlaid with `provided_values`.
    pub fn effective_values(&self) -> RouteValues {
        self.values.overlaid_with(&self.provided_values)
    }
}
