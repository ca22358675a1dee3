//! Backend availability: probe results and the per-exporter cache.
//!
//! Probes shell out (`pandoc --version`) or bind a shared library, so they
//! are too slow to repeat for every document in a batch. Results are cached
//! per backend name inside the [`crate::Exporter`] that owns the cache; a
//! new process, or a call to [`AvailabilityCache::invalidate`], starts over.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tracing::debug;

/// Whether a backend's runtime dependency is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    /// `detail` describes what was found, e.g. the tool's version line.
    Available { detail: String },
    /// `reason` says what is missing and how to install it.
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }

    pub fn available(detail: impl Into<String>) -> Self {
        Availability::Available {
            detail: detail.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Availability::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Lazily filled map from backend name to probe result.
///
/// Two concurrent exports may both miss and probe the same backend; the
/// second insert wins and both results are equivalent, so no lock is held
/// across the probe itself.
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    entries: Mutex<HashMap<String, Availability>>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `backend`, if any.
    pub fn get(&self, backend: &str) -> Option<Availability> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(backend).cloned())
    }

    pub fn insert(&self, backend: &str, availability: Availability) {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(backend.to_string(), availability);
        }
    }

    /// Return the cached result or run `probe` and cache what it returns.
    pub async fn get_or_probe<F, Fut>(&self, backend: &str, probe: F) -> Availability
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Availability>,
    {
        if let Some(hit) = self.get(backend) {
            return hit;
        }
        let result = probe().await;
        debug!("Probed {}: {:?}", backend, result);
        self.insert(backend, result.clone());
        result
    }

    /// Forget every cached result.
    pub fn invalidate(&self) {
        if let Ok(mut map) = self.entries.lock() {
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn probe_runs_once_until_invalidated() {
        let cache = AvailabilityCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let a = cache
                .get_or_probe("pandoc", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Availability::unavailable("pandoc not found")
                })
                .await;
            assert!(!a.is_available());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        cache.invalidate();
        assert!(cache.is_empty());
        cache
            .get_or_probe("pandoc", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Availability::available("pandoc 3.1")
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("pandoc"), Some(Availability::available("pandoc 3.1")));
    }

    #[test]
    fn availability_serialises_with_state_tag() {
        let json = serde_json::to_string(&Availability::unavailable("missing")).unwrap();
        assert_eq!(json, r#"{"state":"unavailable","reason":"missing"}"#);
    }
}
