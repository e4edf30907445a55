//! Run-scoped P/E cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::Symbol;

/// Conservative P/E per ticker, computed at most once per run.
///
/// Misses are cached too: a ticker with no P/E signal resolves to `None` once and
/// later callers fall through to the sector table without recomputing.
#[derive(Debug, Clone)]
pub struct PeCache {
    inner: Arc<RwLock<HashMap<Symbol, Option<f64>>>>,
    computations: Arc<AtomicUsize>,
    enabled: bool,
}

impl Default for PeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PeCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            computations: Arc::new(AtomicUsize::new(0)),
            enabled: true,
        }
    }

    /// A cache that never stores; every lookup recomputes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub async fn get(&self, symbol: &Symbol) -> Option<Option<f64>> {
        self.inner.read().await.get(symbol).copied()
    }

    /// Returns the cached value or runs `compute` under the write lock.
    ///
    /// The second lookup after taking the write lock keeps concurrent callers
    /// for the same ticker from computing twice.
    pub async fn get_or_compute<F, Fut>(&self, symbol: &Symbol, compute: F) -> Option<f64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<f64>>,
    {
        if !self.enabled {
            self.computations.fetch_add(1, Ordering::Relaxed);
            return compute().await;
        }

        if let Some(cached) = self.get(symbol).await {
            return cached;
        }

        let mut store = self.inner.write().await;
        if let Some(cached) = store.get(symbol) {
            return *cached;
        }

        self.computations.fetch_add(1, Ordering::Relaxed);
        let value = compute().await;
        store.insert(symbol.clone(), value);
        value
    }

    /// How many times a value was computed rather than served from the cache.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
