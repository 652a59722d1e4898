//! Lookup table of live books keyed by (exchange, pair, asset).

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::depth::{Depth, DepthOptions};
use super::pipeline::{Pipeline, PipelineConfig, PipelineStats, ProcessOutcome, SyncState};
use super::pool::NodePool;
use super::simulator::SimulationResult;
use super::types::{DepthKey, DepthSnapshot, DepthUpdate};
use crate::config::Config;
use crate::error::DepthError;

#[derive(Debug)]
struct BookEntry {
    depth: Depth,
    pipeline: Pipeline,
}

/// Summary of one book for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BookStatus {
    /// Book key.
    pub key: DepthKey,
    /// Pipeline state.
    pub state: SyncState,
    /// Last applied update id.
    pub last_update_id: i64,
    /// Number of bid levels.
    pub bid_levels: usize,
    /// Number of ask levels.
    pub ask_levels: usize,
    /// Pipeline counters.
    pub stats: PipelineStats,
}

/// Shared handle to one book and its pipeline.
///
/// Writers (`process`) and consistency-sensitive readers take the same
/// lock, so readers always see a book between two whole messages.
#[derive(Debug)]
pub struct DepthHandle {
    key: DepthKey,
    inner: RwLock<BookEntry>,
}

impl DepthHandle {
    fn new(key: DepthKey, options: DepthOptions, config: PipelineConfig, pool: Arc<NodePool>) -> Self {
        Self {
            inner: RwLock::new(BookEntry {
                depth: Depth::new(key.clone(), options, pool),
                pipeline: Pipeline::new(config),
            }),
            key,
        }
    }

    /// Book key.
    pub fn key(&self) -> &DepthKey {
        &self.key
    }

    /// Drive one message through the pipeline.
    pub fn process(&self, update: DepthUpdate) -> Result<ProcessOutcome, DepthError> {
        let mut entry = self.inner.write();
        let BookEntry { depth, pipeline } = &mut *entry;
        pipeline.process(depth, update)
    }

    /// Read-only copy of the book.
    pub fn snapshot(&self) -> Result<DepthSnapshot, DepthError> {
        let entry = self.inner.read();
        self.ensure_readable(&entry.depth)?;
        Ok(entry.depth.snapshot())
    }

    /// Simulate a market order against the current book.
    pub fn simulate_order(
        &self,
        amount: Decimal,
        is_buy: bool,
    ) -> Result<SimulationResult, DepthError> {
        let entry = self.inner.read();
        self.ensure_readable(&entry.depth)?;
        entry.depth.simulate_order(amount, is_buy)
    }

    /// Run a read against the book under the lock.
    pub fn with_depth<R>(&self, f: impl FnOnce(&Depth) -> R) -> R {
        f(&self.inner.read().depth)
    }

    /// Pipeline state.
    pub fn state(&self) -> SyncState {
        self.inner.read().pipeline.state()
    }

    /// Status summary.
    pub fn status(&self) -> BookStatus {
        let entry = self.inner.read();
        BookStatus {
            key: self.key.clone(),
            state: entry.pipeline.state(),
            last_update_id: entry.depth.last_update_id(),
            bid_levels: entry.depth.bid_len(),
            ask_levels: entry.depth.ask_len(),
            stats: entry.pipeline.stats(),
        }
    }

    fn ensure_readable(&self, depth: &Depth) -> Result<(), DepthError> {
        if !depth.is_restored() {
            return Err(DepthError::DepthNotFound {
                key: self.key.clone(),
            });
        }
        if let Some(reason) = depth.invalidation() {
            return Err(DepthError::Invalidated {
                key: self.key.clone(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

/// Process-level table of books.
///
/// Each book carries its own lock; the map itself is sharded, so traffic
/// on one key never waits on another.
#[derive(Debug)]
pub struct Registry {
    books: DashMap<DepthKey, Arc<DepthHandle>>,
    pool: Arc<NodePool>,
    defaults: DepthOptions,
    pipeline: PipelineConfig,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(
            DepthOptions::default(),
            PipelineConfig::default(),
            Arc::new(NodePool::default()),
        )
    }
}

impl Registry {
    /// Create a registry whose lazily created books use `defaults`.
    pub fn new(defaults: DepthOptions, pipeline: PipelineConfig, pool: Arc<NodePool>) -> Self {
        Self {
            books: DashMap::new(),
            pool,
            defaults,
            pipeline,
        }
    }

    /// Create a registry from application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.depth_options(),
            config.pipeline_config(),
            Arc::new(NodePool::new(config.pool_retention())),
        )
    }

    /// Node pool shared by every book.
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// Register a book with adapter-specific options. An existing book is
    /// returned unchanged.
    pub fn register(&self, key: DepthKey, options: DepthOptions) -> Arc<DepthHandle> {
        self.entry(key, options)
    }

    /// Handle for a key, if the book exists.
    pub fn handle(&self, key: &DepthKey) -> Option<Arc<DepthHandle>> {
        self.books.get(key).map(|h| Arc::clone(h.value()))
    }

    /// Handle for a key whose book has been restored from a snapshot.
    pub fn depth(&self, key: &DepthKey) -> Result<Arc<DepthHandle>, DepthError> {
        self.handle(key)
            .filter(|h| h.with_depth(Depth::is_restored))
            .ok_or_else(|| DepthError::DepthNotFound { key: key.clone() })
    }

    /// Read-only copy of a book.
    pub fn get(&self, key: &DepthKey) -> Result<DepthSnapshot, DepthError> {
        self.handle(key)
            .ok_or_else(|| DepthError::DepthNotFound { key: key.clone() })?
            .snapshot()
    }

    /// Entry point for adapters: route one message to its book, creating
    /// the book on first reference.
    pub fn process(&self, update: DepthUpdate) -> Result<ProcessOutcome, DepthError> {
        let handle = match self.handle(&update.key) {
            Some(handle) => handle,
            None => self.entry(update.key.clone(), self.defaults),
        };
        handle.process(update)
    }

    /// Keys of every book.
    pub fn keys(&self) -> Vec<DepthKey> {
        self.books.iter().map(|e| e.key().clone()).collect()
    }

    /// Status of every book.
    pub fn statuses(&self) -> Vec<BookStatus> {
        // Clone handles out first so no shard guard is held while locking books.
        let handles: Vec<_> = self.books.iter().map(|e| Arc::clone(e.value())).collect();
        handles.iter().map(|h| h.status()).collect()
    }

    /// Number of books.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no book exists.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    fn entry(&self, key: DepthKey, options: DepthOptions) -> Arc<DepthHandle> {
        let handle = self.books.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "creating depth");
            Arc::new(DepthHandle::new(
                key.clone(),
                options,
                self.pipeline,
                Arc::clone(&self.pool),
            ))
        });
        Arc::clone(handle.value())
    }
}
