//! Free list of reusable ladder nodes.
//!
//! Every ladder insert draws a node from the pool and every delete hands
//! it back, so a busy book recycles allocations instead of hitting the
//! allocator per mutation. Released nodes are only eligible for reuse for
//! the retention window; older ones are dropped on the next access so the
//! resident set shrinks back once churn calms down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use super::types::PriceLevel;
use crate::metrics;

/// Default time a released node stays reusable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(1);

/// Pooled container for one price level.
#[derive(Debug, Default)]
pub struct Node {
    pub(crate) level: PriceLevel,
}

impl Node {
    /// The level held by this node.
    pub fn level(&self) -> &PriceLevel {
        &self.level
    }
}

#[derive(Debug)]
struct FreeNode {
    node: Box<Node>,
    freed_at: Instant,
}

/// Counters describing pool behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Nodes created because the free list was empty.
    pub allocated: u64,
    /// Nodes handed out from the free list.
    pub reused: u64,
    /// Nodes dropped after outliving the retention window.
    pub purged: u64,
    /// Nodes currently on the free list.
    pub resident: usize,
}

/// Shared node free list.
///
/// The free list is ordered by release time: the back holds the most
/// recently released node (popped first), the front the oldest (purged
/// first). The lock only ever covers a push, a pop and the front sweep.
#[derive(Debug)]
pub struct NodePool {
    free: Mutex<VecDeque<FreeNode>>,
    retention: Duration,
    allocated: AtomicU64,
    reused: AtomicU64,
    purged: AtomicU64,
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl NodePool {
    /// Create a pool with the given retention window.
    pub fn new(retention: Duration) -> Self {
        Self {
            free: Mutex::new(VecDeque::new()),
            retention,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            purged: AtomicU64::new(0),
        }
    }

    /// Retention window of this pool.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Get a zeroed node, reusing a free one when possible.
    pub fn acquire(&self) -> Box<Node> {
        self.acquire_at(Instant::now())
    }

    /// Get a zeroed node as of `now`.
    pub fn acquire_at(&self, now: Instant) -> Box<Node> {
        let recycled = {
            let mut free = self.free.lock();
            self.sweep(&mut free, now);
            free.pop_back()
        };

        match recycled {
            Some(entry) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                metrics::inc_pool_reuses();
                let mut node = entry.node;
                *node = Node::default();
                node
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                metrics::inc_pool_allocations();
                Box::default()
            }
        }
    }

    /// Return a node to the pool.
    pub fn release(&self, node: Box<Node>) {
        self.release_at(node, Instant::now());
    }

    /// Return a node to the pool, tagged as freed at `now`.
    pub fn release_at(&self, node: Box<Node>, now: Instant) {
        let mut free = self.free.lock();
        let freed_at = Self::clamp(&free, now);
        free.push_back(FreeNode { node, freed_at });
        self.sweep(&mut free, now);
    }

    /// Return a batch of nodes under a single lock acquisition.
    pub fn release_all_at(&self, nodes: impl IntoIterator<Item = Box<Node>>, now: Instant) {
        let mut free = self.free.lock();
        let freed_at = Self::clamp(&free, now);
        free.extend(nodes.into_iter().map(|node| FreeNode { node, freed_at }));
        self.sweep(&mut free, now);
    }

    /// Nodes currently reusable.
    pub fn resident(&self) -> usize {
        self.resident_at(Instant::now())
    }

    /// Nodes reusable as of `now`.
    pub fn resident_at(&self, now: Instant) -> usize {
        let mut free = self.free.lock();
        self.sweep(&mut free, now);
        free.len()
    }

    /// Current counters. Does not sweep.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            resident: self.free.lock().len(),
        }
    }

    // Callers race between reading the clock and taking the lock, so a
    // release can carry an older stamp than the back of the list.
    fn clamp(free: &VecDeque<FreeNode>, now: Instant) -> Instant {
        free.back().map_or(now, |last| now.max(last.freed_at))
    }

    fn sweep(&self, free: &mut VecDeque<FreeNode>, now: Instant) -> usize {
        let mut dropped = 0;
        while free
            .front()
            .is_some_and(|entry| now.saturating_duration_since(entry.freed_at) > self.retention)
        {
            free.pop_front();
            dropped += 1;
        }

        if dropped > 0 {
            self.purged.fetch_add(dropped as u64, Ordering::Relaxed);
            metrics::inc_pool_purged(dropped as u64);
            trace!(dropped, resident = free.len(), "purged expired nodes");
        }
        dropped
    }
}
