//! Snapshot/delta synchronisation state machine for one book.
//!
//! Incremental feeds and the REST snapshot race each other. Deltas that
//! arrive before the snapshot are held in a bounded buffer and replayed on
//! top of it; any gap or checksum mismatch afterwards drops the book into
//! `Resyncing` until the adapter delivers a fresh snapshot.
//!
//! ```text
//! Unsynced --delta--> Buffering --snapshot--> Synced --gap/checksum--> Resyncing
//!     \________________snapshot_______________/^            |
//!                                              \--snapshot--/
//! ```

use std::fmt;

use serde::Serialize;
use strum::Display;
use tracing::{debug, info, instrument, warn};

use super::depth::{validate_changes, Depth};
use super::types::{Changes, DepthUpdate, PriceLevel, UpdatePayload};
use crate::error::DepthError;
use crate::metrics;

/// Default bound on deltas held before the first snapshot.
pub const DEFAULT_BUFFER_LIMIT: usize = 1000;

/// Synchronisation state of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    /// Nothing received yet.
    Unsynced,
    /// Holding deltas until a snapshot lands.
    Buffering,
    /// Applying deltas live.
    Synced,
    /// Dropping deltas until a fresh snapshot lands.
    Resyncing,
}

/// Why a book needs a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncReason {
    /// Update id did not extend the book.
    SequenceGap {
        /// Expected id.
        expected: i64,
        /// Received id.
        actual: i64,
    },
    /// Venue checksum disagreed with the local book.
    ChecksumMismatch {
        /// Venue checksum.
        expected: u32,
        /// Local checksum.
        computed: u32,
    },
    /// Pre-sync buffer reached its bound.
    BufferOverflow {
        /// Configured bound.
        limit: usize,
    },
    /// An id-keyed amend referenced a level the book does not have.
    UnknownLevel {
        /// Missing id.
        id: i64,
    },
}

impl ResyncReason {
    /// Map a recoverable error to its resync reason.
    pub fn from_error(err: &DepthError) -> Option<Self> {
        match *err {
            DepthError::OutOfSequence { expected, actual } => {
                Some(ResyncReason::SequenceGap { expected, actual })
            }
            DepthError::BookIntegrity { expected, computed } => {
                Some(ResyncReason::ChecksumMismatch { expected, computed })
            }
            DepthError::BufferOverflow { limit } => Some(ResyncReason::BufferOverflow { limit }),
            DepthError::LevelNotFound { id } => Some(ResyncReason::UnknownLevel { id }),
            _ => None,
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            ResyncReason::SequenceGap { .. } => "sequence_gap",
            ResyncReason::ChecksumMismatch { .. } => "checksum_mismatch",
            ResyncReason::BufferOverflow { .. } => "buffer_overflow",
            ResyncReason::UnknownLevel { .. } => "unknown_level",
        }
    }
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::SequenceGap { expected, actual } => {
                write!(f, "sequence gap: expected {expected}, got {actual}")
            }
            ResyncReason::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum mismatch: venue {expected}, local {computed}")
            }
            ResyncReason::BufferOverflow { limit } => {
                write!(f, "pre-sync buffer overflow at {limit} updates")
            }
            ResyncReason::UnknownLevel { id } => write!(f, "unknown level id {id}"),
        }
    }
}

/// What the pipeline did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Delta applied to the live book.
    Applied,
    /// Delta held until the snapshot arrives.
    Buffered,
    /// Delta dropped while resyncing.
    Discarded,
    /// Snapshot loaded and the buffer drained.
    Synced {
        /// Buffered deltas applied on top of the snapshot.
        replayed: usize,
        /// Buffered deltas at or below the snapshot id.
        stale: usize,
    },
    /// The book needs a fresh snapshot.
    ResyncRequired(ResyncReason),
}

/// Pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bound on deltas held before the first snapshot.
    pub buffer_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        }
    }
}

/// Counters for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Deltas applied, live or replayed.
    pub applied: u64,
    /// Deltas buffered before a snapshot.
    pub buffered: u64,
    /// Deltas dropped as stale or while resyncing.
    pub discarded: u64,
    /// Snapshots loaded.
    pub snapshots: u64,
    /// Resyncs triggered.
    pub resyncs: u64,
}

#[derive(Debug)]
struct PendingDelta {
    update_id: i64,
    changes: Changes,
    checksum: Option<u32>,
}

/// Synchronisation driver for one book.
#[derive(Debug)]
pub struct Pipeline {
    state: SyncState,
    buffer: Vec<PendingDelta>,
    config: PipelineConfig,
    stats: PipelineStats,
}

impl Pipeline {
    /// Create a pipeline in `Unsynced`.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            state: SyncState::Unsynced,
            buffer: Vec::new(),
            config,
            stats: PipelineStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Deltas currently held.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Route one message to the book.
    ///
    /// Sequencing and integrity failures are healed here and reported as
    /// [`ProcessOutcome::ResyncRequired`]; only malformed input is returned
    /// as an error.
    #[instrument(skip_all, fields(key = %update.key, update_id = update.update_id))]
    pub fn process(
        &mut self,
        depth: &mut Depth,
        update: DepthUpdate,
    ) -> Result<ProcessOutcome, DepthError> {
        let _timer = metrics::timer_process();

        match update.payload {
            UpdatePayload::Snapshot { bids, asks } => {
                self.on_snapshot(depth, update.update_id, bids, asks, update.checksum)
            }
            UpdatePayload::Delta(changes) => self.on_delta(
                depth,
                PendingDelta {
                    update_id: update.update_id,
                    changes,
                    checksum: update.checksum,
                },
            ),
        }
    }

    fn on_snapshot(
        &mut self,
        depth: &mut Depth,
        update_id: i64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        checksum: Option<u32>,
    ) -> Result<ProcessOutcome, DepthError> {
        depth.load_snapshot(bids, asks, update_id)?;
        self.stats.snapshots += 1;
        metrics::inc_snapshots_loaded();

        if let Some(expected) = checksum {
            if let Err(err) = depth.verify_integrity(expected) {
                return self.recover(depth, err);
            }
        }

        let mut pending = std::mem::take(&mut self.buffer);
        pending.sort_by_key(|delta| delta.update_id);

        let mut replayed = 0;
        let mut stale = 0;
        for delta in pending {
            if delta.update_id <= update_id {
                stale += 1;
                continue;
            }
            if let Err(err) = self.apply(depth, &delta) {
                self.stats.discarded += stale as u64;
                metrics::inc_updates_discarded(stale as u64);
                return self.recover(depth, err);
            }
            replayed += 1;
        }

        self.stats.discarded += stale as u64;
        metrics::inc_updates_discarded(stale as u64);
        self.state = SyncState::Synced;

        info!(
            key = %depth.key(),
            update_id,
            replayed,
            stale,
            "book synced from snapshot"
        );
        Ok(ProcessOutcome::Synced { replayed, stale })
    }

    fn on_delta(
        &mut self,
        depth: &mut Depth,
        delta: PendingDelta,
    ) -> Result<ProcessOutcome, DepthError> {
        match self.state {
            SyncState::Unsynced | SyncState::Buffering => {
                validate_changes(&delta.changes)?;
                if self.buffer.len() >= self.config.buffer_limit {
                    let dropped = self.buffer.len() as u64 + 1;
                    self.stats.discarded += dropped;
                    metrics::inc_updates_discarded(dropped);
                    metrics::inc_buffer_overflows();
                    return self.recover(
                        depth,
                        DepthError::BufferOverflow {
                            limit: self.config.buffer_limit,
                        },
                    );
                }

                debug!(update_id = delta.update_id, held = self.buffer.len() + 1, "buffering delta");
                self.buffer.push(delta);
                self.state = SyncState::Buffering;
                self.stats.buffered += 1;
                metrics::inc_updates_buffered();
                Ok(ProcessOutcome::Buffered)
            }
            SyncState::Resyncing => {
                self.stats.discarded += 1;
                metrics::inc_updates_discarded(1);
                Ok(ProcessOutcome::Discarded)
            }
            SyncState::Synced => match self.apply(depth, &delta) {
                Ok(()) => Ok(ProcessOutcome::Applied),
                Err(err) => self.recover(depth, err),
            },
        }
    }

    fn apply(&mut self, depth: &mut Depth, delta: &PendingDelta) -> Result<(), DepthError> {
        depth.apply_changes(delta.update_id, &delta.changes)?;
        if let Some(expected) = delta.checksum {
            depth.verify_integrity(expected)?;
        }
        self.stats.applied += 1;
        metrics::inc_updates_applied();
        Ok(())
    }

    fn recover(&mut self, depth: &mut Depth, err: DepthError) -> Result<ProcessOutcome, DepthError> {
        let reason = ResyncReason::from_error(&err).ok_or(err)?;

        warn!(key = %depth.key(), reason = %reason, "book out of sync, awaiting fresh snapshot");
        self.state = SyncState::Resyncing;
        self.buffer.clear();
        self.stats.resyncs += 1;
        metrics::inc_resyncs(reason.label());
        depth.invalidate(reason.to_string());

        Ok(ProcessOutcome::ResyncRequired(reason))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
