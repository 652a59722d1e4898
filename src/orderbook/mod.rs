//! Order book module: the depth engine.
//!
//! This module handles:
//! - Price levels, keys and messages
//! - Pooled ladder storage with time-bounded node reuse
//! - Snapshot/delta synchronisation per book
//! - Market-impact simulation

pub mod checksum;
pub mod depth;
pub mod ladder;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod simulator;
pub mod types;

pub use depth::{Depth, DepthOptions, Keying, Sequencing};
pub use ladder::Ladder;
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineStats, ProcessOutcome, ResyncReason, SyncState,
};
pub use pool::{NodePool, PoolStats};
pub use registry::{BookStatus, DepthHandle, Registry};
pub use simulator::{walk_levels, FillStatus, SimulationResult};
pub use types::{
    AssetClass, Changes, DepthKey, DepthSnapshot, DepthUpdate, LevelChange, LevelRef, Pair,
    PriceLevel, Side, SideTotals, UpdateAction, UpdatePayload,
};
