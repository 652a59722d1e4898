//! Order book depth engine.
//!
//! Maintains one bid/ask ladder per (exchange, pair, asset) key from a
//! snapshot plus a stream of incremental updates, and answers read-only
//! queries against it.
//!
//! # Synchronisation
//!
//! ```text
//! Unsynced --delta--> Buffering --snapshot--> Synced
//!     |                                         |
//!     +----------------snapshot-----------------+
//!                                               |
//!                 Resyncing <--gap/checksum-----+
//!                     |
//!                     +-----snapshot-----> Synced
//! ```
//!
//! Deltas that arrive before the first snapshot are buffered, then
//! replayed in update-id order on top of it. A gap or checksum mismatch
//! invalidates the book until the next snapshot.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`metrics`]: Pipeline and pool counters
//! - [`orderbook`]: Pool, ladders, pipeline, registry and simulator
//! - [`feed`]: JSON-lines adapter
//! - [`api`]: HTTP API for health, metrics and depth reads
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod orderbook;
pub mod utils;

pub use config::Config;
pub use error::{AppError, DepthError, Result};
