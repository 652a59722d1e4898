//! Unified error types for the depth engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::{DepthKey, Side};

/// Unified error type for the depth engine service.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Order book error.
    #[error("depth error: {0}")]
    Depth(#[from] DepthError),

    /// Feed decoding error.
    #[error("feed error at line {line}: {source}")]
    Feed {
        /// 1-based line number in the feed.
        line: usize,
        /// Underlying decode error.
        #[source]
        source: FeedError,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Order book state and mutation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepthError {
    /// No snapshot has ever been loaded for this key.
    #[error("depth not found for {key}")]
    DepthNotFound {
        /// The key that missed.
        key: DepthKey,
    },

    /// Increment does not extend the last applied update id.
    #[error("out of sequence: expected update {expected}, got {actual}")]
    OutOfSequence {
        /// The id that would have been accepted.
        expected: i64,
        /// The id that arrived.
        actual: i64,
    },

    /// Checksum over the top levels disagrees with the venue.
    #[error("book integrity check failed: venue checksum {expected}, computed {computed}")]
    BookIntegrity {
        /// Checksum supplied by the venue.
        expected: u32,
        /// Checksum computed from the local ladder.
        computed: u32,
    },

    /// Pre-sync buffer reached its bound.
    #[error("pre-sync buffer overflow: limit {limit}")]
    BufferOverflow {
        /// Configured buffer limit.
        limit: usize,
    },

    /// Malformed side token from an adapter.
    #[error("unsupported side: {0:?}")]
    UnsupportedSide(String),

    /// Malformed action token from an adapter.
    #[error("unsupported update action: {0:?}")]
    UnsupportedAction(String),

    /// Malformed asset class token.
    #[error("unsupported asset class: {0:?}")]
    UnsupportedAsset(String),

    /// Malformed instrument pair.
    #[error("invalid pair: {0:?}")]
    InvalidPair(String),

    /// Amend on an id-keyed ladder for an id that is not resting.
    #[error("level id {id} not found")]
    LevelNotFound {
        /// The missing level id.
        id: i64,
    },

    /// Snapshot failed verification.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Non-positive order amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Delta level with a non-positive price or a negative amount.
    #[error("invalid {side} level: price {price}, amount {amount}")]
    InvalidLevel {
        /// Side the change targets.
        side: Side,
        /// Price carried by the change.
        price: Decimal,
        /// Amount carried by the change.
        amount: Decimal,
    },

    /// Decimal arithmetic over the book left the representable range.
    #[error("arithmetic overflow walking the book")]
    Overflow,

    /// Book is awaiting a fresh snapshot.
    #[error("depth for {key} invalidated: {reason}")]
    Invalidated {
        /// The invalidated key.
        key: DepthKey,
        /// Why the book was invalidated.
        reason: String,
    },
}

/// Wire decoding errors at the adapter boundary.
#[derive(Error, Debug)]
pub enum FeedError {
    /// JSON parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Decoded message is semantically malformed.
    #[error(transparent)]
    Depth(#[from] DepthError),

    /// A change is missing a field its action requires.
    #[error("missing field {field} for {action} change")]
    MissingField {
        /// The missing field.
        field: &'static str,
        /// The action token being decoded.
        action: String,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
