//! Order book types and data structures.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::DepthError;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Aggregate amount resting at this price.
    pub amount: Decimal,
    /// Venue level id, for venues that key updates by id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl PriceLevel {
    /// Create a new price-keyed level.
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self {
            price,
            amount,
            id: None,
        }
    }

    /// Create a new id-keyed level.
    pub fn with_id(id: i64, price: Decimal, amount: Decimal) -> Self {
        Self {
            price,
            amount,
            id: Some(id),
        }
    }

    /// Notional value of the level, saturating at `Decimal::MAX`.
    pub fn value(&self) -> Decimal {
        self.price.saturating_mul(self.amount)
    }
}

/// Book side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Side {
    /// Resting buy interest, best price is the highest.
    #[strum(to_string = "bid", serialize = "bids", serialize = "buy", serialize = "b")]
    Bid,
    /// Resting sell interest, best price is the lowest.
    #[strum(to_string = "ask", serialize = "asks", serialize = "sell", serialize = "a", serialize = "s")]
    Ask,
}

impl Side {
    /// Parse an adapter side token.
    pub fn parse(token: &str) -> Result<Self, DepthError> {
        token
            .trim()
            .parse()
            .map_err(|_| DepthError::UnsupportedSide(token.to_string()))
    }

    /// Ordering of two prices in ladder order: `Less` means `a` sits closer
    /// to the top of the book than `b`.
    pub fn ladder_order(&self, a: Decimal, b: Decimal) -> Ordering {
        match self {
            Side::Bid => b.cmp(&a),
            Side::Ask => a.cmp(&b),
        }
    }
}

/// Market segment an instrument trades in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AssetClass {
    /// Spot market.
    #[default]
    Spot,
    /// Margin market.
    Margin,
    /// Dated futures.
    Futures,
    /// Perpetual swaps.
    #[strum(to_string = "perpetual_swap", serialize = "perp", serialize = "swap")]
    PerpetualSwap,
    /// Options.
    Options,
}

impl AssetClass {
    /// Parse an asset class token.
    pub fn parse(token: &str) -> Result<Self, DepthError> {
        token
            .trim()
            .parse()
            .map_err(|_| DepthError::UnsupportedAsset(token.to_string()))
    }
}

/// Instrument pair, normalised to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Base currency.
    pub base: String,
    /// Quote currency.
    pub quote: String,
}

impl Pair {
    /// Create a pair from its currencies.
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_uppercase(),
            quote: quote.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = DepthError;

    /// Accepts `BASE-QUOTE`, `BASE/QUOTE` and `BASE_QUOTE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once(['-', '/', '_'])
            .ok_or_else(|| DepthError::InvalidPair(s.to_string()))?;

        if base.trim().is_empty() || quote.trim().is_empty() {
            return Err(DepthError::InvalidPair(s.to_string()));
        }

        Ok(Pair::new(base, quote))
    }
}

/// Registry key: (exchange, instrument, market segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthKey {
    /// Exchange name, lowercase.
    pub exchange: String,
    /// Instrument pair.
    pub pair: Pair,
    /// Market segment.
    pub asset: AssetClass,
}

impl DepthKey {
    /// Create a key, normalising the exchange name.
    pub fn new(exchange: &str, pair: Pair, asset: AssetClass) -> Self {
        Self {
            exchange: exchange.trim().to_lowercase(),
            pair,
            asset,
        }
    }

    /// Build a key from raw tokens.
    pub fn parse(exchange: &str, pair: &str, asset: &str) -> Result<Self, DepthError> {
        Ok(Self::new(exchange, pair.parse()?, AssetClass::parse(asset)?))
    }
}

impl fmt::Display for DepthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.pair, self.asset)
    }
}

/// Reference to a resting level, by price or by venue id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRef {
    /// Price-keyed venues.
    Price(Decimal),
    /// Id-keyed venues.
    Id(i64),
}

/// One ladder mutation drawn from an incremental message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// Add a level.
    Insert(PriceLevel),
    /// Change the amount (or price, when id-keyed) of a level.
    Amend(PriceLevel),
    /// Remove a level.
    Delete(LevelRef),
}

/// A mutation bound to the side it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// Side to mutate.
    pub side: Side,
    /// Mutation.
    pub action: UpdateAction,
}

impl LevelChange {
    /// Create a change.
    pub fn new(side: Side, action: UpdateAction) -> Self {
        Self { side, action }
    }
}

/// Changes carried by one incremental message. Most venue messages
/// touch a handful of levels.
pub type Changes = SmallVec<[LevelChange; 8]>;

/// Payload of a depth message.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    /// Full replacement of both sides.
    Snapshot {
        /// Bid levels.
        bids: Vec<PriceLevel>,
        /// Ask levels.
        asks: Vec<PriceLevel>,
    },
    /// Incremental changes.
    Delta(Changes),
}

/// Message handed to the pipeline by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    /// Book this message belongs to.
    pub key: DepthKey,
    /// Venue update / sequence id.
    pub update_id: i64,
    /// Snapshot or delta.
    pub payload: UpdatePayload,
    /// Venue checksum over the post-update top of book.
    pub checksum: Option<u32>,
}

impl DepthUpdate {
    /// Create a snapshot message.
    pub fn snapshot(
        key: DepthKey,
        update_id: i64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        Self {
            key,
            update_id,
            payload: UpdatePayload::Snapshot { bids, asks },
            checksum: None,
        }
    }

    /// Create an incremental message.
    pub fn delta(key: DepthKey, update_id: i64, changes: impl IntoIterator<Item = LevelChange>) -> Self {
        Self {
            key,
            update_id,
            payload: UpdatePayload::Delta(changes.into_iter().collect()),
            checksum: None,
        }
    }

    /// Attach a venue checksum.
    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Whether this message is a full snapshot.
    pub fn is_snapshot(&self) -> bool {
        matches!(self.payload, UpdatePayload::Snapshot { .. })
    }
}

/// Liquidity on one side.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SideTotals {
    /// Sum of amounts.
    pub amount: Decimal,
    /// Sum of price * amount.
    pub value: Decimal,
}

/// Read-only copy of a depth at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct DepthSnapshot {
    /// Book key.
    pub key: DepthKey,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// Last applied update id.
    pub last_update_id: i64,
    /// Whether the book was restored from a snapshot.
    pub restored_from_snapshot: bool,
    /// Whether integrity verification is enabled.
    pub verify_enabled: bool,
    /// When the book was last mutated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl DepthSnapshot {
    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Levels of one side, best first.
    pub fn levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }
}
