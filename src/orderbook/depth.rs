//! Authoritative bid/ask ladder for one (exchange, pair, asset) key.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::debug;

use super::checksum::{self, DEFAULT_CHECKSUM_LEVELS};
use super::ladder::Ladder;
use super::pool::NodePool;
use super::types::{
    DepthKey, DepthSnapshot, LevelChange, LevelRef, PriceLevel, Side, SideTotals, UpdateAction,
};
use crate::error::DepthError;

/// How a venue sequences its incremental feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sequencing {
    /// Every update id must be exactly the previous id plus one.
    #[default]
    Strict,
    /// Updates carry absolute amounts and apply unconditionally.
    Unsequenced,
}

/// How a venue identifies levels in incremental updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keying {
    /// Levels are addressed by price.
    #[default]
    Price,
    /// Levels are addressed by a venue id.
    Id,
}

/// Per-book behaviour supplied by the owning adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthOptions {
    /// Verify snapshots and compare venue checksums.
    pub verify: bool,
    /// Sequencing discipline of the feed.
    pub sequencing: Sequencing,
    /// Level addressing of the feed.
    pub keying: Keying,
    /// Levels per side covered by the checksum.
    pub checksum_levels: usize,
}

impl Default for DepthOptions {
    fn default() -> Self {
        Self {
            verify: false,
            sequencing: Sequencing::default(),
            keying: Keying::default(),
            checksum_levels: DEFAULT_CHECKSUM_LEVELS,
        }
    }
}

/// Live order book for one key.
///
/// Levels are drawn from and returned to the shared [`NodePool`]. The book
/// is not internally synchronised; the registry wraps it in a lock.
#[derive(Debug)]
pub struct Depth {
    key: DepthKey,
    options: DepthOptions,
    bids: Ladder,
    asks: Ladder,
    last_update_id: i64,
    restored_from_snapshot: bool,
    invalidated: Option<String>,
    updated_at: OffsetDateTime,
    pool: Arc<NodePool>,
}

impl Depth {
    /// Create an empty book.
    pub fn new(key: DepthKey, options: DepthOptions, pool: Arc<NodePool>) -> Self {
        Self {
            key,
            options,
            bids: Ladder::new(Side::Bid),
            asks: Ladder::new(Side::Ask),
            last_update_id: 0,
            restored_from_snapshot: false,
            invalidated: None,
            updated_at: OffsetDateTime::now_utc(),
            pool,
        }
    }

    /// Book key.
    pub fn key(&self) -> &DepthKey {
        &self.key
    }

    /// Book options.
    pub fn options(&self) -> DepthOptions {
        self.options
    }

    /// Last applied update id.
    pub fn last_update_id(&self) -> i64 {
        self.last_update_id
    }

    /// Whether a snapshot has been loaded.
    pub fn is_restored(&self) -> bool {
        self.restored_from_snapshot
    }

    /// Whether verification is enabled.
    pub fn verify_enabled(&self) -> bool {
        self.options.verify
    }

    /// Enable or disable verification.
    pub fn set_verify(&mut self, verify: bool) {
        self.options.verify = verify;
    }

    /// When the book was last mutated.
    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// Why the book is awaiting a fresh snapshot, if it is.
    pub fn invalidation(&self) -> Option<&str> {
        self.invalidated.as_deref()
    }

    /// Mark the book stale until the next snapshot.
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.invalidated = Some(reason.into());
    }

    /// Replace both sides wholesale.
    ///
    /// With verification enabled a malformed snapshot is rejected and the
    /// book is left untouched; otherwise levels are sorted, merged on
    /// duplicate price (last wins) and non-positive entries dropped.
    pub fn load_snapshot(
        &mut self,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        update_id: i64,
    ) -> Result<(), DepthError> {
        let bids = self.prepare(Side::Bid, bids)?;
        let asks = self.prepare(Side::Ask, asks)?;

        if self.options.verify {
            if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
                if bid.price >= ask.price {
                    return Err(DepthError::InvalidSnapshot(format!(
                        "crossed book: best bid {} >= best ask {}",
                        bid.price, ask.price
                    )));
                }
            }
        }

        let now = Instant::now();
        self.bids.replace(&bids, &self.pool, now);
        self.asks.replace(&asks, &self.pool, now);
        self.last_update_id = update_id;
        self.restored_from_snapshot = true;
        self.invalidated = None;
        self.updated_at = OffsetDateTime::now_utc();

        debug!(
            key = %self.key,
            update_id,
            bids = self.bids.len(),
            asks = self.asks.len(),
            "snapshot loaded"
        );
        Ok(())
    }

    /// Apply one mutation to one side.
    pub fn apply_update(
        &mut self,
        side: Side,
        action: UpdateAction,
        update_id: i64,
    ) -> Result<(), DepthError> {
        self.apply_changes(update_id, &[LevelChange::new(side, action)])
    }

    /// Apply every change of one venue message under a single update id.
    ///
    /// Inserts and amends must carry a positive price and a non-negative
    /// amount; a message with any other level is refused before the book
    /// is touched.
    pub fn apply_changes(
        &mut self,
        update_id: i64,
        changes: &[LevelChange],
    ) -> Result<(), DepthError> {
        if !self.restored_from_snapshot {
            return Err(DepthError::DepthNotFound {
                key: self.key.clone(),
            });
        }
        self.check_sequence(update_id)?;
        validate_changes(changes)?;

        let now = Instant::now();
        for change in changes {
            self.apply_one(*change, now)?;
        }

        self.last_update_id = match self.options.sequencing {
            Sequencing::Strict => update_id,
            Sequencing::Unsequenced => self.last_update_id.max(update_id),
        };
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Compare the local top-of-book checksum against the venue's.
    /// Always passes when verification is disabled.
    pub fn verify_integrity(&self, expected: u32) -> Result<(), DepthError> {
        if !self.options.verify {
            return Ok(());
        }

        let computed = self.checksum();
        if computed != expected || !self.bids.is_strictly_ordered() || !self.asks.is_strictly_ordered()
        {
            return Err(DepthError::BookIntegrity { expected, computed });
        }
        Ok(())
    }

    /// Checksum over the configured number of top levels.
    pub fn checksum(&self) -> u32 {
        checksum::compute(
            self.bids.iter(),
            self.asks.iter(),
            self.options.checksum_levels,
        )
    }

    /// Ladder of one side.
    pub fn levels(&self, side: Side) -> &Ladder {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Levels of one side in the opposite of ladder order.
    pub fn reverse(&self, side: Side) -> Vec<PriceLevel> {
        self.levels(side).reversed()
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best().map(|l| l.price)
    }

    /// Number of bid levels.
    pub fn bid_len(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels.
    pub fn ask_len(&self) -> usize {
        self.asks.len()
    }

    /// Midpoint of the best bid and ask.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.checked_add(ask)?.checked_div(Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread between best bid and ask.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Spread as a percentage of the best ask.
    pub fn spread_percentage(&self) -> Option<Decimal> {
        let ask = self.best_ask()?;
        self.spread()?
            .checked_div(ask)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
    }

    /// Volume imbalance in `[-1, 1]`; positive means more bid volume.
    pub fn imbalance(&self) -> Option<Decimal> {
        let bid = self.bids.totals().amount;
        let ask = self.asks.totals().amount;
        bid.checked_sub(ask)?.checked_div(bid.checked_add(ask)?)
    }

    /// Total amount and notional value of one side.
    pub fn total_volume(&self, side: Side) -> SideTotals {
        self.levels(side).totals()
    }

    /// Read-only copy of the book.
    pub fn snapshot(&self) -> DepthSnapshot {
        DepthSnapshot {
            key: self.key.clone(),
            bids: self.bids.to_vec(),
            asks: self.asks.to_vec(),
            last_update_id: self.last_update_id,
            restored_from_snapshot: self.restored_from_snapshot,
            verify_enabled: self.options.verify,
            updated_at: self.updated_at,
        }
    }

    fn check_sequence(&self, update_id: i64) -> Result<(), DepthError> {
        if self.options.sequencing == Sequencing::Unsequenced {
            return Ok(());
        }

        let expected = self
            .last_update_id
            .checked_add(1)
            .ok_or(DepthError::OutOfSequence {
                expected: self.last_update_id,
                actual: update_id,
            })?;
        if update_id != expected {
            return Err(DepthError::OutOfSequence {
                expected,
                actual: update_id,
            });
        }
        Ok(())
    }

    fn apply_one(&mut self, change: LevelChange, now: Instant) -> Result<(), DepthError> {
        let ladder = match change.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let pool = &self.pool;

        match (change.action, self.options.keying) {
            (UpdateAction::Insert(level), Keying::Id) if level.id.is_some() => {
                ladder.insert_by_id(level, pool, now);
            }
            (UpdateAction::Amend(level), Keying::Id) => match level.id {
                Some(id) => ladder.amend_by_id(id, level, pool, now)?,
                None => ladder.upsert_by_price(level, pool, now),
            },
            (UpdateAction::Insert(level), _) | (UpdateAction::Amend(level), Keying::Price) => {
                ladder.upsert_by_price(level, pool, now);
            }
            (UpdateAction::Delete(LevelRef::Price(price)), _) => {
                ladder.remove_by_price(price, pool, now);
            }
            (UpdateAction::Delete(LevelRef::Id(id)), _) => {
                ladder.remove_by_id(id, pool, now);
            }
        }
        Ok(())
    }

    fn prepare(&self, side: Side, levels: Vec<PriceLevel>) -> Result<Vec<PriceLevel>, DepthError> {
        if self.options.verify {
            verify_levels(side, &levels)?;
            return Ok(levels);
        }

        let mut sorted: Vec<PriceLevel> = levels
            .into_iter()
            .filter(|l| l.price > Decimal::ZERO && l.amount > Decimal::ZERO)
            .collect();
        sorted.sort_by(|a, b| side.ladder_order(a.price, b.price));

        let mut merged: Vec<PriceLevel> = Vec::with_capacity(sorted.len());
        for level in sorted {
            match merged.last_mut() {
                Some(last) if last.price == level.price => *last = level,
                _ => merged.push(level),
            }
        }
        Ok(merged)
    }
}

impl Drop for Depth {
    fn drop(&mut self) {
        let now = Instant::now();
        self.bids.clear(&self.pool, now);
        self.asks.clear(&self.pool, now);
    }
}

/// Refuse inserts and amends with a non-positive price or negative amount.
pub(crate) fn validate_changes(changes: &[LevelChange]) -> Result<(), DepthError> {
    for change in changes {
        let level = match change.action {
            UpdateAction::Insert(level) | UpdateAction::Amend(level) => level,
            UpdateAction::Delete(_) => continue,
        };
        if level.price <= Decimal::ZERO || level.amount < Decimal::ZERO {
            return Err(DepthError::InvalidLevel {
                side: change.side,
                price: level.price,
                amount: level.amount,
            });
        }
    }
    Ok(())
}

fn verify_levels(side: Side, levels: &[PriceLevel]) -> Result<(), DepthError> {
    let mut ids = HashSet::new();

    for (i, level) in levels.iter().enumerate() {
        if level.price <= Decimal::ZERO {
            return Err(DepthError::InvalidSnapshot(format!(
                "{side} level {i} has non-positive price {}",
                level.price
            )));
        }
        if level.amount <= Decimal::ZERO {
            return Err(DepthError::InvalidSnapshot(format!(
                "{side} level {i} has non-positive amount {}",
                level.amount
            )));
        }
        if let Some(id) = level.id {
            if !ids.insert(id) {
                return Err(DepthError::InvalidSnapshot(format!(
                    "{side} level {i} duplicates id {id}"
                )));
            }
        }
        if i > 0 {
            let prev = levels[i - 1].price;
            if prev == level.price {
                return Err(DepthError::InvalidSnapshot(format!(
                    "{side} level {i} duplicates price {}",
                    level.price
                )));
            }
            if side.ladder_order(prev, level.price) != std::cmp::Ordering::Less {
                return Err(DepthError::InvalidSnapshot(format!(
                    "{side} level {i} out of order: {} after {prev}",
                    level.price
                )));
            }
        }
    }
    Ok(())
}
