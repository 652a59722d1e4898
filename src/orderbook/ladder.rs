//! One side of an order book, stored as pooled nodes in ladder order.

use std::time::Instant;

use rust_decimal::Decimal;

use super::pool::{Node, NodePool};
use super::types::{PriceLevel, Side, SideTotals};
use crate::error::DepthError;

/// Price levels of one side, best first.
///
/// Bids are kept strictly descending and asks strictly ascending by price;
/// at most one level rests at any price.
#[derive(Debug)]
pub struct Ladder {
    side: Side,
    nodes: Vec<Box<Node>>,
}

impl Ladder {
    /// Create an empty ladder.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            nodes: Vec::new(),
        }
    }

    /// Which side this ladder holds.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the ladder has no levels.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Levels, best first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PriceLevel> + ExactSizeIterator + '_ {
        self.nodes.iter().map(|n| &n.level)
    }

    /// Best level.
    pub fn best(&self) -> Option<&PriceLevel> {
        self.nodes.first().map(|n| &n.level)
    }

    /// Copy of the levels, best first.
    pub fn to_vec(&self) -> Vec<PriceLevel> {
        self.iter().copied().collect()
    }

    /// Copy of the levels, worst first.
    pub fn reversed(&self) -> Vec<PriceLevel> {
        self.iter().rev().copied().collect()
    }

    /// Total amount and notional value. Both saturate at `Decimal::MAX`.
    pub fn totals(&self) -> SideTotals {
        self.iter().fold(SideTotals::default(), |acc, l| SideTotals {
            amount: acc.amount.saturating_add(l.amount),
            value: acc.value.saturating_add(l.value()),
        })
    }

    /// Whether prices are strictly in ladder order.
    pub fn is_strictly_ordered(&self) -> bool {
        self.nodes.windows(2).all(|w| {
            self.side.ladder_order(w[0].level.price, w[1].level.price) == std::cmp::Ordering::Less
        })
    }

    /// Replace every level. `levels` must already be in ladder order with
    /// unique prices.
    pub(crate) fn replace(&mut self, levels: &[PriceLevel], pool: &NodePool, now: Instant) {
        pool.release_all_at(self.nodes.drain(..), now);
        self.nodes.reserve(levels.len());
        for level in levels {
            let mut node = pool.acquire_at(now);
            node.level = *level;
            self.nodes.push(node);
        }
    }

    /// Hand every node back to the pool.
    pub(crate) fn clear(&mut self, pool: &NodePool, now: Instant) {
        pool.release_all_at(self.nodes.drain(..), now);
    }

    /// Set the amount at a price, inserting the level if absent. A zero
    /// amount removes the level.
    pub(crate) fn upsert_by_price(&mut self, level: PriceLevel, pool: &NodePool, now: Instant) {
        if level.amount.is_zero() {
            self.remove_by_price(level.price, pool, now);
            return;
        }

        match self.locate(level.price) {
            Ok(i) => {
                let resting = &mut self.nodes[i].level;
                resting.amount = level.amount;
                if level.id.is_some() {
                    resting.id = level.id;
                }
            }
            Err(i) => self.splice(i, level, pool, now),
        }
    }

    /// Remove the level at a price. Returns whether one was removed.
    pub(crate) fn remove_by_price(&mut self, price: Decimal, pool: &NodePool, now: Instant) -> bool {
        match self.locate(price) {
            Ok(i) => {
                pool.release_at(self.nodes.remove(i), now);
                true
            }
            Err(_) => false,
        }
    }

    /// Place an id-keyed level by price. An existing level with the same id
    /// is moved; a level already resting at the price takes over the id.
    pub(crate) fn insert_by_id(&mut self, level: PriceLevel, pool: &NodePool, now: Instant) {
        if let Some(id) = level.id {
            self.remove_by_id(id, pool, now);
        }
        if level.amount.is_zero() {
            return;
        }

        match self.locate(level.price) {
            Ok(i) => self.nodes[i].level = level,
            Err(i) => self.splice(i, level, pool, now),
        }
    }

    /// Amend an id-keyed level. A price change relocates it; a zero amount
    /// removes it.
    pub(crate) fn amend_by_id(
        &mut self,
        id: i64,
        level: PriceLevel,
        pool: &NodePool,
        now: Instant,
    ) -> Result<(), DepthError> {
        let i = self.position_of_id(id).ok_or(DepthError::LevelNotFound { id })?;

        if level.amount.is_zero() {
            pool.release_at(self.nodes.remove(i), now);
            return Ok(());
        }

        if self.nodes[i].level.price == level.price {
            self.nodes[i].level.amount = level.amount;
            return Ok(());
        }

        let mut node = self.nodes.remove(i);
        node.level = PriceLevel { id: Some(id), ..level };
        match self.locate(level.price) {
            Ok(j) => {
                self.nodes[j].level = node.level;
                pool.release_at(node, now);
            }
            Err(j) => self.nodes.insert(j, node),
        }
        Ok(())
    }

    /// Remove the level with an id. Returns whether one was removed.
    pub(crate) fn remove_by_id(&mut self, id: i64, pool: &NodePool, now: Instant) -> bool {
        match self.position_of_id(id) {
            Some(i) => {
                pool.release_at(self.nodes.remove(i), now);
                true
            }
            None => false,
        }
    }

    fn splice(&mut self, at: usize, level: PriceLevel, pool: &NodePool, now: Instant) {
        let mut node = pool.acquire_at(now);
        node.level = level;
        self.nodes.insert(at, node);
    }

    fn locate(&self, price: Decimal) -> Result<usize, usize> {
        let side = self.side;
        self.nodes
            .binary_search_by(|n| side.ladder_order(n.level.price, price))
    }

    fn position_of_id(&self, id: i64) -> Option<usize> {
        self.nodes.iter().position(|n| n.level.id == Some(id))
    }
}
