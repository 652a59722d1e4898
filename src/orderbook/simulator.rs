//! Market-impact simulation by walking the book.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use super::depth::Depth;
use super::types::{DepthSnapshot, PriceLevel, Side};
use crate::error::DepthError;

/// Outcome class of a simulated market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStatus {
    /// The whole amount would fill.
    FullyFilled,
    /// The side ran out before the amount was filled.
    PartiallyFilled,
    /// The side is empty.
    InsufficientLiquidity,
}

/// Result of simulating a market order against the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    /// Outcome class.
    pub status: FillStatus,
    /// Amount asked for.
    pub amount_requested: Decimal,
    /// Amount that would fill.
    pub amount_filled: Decimal,
    /// `amount_filled / amount_requested`.
    pub fill_ratio: Decimal,
    /// Quote spent (buy) or received (sell).
    pub proceeds_or_cost: Decimal,
    /// Volume-weighted average fill price.
    pub average_price: Option<Decimal>,
    /// First level touched.
    pub best_price: Option<Decimal>,
    /// Last level touched.
    pub worst_price: Option<Decimal>,
    /// Distance from best to worst price, as a percentage of best.
    pub price_impact_percent: Decimal,
    /// Levels left on the walked side after the fill.
    pub remaining_levels: usize,
}

/// Walk `levels` (best first) consuming up to `amount`.
#[instrument(skip(levels), fields(amount = %amount))]
pub fn walk_levels<'a, I>(levels: I, amount: Decimal) -> Result<SimulationResult, DepthError>
where
    I: IntoIterator<Item = &'a PriceLevel>,
    I::IntoIter: ExactSizeIterator,
{
    if amount <= Decimal::ZERO {
        return Err(DepthError::InvalidAmount(amount));
    }

    let levels = levels.into_iter();
    let total_levels = levels.len();

    let mut remaining = amount;
    let mut proceeds = Decimal::ZERO;
    let mut best_price = None;
    let mut worst_price = None;
    let mut exhausted_levels = 0;

    for level in levels {
        if remaining.is_zero() {
            break;
        }

        let fill = remaining.min(level.amount);
        proceeds = fill
            .checked_mul(level.price)
            .and_then(|notional| proceeds.checked_add(notional))
            .ok_or(DepthError::Overflow)?;
        remaining -= fill;
        best_price.get_or_insert(level.price);
        worst_price = Some(level.price);

        if fill == level.amount {
            exhausted_levels += 1;
        }
    }

    let filled = amount - remaining;
    let status = if total_levels == 0 {
        FillStatus::InsufficientLiquidity
    } else if remaining.is_zero() {
        FillStatus::FullyFilled
    } else {
        FillStatus::PartiallyFilled
    };

    let price_impact_percent = match (best_price, worst_price) {
        (Some(best), Some(worst)) => (worst - best)
            .abs()
            .checked_div(best)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    };

    Ok(SimulationResult {
        status,
        amount_requested: amount,
        amount_filled: filled,
        fill_ratio: filled.checked_div(amount).unwrap_or(Decimal::ZERO),
        proceeds_or_cost: proceeds,
        average_price: proceeds.checked_div(filled),
        best_price,
        worst_price,
        price_impact_percent,
        remaining_levels: total_levels - exhausted_levels,
    })
}

/// Side a market order consumes.
fn consumed_side(is_buy: bool) -> Side {
    if is_buy {
        Side::Ask
    } else {
        Side::Bid
    }
}

impl Depth {
    /// Simulate a market order: buys lift the asks, sells hit the bids.
    /// Read-only.
    pub fn simulate_order(
        &self,
        amount: Decimal,
        is_buy: bool,
    ) -> Result<SimulationResult, DepthError> {
        walk_levels(self.levels(consumed_side(is_buy)).iter(), amount)
    }
}

impl DepthSnapshot {
    /// Simulate a market order against this copy.
    pub fn simulate_order(
        &self,
        amount: Decimal,
        is_buy: bool,
    ) -> Result<SimulationResult, DepthError> {
        walk_levels(self.levels(consumed_side(is_buy)), amount)
    }
}
