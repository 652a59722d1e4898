//! Integration tests for the depth engine.
//!
//! Run with: cargo test --test integration

mod concurrency;
mod feed;
mod pipeline;
mod properties;

use depthbook::orderbook::{
    AssetClass, DepthKey, DepthUpdate, LevelChange, LevelRef, Pair, PriceLevel, Side,
    UpdateAction,
};
use rust_decimal::Decimal;

/// Key used by most scenarios.
pub fn btc_usd() -> DepthKey {
    DepthKey::new("kraken", Pair::new("BTC", "USD"), AssetClass::Spot)
}

/// Two-sided snapshot around 100.
pub fn snapshot(key: DepthKey, update_id: i64) -> DepthUpdate {
    DepthUpdate::snapshot(
        key,
        update_id,
        vec![
            PriceLevel::new(Decimal::new(100, 0), Decimal::new(1, 0)),
            PriceLevel::new(Decimal::new(99, 0), Decimal::new(2, 0)),
        ],
        vec![
            PriceLevel::new(Decimal::new(101, 0), Decimal::new(1, 0)),
            PriceLevel::new(Decimal::new(102, 0), Decimal::new(2, 0)),
        ],
    )
}

/// Single-change delta setting a price-keyed level.
pub fn set(key: DepthKey, update_id: i64, side: Side, price: i64, amount: i64) -> DepthUpdate {
    DepthUpdate::delta(
        key,
        update_id,
        [LevelChange::new(
            side,
            UpdateAction::Amend(PriceLevel::new(
                Decimal::new(price, 0),
                Decimal::new(amount, 0),
            )),
        )],
    )
}

/// Single-change delta deleting a price-keyed level.
pub fn remove(key: DepthKey, update_id: i64, side: Side, price: i64) -> DepthUpdate {
    DepthUpdate::delta(
        key,
        update_id,
        [LevelChange::new(
            side,
            UpdateAction::Delete(LevelRef::Price(Decimal::new(price, 0))),
        )],
    )
}
