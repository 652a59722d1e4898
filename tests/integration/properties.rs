//! Property-based tests for ladder invariants.
//!
//! - Both sides stay strictly sorted with no zero-amount levels
//! - The ladder matches a map model after any action sequence
//! - Buffered replay is independent of arrival order

use std::collections::BTreeMap;
use std::sync::Arc;

use depthbook::orderbook::{
    AssetClass, Depth, DepthKey, DepthOptions, DepthUpdate, LevelChange, LevelRef, NodePool, Pair,
    PriceLevel, Registry, Side, UpdateAction,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
enum Op {
    Set(Side, i64, i64),
    Delete(Side, i64),
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Bid), Just(Side::Ask)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (arb_side(), 1i64..60, 0i64..5).prop_map(|(s, p, a)| Op::Set(s, p, a)),
        1 => (arb_side(), 1i64..60).prop_map(|(s, p)| Op::Delete(s, p)),
    ]
}

fn change(op: Op) -> LevelChange {
    match op {
        Op::Set(side, price, amount) => LevelChange::new(
            side,
            UpdateAction::Amend(PriceLevel::new(Decimal::new(price, 0), Decimal::new(amount, 0))),
        ),
        Op::Delete(side, price) => {
            LevelChange::new(side, UpdateAction::Delete(LevelRef::Price(Decimal::new(price, 0))))
        }
    }
}

fn key() -> DepthKey {
    DepthKey::new("prop", Pair::new("A", "B"), AssetClass::Spot)
}

fn empty_depth() -> Depth {
    let mut depth = Depth::new(key(), DepthOptions::default(), Arc::new(NodePool::default()));
    depth.load_snapshot(Vec::new(), Vec::new(), 0).unwrap();
    depth
}

proptest! {
    #[test]
    fn prop_sides_stay_sorted_and_match_model(ops in prop::collection::vec(arb_op(), 0..200)) {
        let mut depth = empty_depth();
        let mut model: [BTreeMap<i64, i64>; 2] = [BTreeMap::new(), BTreeMap::new()];

        for (i, op) in ops.iter().enumerate() {
            depth.apply_changes(i as i64 + 1, &[change(*op)]).unwrap();
            match *op {
                Op::Set(side, price, 0) | Op::Delete(side, price) => {
                    model[side as usize].remove(&price);
                }
                Op::Set(side, price, amount) => {
                    model[side as usize].insert(price, amount);
                }
            }
        }

        prop_assert!(depth.levels(Side::Bid).is_strictly_ordered());
        prop_assert!(depth.levels(Side::Ask).is_strictly_ordered());

        let bids: Vec<(i64, i64)> = model[Side::Bid as usize].iter().rev().map(|(p, a)| (*p, *a)).collect();
        let asks: Vec<(i64, i64)> = model[Side::Ask as usize].iter().map(|(p, a)| (*p, *a)).collect();
        let as_pairs = |levels: Vec<PriceLevel>| -> Vec<(i64, i64)> {
            levels
                .iter()
                .map(|l| (l.price.mantissa() as i64, l.amount.mantissa() as i64))
                .collect()
        };

        prop_assert_eq!(as_pairs(depth.levels(Side::Bid).to_vec()), bids);
        prop_assert_eq!(as_pairs(depth.levels(Side::Ask).to_vec()), asks);
        prop_assert_eq!(depth.last_update_id(), ops.len() as i64);
    }

    #[test]
    fn prop_buffer_replay_ignores_arrival_order(
        (ops, order) in prop::collection::vec(arb_op(), 1..40).prop_flat_map(|ops| {
            let order: Vec<usize> = (0..ops.len()).collect();
            (Just(ops), Just(order).prop_shuffle())
        })
    ) {
        let registry = Registry::default();
        for i in &order {
            registry
                .process(DepthUpdate::delta(key(), *i as i64 + 1, [change(ops[*i])]))
                .unwrap();
        }
        registry
            .process(DepthUpdate::snapshot(key(), 0, Vec::new(), Vec::new()))
            .unwrap();

        let mut direct = empty_depth();
        for (i, op) in ops.iter().enumerate() {
            direct.apply_changes(i as i64 + 1, &[change(*op)]).unwrap();
        }

        let replayed = registry.get(&key()).unwrap();
        prop_assert_eq!(replayed.bids, direct.levels(Side::Bid).to_vec());
        prop_assert_eq!(replayed.asks, direct.levels(Side::Ask).to_vec());
    }
}
