//! Readers and writers sharing one registry.

use std::sync::Arc;
use std::thread;

use depthbook::orderbook::{AssetClass, DepthKey, Pair, Registry, Side, SyncState};

use super::{btc_usd, set, snapshot};

#[test]
fn readers_never_observe_a_torn_book() {
    let registry = Arc::new(Registry::default());
    registry.process(snapshot(btc_usd(), 0)).unwrap();

    thread::scope(|s| {
        let writer = Arc::clone(&registry);
        s.spawn(move || {
            for id in 1..=2_000 {
                let (side, price) = if id % 2 == 0 {
                    (Side::Bid, 90 - (id % 40))
                } else {
                    (Side::Ask, 110 + (id % 40))
                };
                writer
                    .process(set(btc_usd(), id, side, price, id % 3))
                    .unwrap();
            }
        });

        for _ in 0..4 {
            let reader = Arc::clone(&registry);
            s.spawn(move || {
                let mut last_seen = 0;
                for _ in 0..500 {
                    let book = reader.get(&btc_usd()).unwrap();
                    assert!(book.last_update_id >= last_seen);
                    last_seen = book.last_update_id;

                    assert!(book.bids.windows(2).all(|w| w[0].price > w[1].price));
                    assert!(book.asks.windows(2).all(|w| w[0].price < w[1].price));
                    assert!(book.bids.iter().chain(&book.asks).all(|l| !l.amount.is_zero()));
                }
            });
        }
    });

    let book = registry.get(&btc_usd()).unwrap();
    assert_eq!(book.last_update_id, 2_000);
}

#[test]
fn keys_progress_independently_across_threads() {
    let registry = Arc::new(Registry::default());
    let keys: Vec<DepthKey> = ["BTC", "ETH", "SOL", "XRP", "ADA", "DOT"]
        .iter()
        .map(|base| DepthKey::new("binance", Pair::new(base, "USDT"), AssetClass::Spot))
        .collect();

    thread::scope(|s| {
        for key in &keys {
            let registry = Arc::clone(&registry);
            s.spawn(move || {
                // Half the deltas arrive before the snapshot.
                for id in 6..=10 {
                    registry.process(set(key.clone(), id, Side::Bid, 100, id)).unwrap();
                }
                registry.process(snapshot(key.clone(), 5)).unwrap();
                for id in 11..=100 {
                    registry.process(set(key.clone(), id, Side::Ask, 101, id)).unwrap();
                }
            });
        }
    });

    assert_eq!(registry.len(), keys.len());
    for key in &keys {
        let handle = registry.handle(key).unwrap();
        assert_eq!(handle.state(), SyncState::Synced);

        let book = handle.snapshot().unwrap();
        assert_eq!(book.last_update_id, 100);
        assert_eq!(book.best_ask(), Some(rust_decimal::Decimal::new(101, 0)));
        assert_eq!(book.asks[0].amount, rust_decimal::Decimal::new(100, 0));
    }
}
