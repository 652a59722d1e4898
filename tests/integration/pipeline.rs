//! End-to-end synchronisation through the registry.

use depthbook::orderbook::{
    DepthOptions, DepthUpdate, Keying, LevelChange, LevelRef, PriceLevel, ProcessOutcome,
    Registry, ResyncReason, Side, SyncState, UpdateAction,
};
use depthbook::DepthError;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use super::{btc_usd, remove, set, snapshot};

#[test]
fn buffered_deltas_replay_on_snapshot() {
    let registry = Registry::default();

    // 10 is stale against the snapshot at 10; 11 and 12 replay in order.
    for update in [
        set(btc_usd(), 12, Side::Ask, 101, 5),
        set(btc_usd(), 10, Side::Bid, 50, 1),
        set(btc_usd(), 11, Side::Bid, 100, 4),
    ] {
        assert_eq!(registry.process(update).unwrap(), ProcessOutcome::Buffered);
    }
    assert!(registry.get(&btc_usd()).is_err());

    assert_eq!(
        registry.process(snapshot(btc_usd(), 10)).unwrap(),
        ProcessOutcome::Synced {
            replayed: 2,
            stale: 1
        }
    );

    let book = registry.get(&btc_usd()).unwrap();
    assert_eq!(book.last_update_id, 12);
    assert!(book.restored_from_snapshot);
    assert_eq!(book.bids[0], PriceLevel::new(dec!(100), dec!(4)));
    assert_eq!(book.asks[0], PriceLevel::new(dec!(101), dec!(5)));
    assert_eq!(book.bids.len(), 2);
}

#[test]
fn gap_invalidates_until_fresh_snapshot() {
    let registry = Registry::default();
    registry.process(snapshot(btc_usd(), 1)).unwrap();
    registry.process(set(btc_usd(), 2, Side::Bid, 98, 1)).unwrap();

    assert_eq!(
        registry.process(remove(btc_usd(), 4, Side::Bid, 98)).unwrap(),
        ProcessOutcome::ResyncRequired(ResyncReason::SequenceGap {
            expected: 3,
            actual: 4
        })
    );
    assert!(matches!(
        registry.get(&btc_usd()),
        Err(DepthError::Invalidated { .. })
    ));

    // Deltas are dropped while resyncing, even the one that would have fit.
    assert_eq!(
        registry.process(remove(btc_usd(), 3, Side::Bid, 98)).unwrap(),
        ProcessOutcome::Discarded
    );

    registry.process(snapshot(btc_usd(), 40)).unwrap();
    let book = registry.get(&btc_usd()).unwrap();
    assert_eq!(book.last_update_id, 40);
    assert_eq!(book.bids.len(), 2);

    let handle = registry.handle(&btc_usd()).unwrap();
    assert_eq!(handle.state(), SyncState::Synced);
    let stats = handle.status().stats;
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.snapshots, 2);
    assert_eq!(stats.discarded, 1);
}

#[test]
fn malformed_verified_snapshot_is_returned_to_caller() {
    let registry = Registry::default();
    registry.register(
        btc_usd(),
        DepthOptions {
            verify: true,
            ..Default::default()
        },
    );

    let crossed = DepthUpdate::snapshot(
        btc_usd(),
        1,
        vec![PriceLevel::new(dec!(105), dec!(1))],
        vec![PriceLevel::new(dec!(101), dec!(1))],
    );
    assert!(matches!(
        registry.process(crossed),
        Err(DepthError::InvalidSnapshot(_))
    ));
    assert!(matches!(
        registry.get(&btc_usd()),
        Err(DepthError::DepthNotFound { .. })
    ));
}

#[test]
fn venue_checksum_is_verified_on_every_delta() {
    let registry = Registry::default();
    let handle = registry.register(
        btc_usd(),
        DepthOptions {
            verify: true,
            checksum_levels: 1,
            ..Default::default()
        },
    );
    handle.process(snapshot(btc_usd(), 1)).unwrap();

    let expected = depthbook::orderbook::checksum::compute(
        &[PriceLevel::new(dec!(100), dec!(3))],
        &[PriceLevel::new(dec!(101), dec!(1))],
        1,
    );
    assert_eq!(
        handle
            .process(set(btc_usd(), 2, Side::Bid, 100, 3).with_checksum(expected))
            .unwrap(),
        ProcessOutcome::Applied
    );

    let outcome = handle
        .process(set(btc_usd(), 3, Side::Bid, 100, 7).with_checksum(expected))
        .unwrap();
    assert!(matches!(
        outcome,
        ProcessOutcome::ResyncRequired(ResyncReason::ChecksumMismatch { .. })
    ));
    assert!(handle.snapshot().is_err());
}

#[test]
fn id_keyed_book_amends_and_deletes_by_id() {
    let registry = Registry::default();
    let handle = registry.register(
        btc_usd(),
        DepthOptions {
            keying: Keying::Id,
            ..Default::default()
        },
    );
    handle
        .process(DepthUpdate::snapshot(
            btc_usd(),
            1,
            vec![
                PriceLevel::with_id(7, dec!(100), dec!(1)),
                PriceLevel::with_id(8, dec!(99), dec!(1)),
            ],
            vec![PriceLevel::with_id(9, dec!(101), dec!(1))],
        ))
        .unwrap();

    handle
        .process(DepthUpdate::delta(
            btc_usd(),
            2,
            [
                LevelChange::new(
                    Side::Bid,
                    UpdateAction::Amend(PriceLevel::with_id(8, dec!(100.5), dec!(3))),
                ),
                LevelChange::new(Side::Ask, UpdateAction::Delete(LevelRef::Id(9))),
            ],
        ))
        .unwrap();

    let book = handle.snapshot().unwrap();
    assert_eq!(
        book.bids,
        vec![
            PriceLevel::with_id(8, dec!(100.5), dec!(3)),
            PriceLevel::with_id(7, dec!(100), dec!(1)),
        ]
    );
    assert!(book.asks.is_empty());

    // Amending an id that is not resting sends the book to resync.
    let outcome = handle
        .process(DepthUpdate::delta(
            btc_usd(),
            3,
            [LevelChange::new(
                Side::Ask,
                UpdateAction::Amend(PriceLevel::with_id(42, dec!(101), dec!(1))),
            )],
        ))
        .unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::ResyncRequired(ResyncReason::UnknownLevel { id: 42 })
    );
}

#[test]
fn books_share_the_node_pool() {
    let registry = Registry::default();
    registry.process(snapshot(btc_usd(), 1)).unwrap();
    registry.process(remove(btc_usd(), 2, Side::Ask, 102)).unwrap();

    let eth = depthbook::orderbook::DepthKey::parse("kraken", "ETH-USD", "spot").unwrap();
    registry.process(snapshot(eth.clone(), 1)).unwrap();

    let stats = registry.pool().stats();
    assert!(stats.reused >= 1);
    assert_eq!(registry.get(&eth).unwrap().asks.len(), 2);
}

#[test]
fn simulation_reads_live_book() {
    let registry = Registry::default();
    registry.process(snapshot(btc_usd(), 1)).unwrap();

    let book = registry.depth(&btc_usd()).unwrap();
    let buy = book.simulate_order(dec!(2), true).unwrap();
    assert_eq!(buy.proceeds_or_cost, dec!(203));
    assert_eq!(buy.worst_price, Some(dec!(102)));

    let copy = registry.get(&btc_usd()).unwrap();
    assert_eq!(copy.simulate_order(dec!(2), true).unwrap(), buy);
    assert_eq!(copy.asks.len(), 2);
}

#[test]
fn negative_delta_amount_is_refused_and_book_stays_live() {
    let registry = Registry::default();
    registry.process(snapshot(btc_usd(), 1)).unwrap();

    let insert = DepthUpdate::delta(
        btc_usd(),
        2,
        [LevelChange::new(
            Side::Ask,
            UpdateAction::Insert(PriceLevel::new(dec!(103), dec!(-5))),
        )],
    );
    assert!(matches!(
        registry.process(insert),
        Err(DepthError::InvalidLevel { .. })
    ));

    let handle = registry.handle(&btc_usd()).unwrap();
    assert_eq!(handle.state(), SyncState::Synced);

    let book = registry.get(&btc_usd()).unwrap();
    assert_eq!(book.last_update_id, 1);
    assert_eq!(book.asks.len(), 2);
    assert!(book.asks.iter().all(|l| l.amount > dec!(0)));

    // The same id is still accepted once well formed.
    assert_eq!(
        registry.process(set(btc_usd(), 2, Side::Ask, 103, 5)).unwrap(),
        ProcessOutcome::Applied
    );
}

#[test]
fn delta_after_max_update_id_resyncs() {
    let registry = Registry::default();
    registry.process(snapshot(btc_usd(), i64::MAX)).unwrap();

    assert_eq!(
        registry.process(set(btc_usd(), 1, Side::Bid, 100, 3)).unwrap(),
        ProcessOutcome::ResyncRequired(ResyncReason::SequenceGap {
            expected: i64::MAX,
            actual: 1
        })
    );
    assert_eq!(
        registry.handle(&btc_usd()).unwrap().state(),
        SyncState::Resyncing
    );
}
