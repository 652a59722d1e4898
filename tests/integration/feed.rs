//! Replaying JSON-lines feeds from disk.

use std::path::PathBuf;

use depthbook::feed::{replay_file, ReplaySummary};
use depthbook::orderbook::{DepthKey, Registry, SyncState};
use depthbook::AppError;
use rust_decimal_macros::dec;

fn write_feed(name: &str, lines: &[&str]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("depthbook-{}-{}.jsonl", name, std::process::id()));
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

const BYBIT_SNAPSHOT: &str = r#"{"exchange":"bybit","pair":"ETH-USDT","asset":"perpetual_swap","type":"snapshot","update_id":100,"bids":[{"price":"2000.5","amount":"3"},{"price":"2000","amount":"1"}],"asks":[{"price":"2001","amount":"2"}]}"#;

#[tokio::test]
async fn replays_a_recorded_session() {
    let path = write_feed(
        "session",
        &[
            r#"{"exchange":"bybit","pair":"ETH-USDT","asset":"perpetual_swap","type":"update","update_id":101,"changes":[{"side":"Buy","action":"update","price":"2000.5","amount":"4"}]}"#,
            BYBIT_SNAPSHOT,
            r#"{"exchange":"bybit","pair":"ETH-USDT","asset":"perpetual_swap","type":"update","update_id":102,"changes":[{"side":"Sell","action":"insert","price":"2001.5","amount":"1"},{"side":"Buy","action":"delete","price":"2000"}]}"#,
            r#"{"exchange":"bybit","pair":"ETH-USDT","asset":"perpetual_swap","type":"update","update_id":103,"changes":[{"side":"Sell","action":"update","price":"2001","amount":"0"}]}"#,
        ],
    );
    let registry = Registry::default();

    let summary = replay_file(&registry, &path, true).await.unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(
        summary,
        ReplaySummary {
            lines: 4,
            applied: 2,
            buffered: 1,
            synced: 1,
            ..Default::default()
        }
    );

    let key = DepthKey::parse("bybit", "ETH-USDT", "perp").unwrap();
    let book = registry.get(&key).unwrap();
    assert_eq!(book.last_update_id, 103);
    assert_eq!(book.best_bid(), Some(dec!(2000.5)));
    assert_eq!(book.bids[0].amount, dec!(4));
    assert_eq!(book.bids.len(), 1);
    assert_eq!(book.best_ask(), Some(dec!(2001.5)));
}

#[tokio::test]
async fn gap_in_recording_leaves_book_resyncing() {
    let path = write_feed(
        "gap",
        &[
            BYBIT_SNAPSHOT,
            r#"{"exchange":"bybit","pair":"ETH-USDT","asset":"perpetual_swap","type":"update","update_id":105,"changes":[{"side":"b","action":"amend","price":"2000","amount":"9"}]}"#,
            r#"{"exchange":"bybit","pair":"ETH-USDT","asset":"perpetual_swap","type":"update","update_id":106,"changes":[{"side":"b","action":"amend","price":"2000","amount":"8"}]}"#,
        ],
    );
    let registry = Registry::default();

    let summary = replay_file(&registry, &path, false).await.unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(summary.resyncs, 1);
    assert_eq!(summary.discarded, 1);

    let key = DepthKey::parse("bybit", "ETH-USDT", "perpetual_swap").unwrap();
    assert_eq!(registry.handle(&key).unwrap().state(), SyncState::Resyncing);
    assert!(registry.get(&key).is_err());
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let registry = Registry::default();
    let err = replay_file(&registry, "/nonexistent/depthbook.jsonl", false)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Io(_)));
}
