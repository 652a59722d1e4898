//! JSON-lines feed adapter.
//!
//! Each line is one venue-neutral depth message:
//!
//! ```text
//! {"exchange":"kraken","pair":"BTC-USD","asset":"spot","type":"snapshot","update_id":10,
//!  "bids":[{"price":"100","amount":"1"}],"asks":[{"price":"101","amount":"2"}]}
//! {"exchange":"kraken","pair":"BTC-USD","asset":"spot","type":"update","update_id":11,
//!  "changes":[{"side":"buy","action":"amend","price":"100","amount":"3"}],"checksum":12345}
//! ```

use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::EnumString;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::error::{AppError, DepthError, FeedError, Result};
use crate::orderbook::{
    Changes, DepthKey, DepthUpdate, LevelChange, LevelRef, PriceLevel, ProcessOutcome, Registry,
    Side, UpdateAction, UpdatePayload,
};

/// Message kind on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    /// Full book.
    Snapshot,
    /// Incremental changes.
    #[serde(alias = "delta")]
    Update,
}

/// Level as it appears in a snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct WireLevel {
    /// Level price.
    pub price: Decimal,
    /// Level amount.
    pub amount: Decimal,
    /// Venue level id.
    #[serde(default)]
    pub id: Option<i64>,
}

/// Change as it appears in an update.
#[derive(Debug, Clone, Deserialize)]
pub struct WireChange {
    /// Side token.
    pub side: String,
    /// Action token.
    pub action: String,
    /// Price, required unless deleting by id.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Amount, required for insert and amend.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Venue level id.
    #[serde(default)]
    pub id: Option<i64>,
}

/// One line of the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    /// Exchange name.
    pub exchange: String,
    /// Instrument pair.
    pub pair: String,
    /// Market segment.
    #[serde(default = "default_asset")]
    pub asset: String,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: WireKind,
    /// Venue update id.
    pub update_id: i64,
    /// Snapshot bids.
    #[serde(default)]
    pub bids: Vec<WireLevel>,
    /// Snapshot asks.
    #[serde(default)]
    pub asks: Vec<WireLevel>,
    /// Update changes.
    #[serde(default)]
    pub changes: Vec<WireChange>,
    /// Venue checksum.
    #[serde(default)]
    pub checksum: Option<u32>,
}

fn default_asset() -> String {
    "spot".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
enum ActionToken {
    #[strum(serialize = "insert", serialize = "new", serialize = "add")]
    Insert,
    #[strum(serialize = "amend", serialize = "update", serialize = "change")]
    Amend,
    #[strum(serialize = "delete", serialize = "remove")]
    Delete,
}

impl From<WireLevel> for PriceLevel {
    fn from(level: WireLevel) -> Self {
        PriceLevel {
            price: level.price,
            amount: level.amount,
            id: level.id,
        }
    }
}

impl WireChange {
    fn decode(self) -> std::result::Result<LevelChange, FeedError> {
        let side = Side::parse(&self.side)?;
        let action = ActionToken::from_str(self.action.trim())
            .map_err(|_| DepthError::UnsupportedAction(self.action.clone()))?;

        let missing = |field| FeedError::MissingField {
            field,
            action: self.action.clone(),
        };

        let action = match action {
            ActionToken::Delete => match (self.id, self.price) {
                (Some(id), _) => UpdateAction::Delete(LevelRef::Id(id)),
                (None, Some(price)) => UpdateAction::Delete(LevelRef::Price(price)),
                (None, None) => return Err(missing("price")),
            },
            ActionToken::Insert | ActionToken::Amend => {
                let level = PriceLevel {
                    price: self.price.ok_or_else(|| missing("price"))?,
                    amount: self.amount.ok_or_else(|| missing("amount"))?,
                    id: self.id,
                };
                if action == ActionToken::Insert {
                    UpdateAction::Insert(level)
                } else {
                    UpdateAction::Amend(level)
                }
            }
        };

        Ok(LevelChange::new(side, action))
    }
}

impl TryFrom<WireMessage> for DepthUpdate {
    type Error = FeedError;

    fn try_from(msg: WireMessage) -> std::result::Result<Self, Self::Error> {
        let key = DepthKey::parse(&msg.exchange, &msg.pair, &msg.asset)?;

        let payload = match msg.kind {
            WireKind::Snapshot => UpdatePayload::Snapshot {
                bids: msg.bids.into_iter().map(PriceLevel::from).collect(),
                asks: msg.asks.into_iter().map(PriceLevel::from).collect(),
            },
            WireKind::Update => UpdatePayload::Delta(
                msg.changes
                    .into_iter()
                    .map(WireChange::decode)
                    .collect::<std::result::Result<Changes, _>>()?,
            ),
        };

        Ok(DepthUpdate {
            key,
            update_id: msg.update_id,
            payload,
            checksum: msg.checksum,
        })
    }
}

/// Decode one feed line.
pub fn parse_line(line: &str) -> std::result::Result<DepthUpdate, FeedError> {
    let msg: WireMessage = serde_json::from_str(line)?;
    DepthUpdate::try_from(msg)
}

/// Tally of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Non-blank lines read.
    pub lines: usize,
    /// Deltas applied to live books.
    pub applied: usize,
    /// Deltas buffered before a snapshot.
    pub buffered: usize,
    /// Deltas discarded while resyncing.
    pub discarded: usize,
    /// Snapshots that synced a book.
    pub synced: usize,
    /// Messages that sent a book into resync.
    pub resyncs: usize,
    /// Lines that failed to decode or were refused.
    pub rejected: usize,
}

impl ReplaySummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Applied => self.applied += 1,
            ProcessOutcome::Buffered => self.buffered += 1,
            ProcessOutcome::Discarded => self.discarded += 1,
            ProcessOutcome::Synced { .. } => self.synced += 1,
            ProcessOutcome::ResyncRequired(_) => self.resyncs += 1,
        }
    }
}

/// Feed every line of `reader` into `registry`.
///
/// With `strict`, the first bad line aborts the replay; otherwise it is
/// logged and counted.
pub async fn replay<R>(registry: &Registry, reader: R, strict: bool) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let result = parse_line(&line)
            .and_then(|update| registry.process(update).map_err(FeedError::from));

        match result {
            Ok(outcome) => summary.record(&outcome),
            Err(source) if strict => {
                return Err(AppError::Feed {
                    line: line_no,
                    source,
                })
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "rejected feed line");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

/// Replay a JSON-lines file into `registry`.
pub async fn replay_file(
    registry: &Registry,
    path: impl AsRef<Path>,
    strict: bool,
) -> Result<ReplaySummary> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let summary = replay(registry, BufReader::new(file), strict).await?;

    info!(
        path = %path.display(),
        lines = summary.lines,
        synced = summary.synced,
        resyncs = summary.resyncs,
        rejected = summary.rejected,
        "replay complete"
    );
    Ok(summary)
}
