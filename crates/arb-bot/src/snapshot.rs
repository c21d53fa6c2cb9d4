//! Observer boundary: serializable bot snapshots over a bounded channel.
//!
//! The supervisor publishes a full snapshot on every non-trivial state
//! transition. Publishing is fire-and-forget: `try_send` into a bounded
//! queue, dropping on overflow so a slow dashboard can never stall a
//! trading tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use arb_common::{LatencySummary, Orderbook};

use crate::analyzer::SpreadOpportunity;
use crate::execution::ExecutionStatus;
use crate::stats::BotStatsSnapshot;

/// Default snapshot queue capacity.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// Book levels included in a snapshot.
const SNAPSHOT_BOOK_DEPTH: usize = 10;

/// Log lines included in a snapshot.
const SNAPSHOT_LOG_LINES: usize = 30;

/// One price level as exposed to dashboards.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LevelView {
    pub price: Decimal,
    pub size: Decimal,
}

/// Dashboard view of one order book (top levels only).
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    pub exchange_id: String,
    pub symbol: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid_price: Decimal,
    pub spread_bps: Decimal,
    pub imbalance: Decimal,
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,
    pub latency_ms: f64,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
    pub timestamp_ms: i64,
}

impl BookView {
    pub fn from_book(book: &Orderbook) -> Self {
        let (bids, asks) = book.top_levels(SNAPSHOT_BOOK_DEPTH);
        Self {
            exchange_id: book.exchange_id.clone(),
            symbol: book.symbol.clone(),
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            mid_price: book.mid_price(),
            spread_bps: book.spread_bps(),
            imbalance: book.imbalance(),
            bid_depth: book.bid_depth(),
            ask_depth: book.ask_depth(),
            latency_ms: book.latency_ms,
            bids: bids
                .into_iter()
                .map(|l| LevelView {
                    price: l.price,
                    size: l.size,
                })
                .collect(),
            asks: asks
                .into_iter()
                .map(|l| LevelView {
                    price: l.price,
                    size: l.size,
                })
                .collect(),
            timestamp_ms: book.timestamp_ms,
        }
    }
}

/// Everything a dashboard needs about one bot, as plain values.
#[derive(Debug, Clone, Serialize)]
pub struct BotSnapshot {
    pub id: String,
    pub symbol: String,
    pub exchange_a: String,
    pub exchange_b: String,
    pub running: bool,
    pub push_mode: bool,
    pub dry_run: bool,
    pub stats: BotStatsSnapshot,
    pub latency_a: LatencySummary,
    pub latency_b: LatencySummary,
    pub opportunity: Option<SpreadOpportunity>,
    pub orderbook_a: Option<BookView>,
    pub orderbook_b: Option<BookView>,
    pub execution: ExecutionStatus,
    /// Most recent log lines, oldest first, capped at 30.
    pub logs: Vec<String>,
}

impl BotSnapshot {
    /// Trim a log ring to the lines a snapshot carries.
    pub fn trim_logs(lines: impl DoubleEndedIterator<Item = String>) -> Vec<String> {
        let mut tail: Vec<String> = lines.rev().take(SNAPSHOT_LOG_LINES).collect();
        tail.reverse();
        tail
    }
}

/// Receiving side of the observer queue.
pub type ObserverReceiver = mpsc::Receiver<BotSnapshot>;

/// Publishing side handed to each supervisor.
#[derive(Clone)]
pub struct Observer {
    tx: mpsc::Sender<BotSnapshot>,
    dropped: Arc<AtomicU64>,
}

impl Observer {
    /// Create an observer pair with the given queue capacity.
    pub fn channel(capacity: usize) -> (Self, ObserverReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Publish without blocking. Overflow drops the update.
    pub fn publish(&self, snapshot: BotSnapshot) {
        if self.tx.try_send(snapshot).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % 100 == 1 {
                debug!(dropped, "observer queue full, dropping snapshots");
            }
        }
    }

    /// Updates dropped so far due to backpressure.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
