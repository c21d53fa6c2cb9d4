//! Per-pair bot supervisor.
//!
//! One supervisor task per (symbol, venue A, venue B) triple. The task
//! owns its execution manager, statistics, book cache and log ring
//! exclusively; control commands (hot reloads, pause, stop, snapshot
//! requests) arrive over a bounded channel and are applied between
//! ticks, so no component on the tick path needs a lock.
//!
//! The entry direction is fixed per bot: buy on venue A, sell on venue
//! B. Exit unwinds the other way.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use arb_common::{Order, Orderbook, Side};
use arb_exchange::{AdapterError, ExchangeAdapter};

use crate::analyzer::SpreadAnalyzer;
use crate::config::BotConfig;
use crate::execution::{
    EntryConfig, ExecutionManager, ExecutionMode, ExitConfig, SliceResult,
};
use crate::snapshot::{BookView, BotSnapshot, Observer};
use crate::stats::BotStats;

/// Book depth requested from the venues.
const BOOK_DEPTH: usize = 10;

/// Retained log lines per bot.
const LOG_RING_CAPACITY: usize = 100;

/// Backoff before a push reconnect attempt.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Consecutive reconnect failures before demoting to polling.
const MAX_RECONNECT_FAILURES: u32 = 3;

/// Push updates between periodic status log lines.
const PUSH_STATUS_EVERY: u64 = 100;

/// Control messages accepted by a running bot.
#[derive(Debug)]
pub enum BotCommand {
    /// Hot-reload entry parameters; rejected configs keep the old ones.
    UpdateEntryConfig(EntryConfig),
    /// Hot-reload exit parameters.
    UpdateExitConfig(ExitConfig),
    /// Switch to unwinding a position.
    StartExit {
        position_size: Decimal,
        config: ExitConfig,
    },
    Pause,
    Resume,
    /// Request a point-in-time snapshot.
    Snapshot(oneshot::Sender<BotSnapshot>),
    Stop,
}

/// Handle to a spawned bot task.
pub struct BotHandle {
    pub id: String,
    pub symbol: String,
    pub exchange_a: String,
    pub exchange_b: String,
    control: mpsc::Sender<BotCommand>,
    task: JoinHandle<()>,
}

impl BotHandle {
    /// Send a command; false when the bot already exited.
    pub async fn send(&self, command: BotCommand) -> bool {
        self.control.send(command).await.is_ok()
    }

    /// Fetch a snapshot from the running bot.
    pub async fn snapshot(&self) -> Option<BotSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self.control.send(BotCommand::Snapshot(tx)).await.is_err() {
            return None;
        }
        rx.await.ok()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the bot and wait for its task to finish.
    pub async fn stop(self) {
        let _ = self.control.send(BotCommand::Stop).await;
        let _ = self.task.await;
    }
}

/// The per-bot driving task.
pub struct BotSupervisor {
    config: BotConfig,
    adapter_a: Arc<dyn ExchangeAdapter>,
    adapter_b: Arc<dyn ExchangeAdapter>,
    analyzer: SpreadAnalyzer,
    manager: ExecutionManager,
    stats: BotStats,
    book_a: Option<Orderbook>,
    book_b: Option<Orderbook>,
    logs: VecDeque<String>,
    observer: Option<Observer>,
    dry_run: bool,
    push_mode: bool,
    running: bool,
}

impl BotSupervisor {
    /// Spawn the bot task and return its handle. The entry episode is
    /// armed immediately from the bot's configured parameters.
    pub fn spawn(
        config: BotConfig,
        adapter_a: Arc<dyn ExchangeAdapter>,
        adapter_b: Arc<dyn ExchangeAdapter>,
        observer: Option<Observer>,
    ) -> BotHandle {
        let (control_tx, control_rx) = mpsc::channel(32);
        let analyzer = SpreadAnalyzer::new(config.target_amount, config.fee_bps);
        let manager = ExecutionManager::new(analyzer.clone());

        let handle_meta = (
            config.id.clone(),
            config.symbol.clone(),
            config.exchange_a.clone(),
            config.exchange_b.clone(),
        );

        let dry_run = config.dry_run;
        let supervisor = Self {
            config,
            adapter_a,
            adapter_b,
            analyzer,
            manager,
            stats: BotStats::default(),
            book_a: None,
            book_b: None,
            logs: VecDeque::with_capacity(LOG_RING_CAPACITY),
            observer,
            dry_run,
            push_mode: false,
            running: true,
        };

        let task = tokio::spawn(supervisor.run(control_rx));
        BotHandle {
            id: handle_meta.0,
            symbol: handle_meta.1,
            exchange_a: handle_meta.2,
            exchange_b: handle_meta.3,
            control: control_tx,
            task,
        }
    }

    async fn run(mut self, mut control: mpsc::Receiver<BotCommand>) {
        self.stats.start_time_ms = Utc::now().timestamp_millis();
        if let Err(e) = self.manager.start_entry(self.config.entry_config()) {
            error!(bot = %self.config.id, error = %e, "entry config rejected at start");
            return;
        }

        let mode = if self.config.use_push_feed { "push" } else { "poll" };
        self.log(format!("started ({mode} mode, dry_run={})", self.dry_run));

        if !self.dry_run {
            self.check_balances().await;
        }

        if self.config.use_push_feed {
            self.run_push(&mut control).await;
        } else {
            self.run_polling(&mut control).await;
        }

        self.running = false;
        self.log("stopped".to_string());
        self.publish_snapshot();
    }

    /// Probe both venue balances before live trading. Missing
    /// credentials demote to dry-run here instead of on the first slice.
    async fn check_balances(&mut self) {
        let (balance_a, balance_b) = tokio::join!(
            self.adapter_a.get_balance(),
            self.adapter_b.get_balance(),
        );
        for result in [balance_a, balance_b] {
            match result {
                Ok(balance) => {
                    self.log(format!(
                        "{} balance: {} {} available",
                        balance.exchange_id, balance.available, balance.currency
                    ));
                }
                Err(e) => {
                    self.maybe_demote_to_dry_run(&e);
                    warn!(bot = %self.config.id, error = %e, "balance check failed");
                }
            }
        }
    }

    /// REST polling driver. A slow tick pushes the next one out instead
    /// of queueing.
    async fn run_polling(&mut self, control: &mut mpsc::Receiver<BotCommand>) {
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                command = control.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.running = false,
                },
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// One polling iteration: fetch both books in parallel, analyze,
    /// tick the execution manager.
    async fn poll_once(&mut self) {
        self.stats.polls += 1;
        let symbol = self.config.symbol.clone();

        let (result_a, result_b) = tokio::join!(
            self.adapter_a.get_orderbook(&symbol, BOOK_DEPTH),
            self.adapter_b.get_orderbook(&symbol, BOOK_DEPTH),
        );

        let (book_a, book_b) = match (result_a, result_b) {
            (Ok(a), Ok(b)) => (a, b),
            (a, b) => {
                for err in [a.err(), b.err()].into_iter().flatten() {
                    debug!(bot = %self.config.id, error = %err, "book fetch failed");
                }
                self.stats.errors += 1;
                return;
            }
        };

        // Reporting convention: composite latency is the sum of both
        // fetches even though they ran in parallel.
        self.stats.record_latency(book_a.latency_ms + book_b.latency_ms);
        self.book_a = Some(book_a);
        self.book_b = Some(book_b);

        self.evaluate_and_execute().await;
        self.publish_snapshot();
    }

    /// Push driver: consume both feeds, re-analyze whenever either half
    /// refreshes, keep the feeds alive, and demote to polling after
    /// three consecutive reconnect failures.
    async fn run_push(&mut self, control: &mut mpsc::Receiver<BotCommand>) {
        let symbol = self.config.symbol.clone();

        let subscribed = tokio::join!(
            self.adapter_a.subscribe_orderbook(&symbol),
            self.adapter_b.subscribe_orderbook(&symbol),
        );
        let (mut rx_a, mut rx_b) = match subscribed {
            (Ok(a), Ok(b)) => (a, b),
            (a, b) => {
                for err in [a.err(), b.err()].into_iter().flatten() {
                    warn!(bot = %self.config.id, error = %err, "push subscribe failed");
                }
                self.log("push feed unavailable, falling back to polling".to_string());
                return self.run_polling(control).await;
            }
        };

        self.push_mode = true;
        let mut reconnect_failures = 0u32;
        let mut keepalive = interval(Duration::from_secs(1));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                command = control.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.running = false,
                },
                update = rx_a.recv() => match update {
                    Some(book) => self.on_push_update(book).await,
                    None => {
                        match self.reconnect(&symbol, true).await {
                            Some(rx) => { rx_a = rx; reconnect_failures = 0; }
                            None => reconnect_failures += 1,
                        }
                        if reconnect_failures >= MAX_RECONNECT_FAILURES {
                            self.demote_to_polling(&symbol).await;
                            return self.run_polling(control).await;
                        }
                    }
                },
                update = rx_b.recv() => match update {
                    Some(book) => self.on_push_update(book).await,
                    None => {
                        match self.reconnect(&symbol, false).await {
                            Some(rx) => { rx_b = rx; reconnect_failures = 0; }
                            None => reconnect_failures += 1,
                        }
                        if reconnect_failures >= MAX_RECONNECT_FAILURES {
                            self.demote_to_polling(&symbol).await;
                            return self.run_polling(control).await;
                        }
                    }
                },
                _ = keepalive.tick() => {
                    // A feed whose connected flag dropped without closing
                    // the channel is caught here on the next tick.
                    if !self.adapter_a.is_push_connected()
                        || !self.adapter_b.is_push_connected()
                    {
                        debug!(bot = %self.config.id, "push health check failed");
                    }
                }
            }
        }

        self.adapter_a.unsubscribe_orderbook(&symbol).await;
        self.adapter_b.unsubscribe_orderbook(&symbol).await;
        self.push_mode = false;
    }

    /// Single backed-off reconnect attempt for one side's feed.
    async fn reconnect(
        &mut self,
        symbol: &str,
        side_a: bool,
    ) -> Option<arb_exchange::BookReceiver> {
        let venue = if side_a {
            self.config.exchange_a.clone()
        } else {
            self.config.exchange_b.clone()
        };
        self.log(format!("push feed {venue} disconnected, reconnecting"));
        tokio::time::sleep(RECONNECT_BACKOFF).await;

        let adapter = if side_a {
            self.adapter_a.clone()
        } else {
            self.adapter_b.clone()
        };
        match adapter.subscribe_orderbook(symbol).await {
            Ok(rx) => {
                self.log(format!("push feed {venue} reconnected"));
                Some(rx)
            }
            Err(e) => {
                warn!(bot = %self.config.id, %venue, error = %e, "push reconnect failed");
                None
            }
        }
    }

    async fn demote_to_polling(&mut self, symbol: &str) {
        self.log("push feed unstable, demoting to polling for this session".to_string());
        self.adapter_a.unsubscribe_orderbook(symbol).await;
        self.adapter_b.unsubscribe_orderbook(symbol).await;
        self.push_mode = false;
    }

    async fn on_push_update(&mut self, book: Orderbook) {
        self.stats.push_updates += 1;
        self.stats.record_latency(book.latency_ms);

        if book.exchange_id == self.config.exchange_a {
            self.book_a = Some(book);
        } else if book.exchange_id == self.config.exchange_b {
            self.book_b = Some(book);
        } else {
            return;
        }

        if self.book_a.is_some() && self.book_b.is_some() {
            self.evaluate_and_execute().await;
        }

        if self.stats.push_updates % PUSH_STATUS_EVERY == 0 {
            let snap = self.stats.snapshot(Utc::now().timestamp_millis());
            self.log(format!(
                "[{}s] {} push updates, avg latency {:.1}ms",
                snap.runtime_secs, snap.push_updates, snap.avg_latency_ms
            ));
        }
        self.publish_snapshot();
    }

    /// Shared analysis + execution tick. Requires both book halves.
    async fn evaluate_and_execute(&mut self) {
        let (Some(book_a), Some(book_b)) = (self.book_a.clone(), self.book_b.clone()) else {
            return;
        };

        let now_ms = Utc::now().timestamp_millis();
        let stale_ms = self.config.stale_book_ms();
        if book_a.is_stale(stale_ms, now_ms) || book_b.is_stale(stale_ms, now_ms) {
            // Stale data is a no-opportunity condition, not an error.
            debug!(bot = %self.config.id, "book stale, skipping tick");
            return;
        }

        if let Some(opp) = self
            .analyzer
            .find_best_opportunity(&book_a, &book_b, Some(self.config.target_amount))
        {
            self.stats.record_spread(opp.spread_pct);
            let profitable = opp.net_spread_pct >= self.config.entry_start_pct;
            if profitable {
                self.stats.profitable_opportunities += 1;
                self.log(format!(
                    "{:.3}% ({} -> {}) net {:.3}% conf {:.2}",
                    opp.spread_pct,
                    opp.buy_exchange,
                    opp.sell_exchange,
                    opp.net_spread_pct,
                    opp.confidence
                ));
            }
            self.stats.record_opportunity(opp);
        }

        // The manager's armed direction is buy-on-A / sell-on-B, so it
        // is fed that direction's spread regardless of which direction
        // scored better above.
        let buy_price = book_a.best_ask();
        let sell_price = book_b.best_bid();
        if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO {
            return;
        }
        let spread = ((sell_price - buy_price) / buy_price) * Decimal::ONE_HUNDRED;

        let slice = self.manager.update(spread, &book_a, &book_b);
        if let Some(slice) = slice {
            if slice.should_execute && slice.size > Decimal::ZERO {
                self.execute_slice(slice).await;
            } else if !slice.should_execute {
                debug!(bot = %self.config.id, reason = %slice.reason, "slice skipped");
            }
        }
    }

    /// Fire both legs of a slice and record the outcome.
    async fn execute_slice(&mut self, slice: SliceResult) {
        let size = slice.size;
        let symbol = self.config.symbol.clone();
        let (side_a, side_b) = match self.manager.mode() {
            ExecutionMode::Entry => (Side::Buy, Side::Sell),
            ExecutionMode::Exit => (Side::Sell, Side::Buy),
            ExecutionMode::Idle => return,
        };

        if self.dry_run {
            self.stats.trades += 1;
            self.manager.record_execution(size, true);
            self.log(format!(
                "[DRY] {side_a} {size} on {} / {side_b} on {} (A:{}, B:{})",
                self.config.exchange_a, self.config.exchange_b, slice.safe_qty_a, slice.safe_qty_b
            ));
            return;
        }

        // Marketable IOC on both legs: price 0 lets the adapter bound
        // the fill at best-opposite +/- 5%.
        let (result_a, result_b) = tokio::join!(
            self.adapter_a
                .place_order(&symbol, side_a, size, Decimal::ZERO),
            self.adapter_b
                .place_order(&symbol, side_b, size, Decimal::ZERO),
        );

        match (result_a, result_b) {
            (Ok(order_a), Ok(order_b)) => {
                self.stats.trades += 1;
                self.manager.record_execution(size, true);
                self.log(format!(
                    "executed {size} ({} {} / {} {})",
                    order_a.exchange_id, order_a.id, order_b.exchange_id, order_b.id
                ));
            }
            (Ok(filled), Err(e)) => {
                self.handle_one_leg_failure(filled, true, e).await;
            }
            (Err(e), Ok(filled)) => {
                self.handle_one_leg_failure(filled, false, e).await;
            }
            (Err(ea), Err(eb)) => {
                self.stats.errors += 1;
                self.manager.record_execution(Decimal::ZERO, false);
                self.maybe_demote_to_dry_run(&ea);
                self.maybe_demote_to_dry_run(&eb);
                self.log(format!("both legs failed: {ea}; {eb}"));
            }
        }
    }

    /// One leg filled, the other failed: unwind the filled leg. A failed
    /// cancel leaves an unhedged position, which pauses the bot for a
    /// human.
    async fn handle_one_leg_failure(
        &mut self,
        filled: Order,
        filled_on_a: bool,
        failure: AdapterError,
    ) {
        self.stats.errors += 1;
        self.manager.record_execution(Decimal::ZERO, false);
        self.maybe_demote_to_dry_run(&failure);

        let filled_adapter = if filled_on_a {
            self.adapter_a.clone()
        } else {
            self.adapter_b.clone()
        };
        let venue = filled.exchange_id.clone();
        self.log(format!(
            "leg failed ({failure}), cancelling filled leg {} on {venue}",
            filled.id
        ));

        match filled_adapter.cancel_order(&filled.id).await {
            Ok(_) => {
                warn!(bot = %self.config.id, order = %filled.id, %venue, "filled leg cancelled after pair failure");
            }
            Err(cancel_err) => {
                self.manager.pause();
                error!(
                    bot = %self.config.id,
                    order = %filled.id,
                    %venue,
                    error = %cancel_err,
                    "CRITICAL: cancel failed after one-leg fill, bot paused, manual intervention required"
                );
                self.log(format!(
                    "CRITICAL: unhedged leg {} on {venue}, bot paused",
                    filled.id
                ));
            }
        }
    }

    /// Missing credentials are permanent for the session: force dry-run
    /// and keep evaluating instead of failing every submission.
    fn maybe_demote_to_dry_run(&mut self, err: &AdapterError) {
        if err.is_not_configured() && !self.dry_run {
            self.dry_run = true;
            self.log("credentials missing, forcing dry-run".to_string());
        }
    }

    fn handle_command(&mut self, command: BotCommand) {
        match command {
            BotCommand::UpdateEntryConfig(config) => {
                match self.manager.update_entry_config(config) {
                    Ok(()) => self.log("entry config updated".to_string()),
                    Err(e) => self.log(format!("entry config rejected: {e}")),
                }
                self.publish_snapshot();
            }
            BotCommand::UpdateExitConfig(config) => {
                match self.manager.update_exit_config(config) {
                    Ok(()) => self.log("exit config updated".to_string()),
                    Err(e) => self.log(format!("exit config rejected: {e}")),
                }
                self.publish_snapshot();
            }
            BotCommand::StartExit {
                position_size,
                config,
            } => {
                match self.manager.start_exit(position_size, config) {
                    Ok(()) => self.log(format!("exit started for {position_size}")),
                    Err(e) => self.log(format!("exit rejected: {e}")),
                }
                self.publish_snapshot();
            }
            BotCommand::Pause => {
                self.manager.pause();
                self.log("paused".to_string());
                self.publish_snapshot();
            }
            BotCommand::Resume => {
                self.manager.resume();
                self.log("resumed".to_string());
                self.publish_snapshot();
            }
            BotCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            BotCommand::Stop => {
                self.running = false;
            }
        }
    }

    fn snapshot(&self) -> BotSnapshot {
        let now_ms = Utc::now().timestamp_millis();
        BotSnapshot {
            id: self.config.id.clone(),
            symbol: self.config.symbol.clone(),
            exchange_a: self.config.exchange_a.clone(),
            exchange_b: self.config.exchange_b.clone(),
            running: self.running,
            push_mode: self.push_mode,
            dry_run: self.dry_run,
            stats: self.stats.snapshot(now_ms),
            latency_a: self.adapter_a.latency(),
            latency_b: self.adapter_b.latency(),
            opportunity: self.stats.last_opportunity().cloned(),
            orderbook_a: self.book_a.as_ref().map(BookView::from_book),
            orderbook_b: self.book_b.as_ref().map(BookView::from_book),
            execution: self.manager.get_status(),
            logs: BotSnapshot::trim_logs(self.logs.iter().cloned()),
        }
    }

    fn publish_snapshot(&self) {
        if let Some(observer) = &self.observer {
            observer.publish(self.snapshot());
        }
    }

    fn log(&mut self, message: String) {
        let now = Utc::now();
        let line = format!(
            "[{}] [{}] {message}",
            now.format("%H:%M:%S%.3f"),
            self.config.symbol
        );
        info!(bot = %self.config.id, "{message}");
        if self.logs.len() == LOG_RING_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }
}
