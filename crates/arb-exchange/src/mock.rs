//! Scripted in-memory adapter for tests and dry-run demos.
//!
//! Snapshots are queued with [`MockAdapter::push_book`]; each fetch pops
//! the next one and the last snapshot repeats once the script drains.
//! Failure injection covers the error taxonomy the supervisor handles:
//! transient fetch errors, order rejections and missing credentials.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use arb_common::{
    Balance, LatencyStats, LatencySummary, Order, OrderStatus, Orderbook, Side,
};

use crate::adapter::{AdapterError, BookReceiver, ExchangeAdapter};

/// Scripted venue adapter.
pub struct MockAdapter {
    id: String,
    script: Mutex<VecDeque<Orderbook>>,
    last_book: Mutex<Option<Orderbook>>,
    latency: Mutex<LatencyStats>,
    placed: Mutex<Vec<Order>>,
    cancelled: Mutex<Vec<String>>,
    order_seq: AtomicU64,
    fail_next_fetch: AtomicBool,
    fail_next_order: AtomicBool,
    configured: bool,
    push_supported: bool,
    push_tx: Mutex<Option<mpsc::Sender<Orderbook>>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl MockAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            last_book: Mutex::new(None),
            latency: Mutex::new(LatencyStats::new()),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            order_seq: AtomicU64::new(0),
            fail_next_fetch: AtomicBool::new(false),
            fail_next_order: AtomicBool::new(false),
            configured: true,
            push_supported: false,
            push_tx: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Adapter that advertises a push feed.
    pub fn with_push(mut self) -> Self {
        self.push_supported = true;
        self
    }

    /// Adapter with no trading credentials: orders fail with
    /// `NotConfigured` so the supervisor demotes the bot to dry-run.
    pub fn without_credentials(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Queue the next snapshot.
    pub fn push_book(&self, book: Orderbook) {
        self.script.lock().push_back(book);
    }

    /// Deliver a book over the push feed, if subscribed.
    pub fn push_update(&self, book: Orderbook) -> bool {
        match self.push_tx.lock().as_ref() {
            Some(tx) => tx.try_send(book).is_ok(),
            None => false,
        }
    }

    /// Simulate a feed drop: push channel closes, connected flips false.
    pub fn drop_push_feed(&self) {
        *self.push_tx.lock() = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_order(&self) {
        self.fail_next_order.store(true, Ordering::SeqCst);
    }

    /// Orders accepted so far.
    pub fn placed_orders(&self) -> Vec<Order> {
        self.placed.lock().clone()
    }

    /// Order ids cancelled so far.
    pub fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ExchangeAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_orderbook(&self, symbol: &str, _depth: usize) -> Result<Orderbook, AdapterError> {
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(AdapterError::Transport("injected fetch failure".into()));
        }

        let next = self.script.lock().pop_front();
        let mut book = match next {
            Some(book) => {
                *self.last_book.lock() = Some(book.clone());
                book
            }
            None => self
                .last_book
                .lock()
                .clone()
                .ok_or_else(|| AdapterError::UnknownSymbol(symbol.to_string()))?,
        };
        // Snapshots are served fresh, like a live REST endpoint.
        book.timestamp_ms = Utc::now().timestamp_millis();
        self.latency.lock().record(1.0);
        Ok(book)
    }

    async fn subscribe_orderbook(&self, _symbol: &str) -> Result<BookReceiver, AdapterError> {
        if !self.push_supported {
            return Err(AdapterError::PushUnsupported);
        }
        let (tx, rx) = mpsc::channel(64);
        *self.push_tx.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn unsubscribe_orderbook(&self, _symbol: &str) {
        *self.push_tx.lock() = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_push_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_balance(&self) -> Result<Balance, AdapterError> {
        if !self.configured {
            return Err(AdapterError::NotConfigured(self.id.clone()));
        }
        Ok(Balance {
            exchange_id: self.id.clone(),
            currency: "USDC".into(),
            total: Decimal::new(100_000, 0),
            available: Decimal::new(100_000, 0),
        })
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<Order, AdapterError> {
        if !self.configured {
            return Err(AdapterError::NotConfigured(self.id.clone()));
        }
        if self.fail_next_order.swap(false, Ordering::SeqCst) {
            return Err(AdapterError::OrderRejected("injected order failure".into()));
        }

        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
        let order = Order {
            id: format!("{}-{}", self.id, seq),
            exchange_id: self.id.clone(),
            symbol: symbol.to_string(),
            side,
            size,
            price,
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
        };
        self.placed.lock().push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, AdapterError> {
        self.cancelled.lock().push(order_id.to_string());
        Ok(true)
    }

    fn latency(&self) -> LatencySummary {
        self.latency.lock().summary()
    }

    async fn close(&self) {
        *self.push_tx.lock() = None;
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}
