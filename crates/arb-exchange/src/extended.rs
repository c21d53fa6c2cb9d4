//! Extended venue adapter (REST polling + WebSocket push).
//!
//! The depth endpoint serves full ladders; when it fails or comes back
//! empty the adapter degrades to a best-bid/ask-only snapshot from the
//! markets endpoint so a bot can keep evaluating the touch. The push
//! feed runs one WebSocket connection per subscribed symbol with a
//! reader task that forwards parsed books into a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use arb_common::{
    Balance, LatencyStats, LatencySummary, Order, OrderStatus, Orderbook, PriceLevel, Side,
};

use crate::adapter::{protective_price, AdapterError, BookReceiver, ExchangeAdapter};
use crate::paradex::parse_wire_level;
use crate::registry::VenueCredentials;

const BASE_URL: &str = "https://api.starknet.extended.exchange/api/v1";
const WS_URL: &str = "wss://api.starknet.extended.exchange/ws/v1";

/// Push channel capacity per subscription.
const BOOK_CHANNEL_CAPACITY: usize = 64;

/// WebSocket ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    data: Vec<MarketInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    market_stats: Option<MarketStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStats {
    #[serde(default)]
    bid_price: Option<String>,
    #[serde(default)]
    ask_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    #[serde(default)]
    data: OrderbookData,
}

#[derive(Debug, Default, Deserialize)]
struct OrderbookData {
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct WsBookMessage {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    market: String,
    #[serde(default)]
    data: OrderbookData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    #[serde(default)]
    data: Option<BalanceData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceData {
    #[serde(default)]
    balance: Option<String>,
    #[serde(default)]
    available_for_trade: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

struct Subscription {
    shutdown: watch::Sender<bool>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Extended REST + push adapter.
pub struct ExtendedAdapter {
    http: reqwest::Client,
    credentials: VenueCredentials,
    latency: Mutex<LatencyStats>,
    subscriptions: DashMap<String, Subscription>,
}

impl ExtendedAdapter {
    pub fn new(credentials: VenueCredentials) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .expect("static reqwest client config");
        Self {
            http,
            credentials,
            latency: Mutex::new(LatencyStats::new()),
            subscriptions: DashMap::new(),
        }
    }

    /// ETH-USD -> ETH_USD.
    fn market_name(symbol: &str) -> String {
        symbol.replace('-', "_")
    }

    fn api_key(&self) -> Result<&str, AdapterError> {
        self.credentials
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::NotConfigured("extended".into()))
    }

    fn record_latency(&self, started: Instant) -> f64 {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.latency.lock().record(latency_ms);
        latency_ms
    }

    fn build_book(symbol: &str, data: &OrderbookData, depth: usize, latency_ms: f64) -> Orderbook {
        let mut book = Orderbook::new("extended", symbol);
        for raw in data.bids.iter().take(depth) {
            if let Some((price, size)) = parse_wire_level(raw) {
                if price > Decimal::ZERO && size > Decimal::ZERO {
                    book.bids.push(PriceLevel::new(price, size));
                }
            }
        }
        for raw in data.asks.iter().take(depth) {
            if let Some((price, size)) = parse_wire_level(raw) {
                if price > Decimal::ZERO && size > Decimal::ZERO {
                    book.asks.push(PriceLevel::new(price, size));
                }
            }
        }
        book.sort_levels();
        book.timestamp_ms = Utc::now().timestamp_millis();
        book.latency_ms = latency_ms;
        book
    }

    /// Degraded snapshot carrying only the touch, from the markets
    /// endpoint. Sizes are zero, which the book model permits for
    /// BBO-fallback snapshots.
    async fn bbo_fallback(&self, symbol: &str, latency_ms: f64) -> Result<Orderbook, AdapterError> {
        let market = Self::market_name(symbol);
        let resp = self
            .http
            .get(format!("{BASE_URL}/info/markets?market={market}"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status(resp.status().as_u16()));
        }
        let payload: MarketsResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let stats = payload
            .data
            .iter()
            .find(|m| m.name == market)
            .and_then(|m| m.market_stats.as_ref())
            .ok_or_else(|| AdapterError::UnknownSymbol(market.clone()))?;

        let mut book = Orderbook::new("extended", symbol);
        if let Some(bid) = stats.bid_price.as_ref().and_then(|s| s.parse().ok()) {
            book.bids.push(PriceLevel::new(bid, Decimal::ZERO));
        }
        if let Some(ask) = stats.ask_price.as_ref().and_then(|s| s.parse().ok()) {
            book.asks.push(PriceLevel::new(ask, Decimal::ZERO));
        }
        book.timestamp_ms = Utc::now().timestamp_millis();
        book.latency_ms = latency_ms;
        debug!(%symbol, "extended depth unavailable, served BBO fallback");
        Ok(book)
    }
}

#[async_trait::async_trait]
impl ExchangeAdapter for ExtendedAdapter {
    fn id(&self) -> &str {
        "extended"
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/info/markets"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status(resp.status().as_u16()));
        }
        let payload: MarketsResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;
        debug!(markets = payload.data.len(), "extended markets reachable");
        Ok(())
    }

    async fn get_orderbook(&self, symbol: &str, depth: usize) -> Result<Orderbook, AdapterError> {
        let market = Self::market_name(symbol);
        let started = Instant::now();
        let resp = self
            .http
            .get(format!(
                "{BASE_URL}/info/markets/orderbook?market={market}&depth={depth}"
            ))
            .send()
            .await?;
        let latency_ms = self.record_latency(started);

        if !resp.status().is_success() {
            return self.bbo_fallback(symbol, latency_ms).await;
        }
        let payload: OrderbookResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let book = Self::build_book(symbol, &payload.data, depth, latency_ms);
        if !book.has_both_sides() {
            return self.bbo_fallback(symbol, latency_ms).await;
        }
        Ok(book)
    }

    async fn subscribe_orderbook(&self, symbol: &str) -> Result<BookReceiver, AdapterError> {
        // Replace any previous subscription for this symbol.
        self.unsubscribe_orderbook(symbol).await;

        let market = Self::market_name(symbol);
        let (ws, _) = connect_async(WS_URL)
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let subscribe_msg = serde_json::json!({
            "type": "subscribe",
            "channel": "orderbook",
            "market": market,
        });
        sink.send(Message::Text(subscribe_msg.to_string()))
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(BOOK_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(true));

        let task_connected = connected.clone();
        let task_symbol = symbol.to_string();
        let task = tokio::spawn(async move {
            let mut ping = interval(PING_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ping.tick() => {
                        if sink.send(Message::Ping(Vec::new())).await.is_err() {
                            warn!(symbol = %task_symbol, "extended push ping failed");
                            break;
                        }
                    }
                    msg = stream.next() => {
                        let Some(msg) = msg else { break };
                        match msg {
                            Ok(Message::Text(text)) => {
                                let received = Instant::now();
                                let Ok(update) = serde_json::from_str::<WsBookMessage>(&text) else {
                                    continue;
                                };
                                if update.channel != "orderbook" {
                                    continue;
                                }
                                let symbol = if update.market.is_empty() {
                                    task_symbol.clone()
                                } else {
                                    update.market.replace('_', "-")
                                };
                                let latency_ms =
                                    received.elapsed().as_secs_f64() * 1000.0;
                                let book = ExtendedAdapter::build_book(
                                    &symbol, &update.data, usize::MAX, latency_ms,
                                );
                                if tx.send(book).await.is_err() {
                                    // Receiver dropped: subscription abandoned.
                                    break;
                                }
                            }
                            Ok(Message::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                }
            }
            task_connected.store(false, Ordering::SeqCst);
        });

        info!(%symbol, "extended push subscription opened");
        self.subscriptions.insert(
            symbol.to_string(),
            Subscription {
                shutdown: shutdown_tx,
                connected,
                task,
            },
        );
        Ok(rx)
    }

    async fn unsubscribe_orderbook(&self, symbol: &str) {
        if let Some((_, sub)) = self.subscriptions.remove(symbol) {
            let _ = sub.shutdown.send(true);
            let _ = sub.task.await;
            debug!(%symbol, "extended push subscription closed");
        }
    }

    fn is_push_connected(&self) -> bool {
        !self.subscriptions.is_empty()
            && self
                .subscriptions
                .iter()
                .all(|sub| sub.connected.load(Ordering::SeqCst))
    }

    async fn get_balance(&self) -> Result<Balance, AdapterError> {
        let key = self.api_key()?.to_string();
        let resp = self
            .http
            .get(format!("{BASE_URL}/user/balance"))
            .header("X-Api-Key", key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status(resp.status().as_u16()));
        }
        let payload: BalanceResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;
        let data = payload
            .data
            .ok_or_else(|| AdapterError::Parse("missing balance data".into()))?;

        let parse = |field: Option<&String>| -> Decimal {
            field.and_then(|s| s.parse().ok()).unwrap_or(Decimal::ZERO)
        };
        Ok(Balance {
            exchange_id: "extended".into(),
            currency: "USDC".into(),
            total: parse(data.balance.as_ref()),
            available: parse(data.available_for_trade.as_ref()),
        })
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<Order, AdapterError> {
        let key = self.api_key()?.to_string();
        let market = Self::market_name(symbol);

        let (order_type, limit_price) = if price <= Decimal::ZERO {
            let book = self.get_orderbook(symbol, 1).await?;
            let opposite = match side {
                Side::Buy => book.best_ask(),
                Side::Sell => book.best_bid(),
            };
            if opposite <= Decimal::ZERO {
                return Err(AdapterError::OrderRejected("no opposite quote".into()));
            }
            ("IOC", protective_price(side, opposite))
        } else {
            ("LIMIT", price)
        };

        let body = serde_json::json!({
            "market": market,
            "side": side.to_string(),
            "type": order_type,
            "qty": size.to_string(),
            "price": limit_price.to_string(),
        });

        let started = Instant::now();
        let resp = self
            .http
            .post(format!("{BASE_URL}/user/order"))
            .header("X-Api-Key", key)
            .json(&body)
            .send()
            .await?;
        self.record_latency(started);

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(AdapterError::OrderRejected(format!(
                "status {status}: {text}"
            )));
        }
        let ack: OrderAck = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        Ok(Order {
            id: ack.id,
            exchange_id: "extended".into(),
            symbol: symbol.to_string(),
            side,
            size,
            price: limit_price,
            status: match ack.status.as_deref() {
                Some("FILLED") => OrderStatus::Filled,
                Some("REJECTED") => OrderStatus::Rejected,
                _ => OrderStatus::Open,
            },
            timestamp: Utc::now(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, AdapterError> {
        let key = self.api_key()?.to_string();
        let resp = self
            .http
            .delete(format!("{BASE_URL}/user/order/{order_id}"))
            .header("X-Api-Key", key)
            .send()
            .await?;
        match resp.status().as_u16() {
            code if (200..300).contains(&code) => Ok(true),
            404 => Ok(false),
            code => Err(AdapterError::Status(code)),
        }
    }

    fn latency(&self) -> LatencySummary {
        self.latency.lock().summary()
    }

    async fn close(&self) {
        let symbols: Vec<String> = self
            .subscriptions
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for symbol in symbols {
            self.unsubscribe_orderbook(&symbol).await;
        }
    }
}
