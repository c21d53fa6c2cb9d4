//! Paradex venue adapter (REST polling).
//!
//! Zero-fee perpetuals on Starknet. Public endpoints serve markets and
//! order books; trading endpoints need an API key.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use arb_common::{
    Balance, LatencyStats, LatencySummary, Order, OrderStatus, Orderbook, PriceLevel, Side,
};

use crate::adapter::{protective_price, AdapterError, ExchangeAdapter};
use crate::registry::VenueCredentials;

const BASE_URL: &str = "https://api.prod.paradex.trade/v1";

/// Decode one `[price, size]` wire level. Paradex sends strings; tolerate
/// bare numbers too.
pub(crate) fn parse_wire_level(raw: &[serde_json::Value]) -> Option<(Decimal, Decimal)> {
    let field = |v: &serde_json::Value| -> Option<Decimal> {
        match v {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.to_string().parse().ok(),
            _ => None,
        }
    };
    let price = field(raw.first()?)?;
    let size = field(raw.get(1)?)?;
    Some((price, size))
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    results: Vec<MarketInfo>,
}

#[derive(Debug, Deserialize)]
struct MarketInfo {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    asset_kind: String,
}

#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    last_updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    account_value: Option<String>,
    #[serde(default)]
    free_collateral: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderAckResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

/// Paradex REST adapter.
pub struct ParadexAdapter {
    http: reqwest::Client,
    credentials: VenueCredentials,
    /// PERP market symbols cached at initialize().
    markets: RwLock<HashSet<String>>,
    latency: Mutex<LatencyStats>,
}

impl ParadexAdapter {
    pub fn new(credentials: VenueCredentials) -> Self {
        // Pooled keep-alive connections; one host, so the per-host idle
        // cap is the effective pool bound.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .expect("static reqwest client config");
        Self {
            http,
            credentials,
            markets: RwLock::new(HashSet::new()),
            latency: Mutex::new(LatencyStats::new()),
        }
    }

    /// ETH-USD -> ETH-USD-PERP.
    fn market_symbol(symbol: &str) -> String {
        if symbol.ends_with("-PERP") {
            symbol.to_string()
        } else {
            format!("{symbol}-PERP")
        }
    }

    fn auth_header(&self) -> Result<String, AdapterError> {
        self.credentials
            .api_key
            .as_deref()
            .map(|key| format!("Bearer {key}"))
            .ok_or_else(|| AdapterError::NotConfigured("paradex".into()))
    }

    fn record_latency(&self, started: Instant) -> f64 {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.latency.lock().record(latency_ms);
        latency_ms
    }
}

#[async_trait::async_trait]
impl ExchangeAdapter for ParadexAdapter {
    fn id(&self) -> &str {
        "paradex"
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        let resp = self.http.get(format!("{BASE_URL}/markets")).send().await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status(resp.status().as_u16()));
        }
        let payload: MarketsResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let perps: HashSet<String> = payload
            .results
            .into_iter()
            .filter(|m| m.asset_kind == "PERP")
            .map(|m| m.symbol)
            .collect();
        debug!(markets = perps.len(), "paradex markets cached");
        *self.markets.write() = perps;
        Ok(())
    }

    async fn get_orderbook(&self, symbol: &str, depth: usize) -> Result<Orderbook, AdapterError> {
        let market = Self::market_symbol(symbol);
        {
            let markets = self.markets.read();
            if !markets.is_empty() && !markets.contains(&market) {
                return Err(AdapterError::UnknownSymbol(market));
            }
        }

        let started = Instant::now();
        let resp = self
            .http
            .get(format!("{BASE_URL}/orderbook/{market}"))
            .send()
            .await?;
        let latency_ms = self.record_latency(started);

        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), %market, "paradex orderbook fetch failed");
            return Err(AdapterError::Status(resp.status().as_u16()));
        }
        let payload: OrderbookResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let mut book = Orderbook::new("paradex", symbol);
        for raw in payload.bids.iter().take(depth) {
            if let Some((price, size)) = parse_wire_level(raw) {
                if price > Decimal::ZERO && size > Decimal::ZERO {
                    book.bids.push(PriceLevel::new(price, size));
                }
            }
        }
        for raw in payload.asks.iter().take(depth) {
            if let Some((price, size)) = parse_wire_level(raw) {
                if price > Decimal::ZERO && size > Decimal::ZERO {
                    book.asks.push(PriceLevel::new(price, size));
                }
            }
        }
        book.sort_levels();
        book.timestamp_ms = payload
            .last_updated_at
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        book.latency_ms = latency_ms;
        Ok(book)
    }

    async fn get_balance(&self) -> Result<Balance, AdapterError> {
        let auth = self.auth_header()?;
        let resp = self
            .http
            .get(format!("{BASE_URL}/account"))
            .header("Authorization", auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AdapterError::Status(resp.status().as_u16()));
        }
        let payload: AccountResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let parse = |field: Option<&String>| -> Decimal {
            field.and_then(|s| s.parse().ok()).unwrap_or(Decimal::ZERO)
        };
        Ok(Balance {
            exchange_id: "paradex".into(),
            currency: "USDC".into(),
            total: parse(payload.account_value.as_ref()),
            available: parse(payload.free_collateral.as_ref()),
        })
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<Order, AdapterError> {
        let auth = self.auth_header()?;
        let market = Self::market_symbol(symbol);

        // Marketable IOC: bound the fill at best-opposite +/- 5%.
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
            "size": size.to_string(),
            "price": limit_price.to_string(),
        });

        let started = Instant::now();
        let resp = self
            .http
            .post(format!("{BASE_URL}/orders"))
            .header("Authorization", auth)
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
        let ack: OrderAckResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        Ok(Order {
            id: ack.id,
            exchange_id: "paradex".into(),
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
        let auth = self.auth_header()?;
        let resp = self
            .http
            .delete(format!("{BASE_URL}/orders/{order_id}"))
            .header("Authorization", auth)
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
        // Nothing persistent to tear down: the pooled HTTP client drops
        // its connections with the adapter.
    }
}
