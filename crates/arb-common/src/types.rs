//! Order, balance and side types shared across venue adapters and bots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side for trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Lower-case venue wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of a submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted by the venue, resting or in flight.
    Open,
    /// Fully filled.
    Filled,
    /// Rejected by the venue.
    Rejected,
    /// Cancelled before a full fill.
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Rejected => write!(f, "rejected"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An order as acknowledged by a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Venue-assigned order id.
    pub id: String,
    /// Venue the order lives on.
    pub exchange_id: String,
    /// Symbol, engine-normalized form (e.g. "ETH-USD").
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    /// Limit price. Zero for marketable orders where the venue picked
    /// the protective bound.
    pub price: Decimal,
    pub status: OrderStatus,
    /// Submission acknowledgement time.
    pub timestamp: DateTime<Utc>,
}

/// Account balance on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub exchange_id: String,
    /// Settlement currency (perp venues here settle in USDC).
    pub currency: String,
    pub total: Decimal,
    pub available: Decimal,
}
