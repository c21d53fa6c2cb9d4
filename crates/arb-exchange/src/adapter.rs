//! The venue adapter contract.
//!
//! Every operation returns a typed error instead of panicking; the
//! supervisor counts failures and retries on the next tick. Adapters log
//! their own transport details, callers only see [`AdapterError`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;

use arb_common::{Balance, LatencySummary, Order, Orderbook, Side};

/// Push-feed delivery channel. The adapter sends one [`Orderbook`] per
/// update, in arrival order; the receiver treats each value as atomic.
pub type BookReceiver = mpsc::Receiver<Orderbook>;

/// Errors an adapter can surface to the engine.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("venue returned status {0}")]
    Status(u16),

    #[error("malformed venue payload: {0}")]
    Parse(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("no adapter for venue: {0}")]
    UnknownVenue(String),

    #[error("credentials not configured for {0}")]
    NotConfigured(String),

    #[error("push feed not supported by this venue")]
    PushUnsupported,

    #[error("push feed not connected")]
    NotConnected,

    #[error("order rejected: {0}")]
    OrderRejected(String),
}

impl AdapterError {
    /// True for the missing-credentials case, which the supervisor
    /// handles by demoting the bot to dry-run instead of retrying.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, AdapterError::NotConfigured(_))
    }

    /// True for faults worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::Transport(_)
                | AdapterError::Timeout
                | AdapterError::Status(_)
                | AdapterError::Parse(_)
                | AdapterError::NotConnected
        )
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if let Some(status) = err.status() {
            AdapterError::Status(status.as_u16())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

/// Capability set the engine needs from a venue.
///
/// Methods take `&self`: adapters manage their own interior state so a
/// single handle can be shared by every bot trading on that venue.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Stable venue identifier ("paradex", "extended", ...).
    fn id(&self) -> &str;

    /// Establish the transport and warm caches (market metadata).
    async fn initialize(&self) -> Result<(), AdapterError>;

    /// Snapshot the book for `symbol` down to `depth` levels per side.
    ///
    /// Implementations must stamp `latency_ms` with the wall time of the
    /// fetch and record it in their latency stats.
    async fn get_orderbook(&self, symbol: &str, depth: usize) -> Result<Orderbook, AdapterError>;

    /// Open a push subscription for `symbol`. The returned channel yields
    /// books in arrival order until `unsubscribe_orderbook` or `close`.
    ///
    /// Venues without a push feed return [`AdapterError::PushUnsupported`].
    async fn subscribe_orderbook(&self, symbol: &str) -> Result<BookReceiver, AdapterError> {
        let _ = symbol;
        Err(AdapterError::PushUnsupported)
    }

    /// Tear down the push subscription for `symbol`. Idempotent.
    async fn unsubscribe_orderbook(&self, symbol: &str) {
        let _ = symbol;
    }

    /// Health flag for the push feed; polled by the supervisor's
    /// keep-alive. Always false for poll-only venues.
    fn is_push_connected(&self) -> bool {
        false
    }

    /// Settlement-currency balance for the configured account.
    async fn get_balance(&self) -> Result<Balance, AdapterError>;

    /// Submit an order. `price <= 0` means marketable IOC: the adapter
    /// prices it at the best opposite quote padded 5% in the taker's
    /// favor as the protective bound.
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Result<Order, AdapterError>;

    /// Cancel a resting order. Ok(false) means the venue no longer knew
    /// the order (already filled or expired).
    async fn cancel_order(&self, order_id: &str) -> Result<bool, AdapterError>;

    /// Latency telemetry for this venue connection.
    fn latency(&self) -> LatencySummary;

    /// Release transports. Idempotent; called when the last bot handle
    /// is returned to the registry.
    async fn close(&self);
}

impl std::fmt::Debug for dyn ExchangeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeAdapter").field("id", &self.id()).finish()
    }
}

/// Pad a marketable order's price in the taker's favor: best opposite
/// +5% for buys, -5% for sells.
pub(crate) fn protective_price(side: Side, best_opposite: Decimal) -> Decimal {
    let pad = best_opposite * Decimal::new(5, 2);
    match side {
        Side::Buy => best_opposite + pad,
        Side::Sell => best_opposite - pad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_protective_price_pads_both_sides() {
        assert_eq!(protective_price(Side::Buy, dec!(100)), dec!(105.00));
        assert_eq!(protective_price(Side::Sell, dec!(100)), dec!(95.00));
    }

    #[test]
    fn test_error_classification() {
        assert!(AdapterError::NotConfigured("paradex".into()).is_not_configured());
        assert!(!AdapterError::Timeout.is_not_configured());

        assert!(AdapterError::Timeout.is_transient());
        assert!(AdapterError::Status(502).is_transient());
        assert!(!AdapterError::PushUnsupported.is_transient());
        assert!(!AdapterError::NotConfigured("x".into()).is_transient());
    }
}
