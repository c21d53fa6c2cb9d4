//! Order-book model with depth-aware liquidity metrics.
//!
//! A book is a pure value: adapters build one per snapshot, the analyzer
//! and execution manager only read it. All walk-the-book arithmetic lives
//! here so every component prices liquidity the same way.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price, must be positive.
    pub price: Decimal,
    /// Size available at this price, never negative. A zero size is only
    /// valid at the top of a BBO-fallback snapshot.
    pub size: Decimal,
    /// Number of resting orders aggregated into this level.
    pub orders_count: u32,
}

impl PriceLevel {
    /// Create a level with a single resting order.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self {
            price,
            size,
            orders_count: 1,
        }
    }

    /// Create a level with an explicit order count.
    pub fn with_orders(price: Decimal, size: Decimal, orders_count: u32) -> Self {
        Self {
            price,
            size,
            orders_count,
        }
    }

    /// Notional value resting at this level.
    #[inline]
    pub fn value(&self) -> Decimal {
        self.price * self.size
    }
}

/// Full order book for one symbol on one venue.
///
/// Bids are sorted by price descending, asks ascending. Derived metrics
/// that need both sides (mid, spread, imbalance) report zero when either
/// side is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Orderbook {
    /// Venue identifier (e.g. "paradex").
    pub exchange_id: String,
    /// Engine-normalized symbol (e.g. "ETH-USD").
    pub symbol: String,
    /// Bid levels, best (highest) first.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best (lowest) first.
    pub asks: Vec<PriceLevel>,
    /// Venue timestamp of the snapshot (ms since epoch).
    pub timestamp_ms: i64,
    /// Wall time the fetch took, recorded by the adapter.
    pub latency_ms: f64,
}

impl Orderbook {
    /// Create an empty book.
    pub fn new(exchange_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp_ms: 0,
            latency_ms: 0.0,
        }
    }

    /// Restore sort order after bulk-inserting levels.
    pub fn sort_levels(&mut self) {
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
    }

    /// Best bid price, zero if no bids.
    #[inline]
    pub fn best_bid(&self) -> Decimal {
        self.bids.first().map(|l| l.price).unwrap_or(Decimal::ZERO)
    }

    /// Best ask price, zero if no asks.
    #[inline]
    pub fn best_ask(&self) -> Decimal {
        self.asks.first().map(|l| l.price).unwrap_or(Decimal::ZERO)
    }

    /// Size at the best bid.
    #[inline]
    pub fn best_bid_size(&self) -> Decimal {
        self.bids.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Size at the best ask.
    #[inline]
    pub fn best_ask_size(&self) -> Decimal {
        self.asks.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// True when both sides carry at least one level.
    #[inline]
    pub fn has_both_sides(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    /// Mid-market price, zero unless both sides are populated.
    pub fn mid_price(&self) -> Decimal {
        if !self.has_both_sides() {
            return Decimal::ZERO;
        }
        (self.best_bid() + self.best_ask()) / Decimal::TWO
    }

    /// Absolute bid/ask spread, zero unless both sides are populated.
    pub fn spread(&self) -> Decimal {
        if !self.has_both_sides() {
            return Decimal::ZERO;
        }
        self.best_ask() - self.best_bid()
    }

    /// Spread in basis points of the mid.
    pub fn spread_bps(&self) -> Decimal {
        let mid = self.mid_price();
        if mid <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.spread() / mid) * Decimal::new(10000, 0)
    }

    /// Total bid-side liquidity.
    pub fn bid_depth(&self) -> Decimal {
        self.bids.iter().map(|l| l.size).sum()
    }

    /// Total ask-side liquidity.
    pub fn ask_depth(&self) -> Decimal {
        self.asks.iter().map(|l| l.size).sum()
    }

    /// Book imbalance: (bid_depth - ask_depth) / (bid_depth + ask_depth).
    ///
    /// Positive means more resting bids (buy pressure). Bounded to
    /// [-1, +1]; zero for an empty book.
    pub fn imbalance(&self) -> Decimal {
        let bid_depth = self.bid_depth();
        let ask_depth = self.ask_depth();
        let total = bid_depth + ask_depth;
        if total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (bid_depth - ask_depth) / total
    }

    /// Estimated slippage (percent vs the touch) for a buy of `size`
    /// walking the ask ladder.
    ///
    /// If `size` exceeds visible depth, the residual is priced at the
    /// deepest visible level - the optimistic assumption that the level
    /// refills.
    pub fn estimate_buy_slippage(&self, size: Decimal) -> Decimal {
        if self.asks.is_empty() || size <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let mut remaining = size;
        let mut total_cost = Decimal::ZERO;

        for level in &self.asks {
            if remaining <= Decimal::ZERO {
                break;
            }
            let fill = remaining.min(level.size);
            total_cost += fill * level.price;
            remaining -= fill;
        }

        if remaining > Decimal::ZERO {
            // Not enough visible liquidity - price the rest at the last level
            total_cost += remaining * self.asks[self.asks.len() - 1].price;
        }

        let best_ask = self.best_ask();
        if best_ask <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let avg_price = total_cost / size;
        ((avg_price - best_ask) / best_ask) * Decimal::ONE_HUNDRED
    }

    /// Estimated slippage (percent vs the touch) for a sell of `size`
    /// walking the bid ladder. Symmetric to [`Self::estimate_buy_slippage`].
    pub fn estimate_sell_slippage(&self, size: Decimal) -> Decimal {
        if self.bids.is_empty() || size <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let mut remaining = size;
        let mut total_proceeds = Decimal::ZERO;

        for level in &self.bids {
            if remaining <= Decimal::ZERO {
                break;
            }
            let fill = remaining.min(level.size);
            total_proceeds += fill * level.price;
            remaining -= fill;
        }

        if remaining > Decimal::ZERO {
            total_proceeds += remaining * self.bids[self.bids.len() - 1].price;
        }

        let best_bid = self.best_bid();
        if best_bid <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let avg_price = total_proceeds / size;
        ((best_bid - avg_price) / best_bid) * Decimal::ONE_HUNDRED
    }

    /// Liquidity-weighted mid over the top `levels` of each side:
    /// the average of the bid-side and ask-side VWAPs.
    ///
    /// Falls back to the plain mid when either side has no size.
    pub fn liquidity_weighted_mid(&self, levels: usize) -> Decimal {
        let bid_levels = &self.bids[..levels.min(self.bids.len())];
        let ask_levels = &self.asks[..levels.min(self.asks.len())];

        if bid_levels.is_empty() || ask_levels.is_empty() {
            return self.mid_price();
        }

        let bid_size: Decimal = bid_levels.iter().map(|l| l.size).sum();
        let ask_size: Decimal = ask_levels.iter().map(|l| l.size).sum();
        if bid_size <= Decimal::ZERO || ask_size <= Decimal::ZERO {
            return self.mid_price();
        }

        let bid_weighted: Decimal = bid_levels.iter().map(|l| l.value()).sum();
        let ask_weighted: Decimal = ask_levels.iter().map(|l| l.value()).sum();

        let vwap_bid = bid_weighted / bid_size;
        let vwap_ask = ask_weighted / ask_size;
        (vwap_bid + vwap_ask) / Decimal::TWO
    }

    /// True if the snapshot is older than `max_age_ms` at `now_ms`.
    pub fn is_stale(&self, max_age_ms: i64, now_ms: i64) -> bool {
        self.timestamp_ms == 0 || now_ms - self.timestamp_ms > max_age_ms
    }

    /// Top `n` levels of each side, for snapshot serialization.
    pub fn top_levels(&self, n: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (
            self.bids.iter().take(n).copied().collect(),
            self.asks.iter().take(n).copied().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> Orderbook {
        let mut ob = Orderbook::new("testex", "ETH-USD");
        ob.bids = bids.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect();
        ob.asks = asks.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect();
        ob.sort_levels();
        ob.timestamp_ms = 1_700_000_000_000;
        ob
    }

    #[test]
    fn test_bbo_and_mid() {
        let ob = book(
            &[(dec!(99.9), dec!(10)), (dec!(99.8), dec!(5))],
            &[(dec!(100.1), dec!(8)), (dec!(100.3), dec!(4))],
        );
        assert_eq!(ob.best_bid(), dec!(99.9));
        assert_eq!(ob.best_ask(), dec!(100.1));
        assert_eq!(ob.best_bid_size(), dec!(10));
        assert_eq!(ob.best_ask_size(), dec!(8));
        assert_eq!(ob.mid_price(), dec!(100.0));
        assert_eq!(ob.spread(), dec!(0.2));
        // 0.2 / 100 * 10000 = 20 bps
        assert_eq!(ob.spread_bps(), dec!(20));
    }

    #[test]
    fn test_empty_side_reports_zero() {
        let ob = book(&[(dec!(99.9), dec!(10))], &[]);
        assert_eq!(ob.best_ask(), Decimal::ZERO);
        assert_eq!(ob.mid_price(), Decimal::ZERO);
        assert_eq!(ob.spread(), Decimal::ZERO);
        assert_eq!(ob.spread_bps(), Decimal::ZERO);
        assert_eq!(ob.estimate_buy_slippage(dec!(1)), Decimal::ZERO);
    }

    #[test]
    fn test_depth_and_imbalance() {
        let ob = book(
            &[(dec!(99.9), dec!(30)), (dec!(99.8), dec!(30))],
            &[(dec!(100.1), dec!(20)), (dec!(100.2), dec!(20))],
        );
        assert_eq!(ob.bid_depth(), dec!(60));
        assert_eq!(ob.ask_depth(), dec!(40));
        // (60 - 40) / 100 = 0.2
        assert_eq!(ob.imbalance(), dec!(0.2));
    }

    #[test]
    fn test_imbalance_bounded() {
        let one_sided = book(&[(dec!(99.9), dec!(50))], &[]);
        assert_eq!(one_sided.imbalance(), Decimal::ONE);

        let empty = Orderbook::new("testex", "ETH-USD");
        assert_eq!(empty.imbalance(), Decimal::ZERO);
    }

    #[test]
    fn test_buy_slippage_within_top_level() {
        let ob = book(&[], &[(dec!(100), dec!(10)), (dec!(101), dec!(10))]);
        // Fully fillable at the touch: no slippage
        assert_eq!(ob.estimate_buy_slippage(dec!(5)), Decimal::ZERO);
    }

    #[test]
    fn test_buy_slippage_walks_levels() {
        let ob = book(&[], &[(dec!(100), dec!(10)), (dec!(101), dec!(10))]);
        // 10 @ 100 + 10 @ 101 -> avg 100.5 -> 0.5% vs touch
        assert_eq!(ob.estimate_buy_slippage(dec!(20)), dec!(0.5));
    }

    #[test]
    fn test_buy_slippage_residual_uses_last_level() {
        let ob = book(&[], &[(dec!(100), dec!(10)), (dec!(101), dec!(10))]);
        // 30 = 10 @ 100 + 10 @ 101 + 10 residual @ 101
        // cost = 1000 + 1010 + 1010 = 3020, avg = 100.6667
        let slip = ob.estimate_buy_slippage(dec!(30));
        assert!(slip > dec!(0.66) && slip < dec!(0.67));
    }

    #[test]
    fn test_sell_slippage_walks_levels() {
        let ob = book(&[(dec!(100), dec!(10)), (dec!(99), dec!(10))], &[]);
        // 10 @ 100 + 10 @ 99 -> avg 99.5 -> 0.5% below touch
        assert_eq!(ob.estimate_sell_slippage(dec!(20)), dec!(0.5));
    }

    #[test]
    fn test_slippage_zero_size() {
        let ob = book(
            &[(dec!(100), dec!(10))],
            &[(dec!(101), dec!(10))],
        );
        assert_eq!(ob.estimate_buy_slippage(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ob.estimate_sell_slippage(dec!(-1)), Decimal::ZERO);
    }

    #[test]
    fn test_slippage_monotone_in_size() {
        let ob = book(
            &[],
            &[
                (dec!(100), dec!(5)),
                (dec!(100.5), dec!(5)),
                (dec!(101), dec!(5)),
            ],
        );
        let mut prev = Decimal::ZERO;
        for size in [dec!(1), dec!(5), dec!(8), dec!(12), dec!(15), dec!(25)] {
            let slip = ob.estimate_buy_slippage(size);
            assert!(slip >= prev, "slippage must not decrease with size");
            prev = slip;
        }
    }

    #[test]
    fn test_liquidity_weighted_mid() {
        let ob = book(
            &[(dec!(99), dec!(10)), (dec!(98), dec!(30))],
            &[(dec!(101), dec!(10)), (dec!(102), dec!(30))],
        );
        // bid vwap = (990 + 2940) / 40 = 98.25
        // ask vwap = (1010 + 3060) / 40 = 101.75
        assert_eq!(ob.liquidity_weighted_mid(5), dec!(100));
        // Top-1 reduces to the plain mid of the touch prices
        assert_eq!(ob.liquidity_weighted_mid(1), dec!(100));
    }

    #[test]
    fn test_liquidity_weighted_mid_falls_back() {
        let mut ob = book(&[(dec!(99), dec!(10))], &[(dec!(101), dec!(10))]);
        ob.asks[0].size = Decimal::ZERO;
        // Zero ask size -> plain mid
        assert_eq!(ob.liquidity_weighted_mid(5), dec!(100));
    }

    #[test]
    fn test_staleness() {
        let ob = book(&[(dec!(99), dec!(1))], &[(dec!(101), dec!(1))]);
        let now = ob.timestamp_ms + 300;
        assert!(!ob.is_stale(500, now));
        assert!(ob.is_stale(250, now));

        let never_updated = Orderbook::new("testex", "ETH-USD");
        assert!(never_updated.is_stale(i64::MAX / 2, now));
    }

    #[test]
    fn test_top_levels() {
        let ob = book(
            &[(dec!(99), dec!(1)), (dec!(98), dec!(1)), (dec!(97), dec!(1))],
            &[(dec!(101), dec!(1))],
        );
        let (bids, asks) = ob.top_levels(2);
        assert_eq!(bids.len(), 2);
        assert_eq!(asks.len(), 1);
        assert_eq!(bids[0].price, dec!(99));
    }
}
