//! Spread analysis between two venue order books.
//!
//! Given the book we would buy on and the book we would sell on, the
//! analyzer prices the cross: raw spread at the touch, walk-the-book
//! slippage on both legs, net spread after fees, the largest size that
//! stays profitable, and a heuristic confidence score.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use arb_common::{Orderbook, Side};

/// Iterations of the sizing bisections. Slippage is monotone in size, so
/// ten halvings give about three decimals of precision relative to the
/// depth bound while keeping the hot loop branch-predictable.
const BISECTION_ITERATIONS: u32 = 10;

/// An evaluated cross-venue opportunity. Rebuilt on every analysis tick,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadOpportunity {
    pub symbol: String,
    /// Venue we buy on (its asks are consumed).
    pub buy_exchange: String,
    /// Venue we sell on (its bids are consumed).
    pub sell_exchange: String,
    /// Best ask on the buy venue.
    pub buy_price: Decimal,
    /// Best bid on the sell venue.
    pub sell_price: Decimal,
    /// Raw spread at the touch, percent of the buy price.
    pub spread_pct: Decimal,
    pub spread_bps: Decimal,
    pub buy_slippage_pct: Decimal,
    pub sell_slippage_pct: Decimal,
    /// Spread left after both slippages and combined fees.
    pub net_spread_pct: Decimal,
    /// Half of the max profitable size, capped at the nominal size.
    pub recommended_size: Decimal,
    /// Largest size with positive net spread, by bisection.
    pub max_profitable_size: Decimal,
    pub expected_profit_usd: Decimal,
    /// Heuristic quality score in [0, 1].
    pub confidence: Decimal,
    pub buy_latency_ms: f64,
    pub sell_latency_ms: f64,
    /// Sum of both fetch latencies (reporting convention).
    pub total_latency_ms: f64,
    pub created_at_ms: i64,
}

/// Stateless spread analyzer.
#[derive(Debug, Clone)]
pub struct SpreadAnalyzer {
    /// Size used when the caller does not supply one.
    pub default_trade_size: Decimal,
    /// Combined round-trip fees in basis points.
    pub fee_bps: Decimal,
}

impl Default for SpreadAnalyzer {
    fn default() -> Self {
        Self {
            default_trade_size: Decimal::ONE,
            fee_bps: dec!(5),
        }
    }
}

impl SpreadAnalyzer {
    pub fn new(default_trade_size: Decimal, fee_bps: Decimal) -> Self {
        Self {
            default_trade_size,
            fee_bps,
        }
    }

    /// Evaluate the cross buying on `ob_buy` (asks) and selling on
    /// `ob_sell` (bids). Returns None when either side lacks a quote.
    ///
    /// The slippage fields describe the nominal probe size; the
    /// recommendation may end up smaller.
    pub fn analyze_spread(
        &self,
        ob_buy: &Orderbook,
        ob_sell: &Orderbook,
        trade_size: Option<Decimal>,
    ) -> Option<SpreadOpportunity> {
        if ob_buy.asks.is_empty() || ob_sell.bids.is_empty() {
            return None;
        }

        let size = trade_size.unwrap_or(self.default_trade_size);
        let buy_price = ob_buy.best_ask();
        let sell_price = ob_sell.best_bid();
        if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO {
            return None;
        }

        let spread_pct = ((sell_price - buy_price) / buy_price) * Decimal::ONE_HUNDRED;
        let spread_bps = spread_pct * Decimal::ONE_HUNDRED;

        let buy_slippage = ob_buy.estimate_buy_slippage(size);
        let sell_slippage = ob_sell.estimate_sell_slippage(size);
        let fee_pct = self.fee_bps / Decimal::ONE_HUNDRED;
        let net_spread = spread_pct - buy_slippage - sell_slippage - fee_pct;

        let max_size = self.max_profitable_size(ob_buy, ob_sell);
        // Half of max on purpose: the book can thin between analysis and
        // submission, and the bound must still hold ex post.
        let recommended_size = size.min(max_size * dec!(0.5));

        let expected_profit = if net_spread > Decimal::ZERO {
            (net_spread / Decimal::ONE_HUNDRED) * recommended_size * buy_price
        } else {
            Decimal::ZERO
        };

        let total_latency_ms = ob_buy.latency_ms + ob_sell.latency_ms;
        let confidence = self.confidence(ob_buy, ob_sell, net_spread, max_size, total_latency_ms);

        Some(SpreadOpportunity {
            symbol: ob_buy.symbol.clone(),
            buy_exchange: ob_buy.exchange_id.clone(),
            sell_exchange: ob_sell.exchange_id.clone(),
            buy_price,
            sell_price,
            spread_pct,
            spread_bps,
            buy_slippage_pct: buy_slippage,
            sell_slippage_pct: sell_slippage,
            net_spread_pct: net_spread,
            recommended_size,
            max_profitable_size: max_size,
            expected_profit_usd: expected_profit,
            confidence,
            buy_latency_ms: ob_buy.latency_ms,
            sell_latency_ms: ob_sell.latency_ms,
            total_latency_ms,
            created_at_ms: Utc::now().timestamp_millis(),
        })
    }

    /// Evaluate both cross directions and return the better one by net
    /// spread, or None when neither direction has quotes.
    pub fn find_best_opportunity(
        &self,
        ob_a: &Orderbook,
        ob_b: &Orderbook,
        trade_size: Option<Decimal>,
    ) -> Option<SpreadOpportunity> {
        let forward = self.analyze_spread(ob_a, ob_b, trade_size);
        let reverse = self.analyze_spread(ob_b, ob_a, trade_size);

        match (forward, reverse) {
            (None, None) => None,
            (Some(opp), None) | (None, Some(opp)) => Some(opp),
            (Some(fwd), Some(rev)) => {
                if fwd.net_spread_pct > rev.net_spread_pct {
                    Some(fwd)
                } else {
                    Some(rev)
                }
            }
        }
    }

    /// Largest size whose net spread stays positive, by bounded bisection
    /// over [0, min(buy ask depth, sell bid depth)].
    pub fn max_profitable_size(&self, ob_buy: &Orderbook, ob_sell: &Orderbook) -> Decimal {
        if ob_buy.asks.is_empty() || ob_sell.bids.is_empty() {
            return Decimal::ZERO;
        }

        let buy_price = ob_buy.best_ask();
        let sell_price = ob_sell.best_bid();
        if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let mut lo = Decimal::ZERO;
        let mut hi = ob_buy.ask_depth().min(ob_sell.bid_depth());
        if hi <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let spread_pct = ((sell_price - buy_price) / buy_price) * Decimal::ONE_HUNDRED;
        let fee_pct = self.fee_bps / Decimal::ONE_HUNDRED;
        let net_at = |size: Decimal| {
            spread_pct
                - ob_buy.estimate_buy_slippage(size)
                - ob_sell.estimate_sell_slippage(size)
                - fee_pct
        };

        // The whole joint depth may already be profitable.
        if net_at(hi) > Decimal::ZERO {
            return hi;
        }

        for _ in 0..BISECTION_ITERATIONS {
            let mid = (lo + hi) / Decimal::TWO;
            if mid <= Decimal::ZERO {
                break;
            }
            if net_at(mid) > Decimal::ZERO {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Largest size whose walk-the-book slippage on one side of `book`
    /// stays within `max_slippage_bps`. Same bisection as
    /// [`Self::max_profitable_size`] with a slippage-only predicate; used
    /// by the execution manager's per-leg safety check.
    pub fn max_safe_qty(
        &self,
        book: &Orderbook,
        side: Side,
        max_slippage_bps: Decimal,
    ) -> Decimal {
        let depth = match side {
            Side::Buy => book.ask_depth(),
            Side::Sell => book.bid_depth(),
        };
        if depth <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let slippage_bps_at = |size: Decimal| {
            let pct = match side {
                Side::Buy => book.estimate_buy_slippage(size),
                Side::Sell => book.estimate_sell_slippage(size),
            };
            pct * Decimal::ONE_HUNDRED
        };

        if slippage_bps_at(depth) <= max_slippage_bps {
            return depth;
        }

        let mut lo = Decimal::ZERO;
        let mut hi = depth;
        for _ in 0..BISECTION_ITERATIONS {
            let mid = (lo + hi) / Decimal::TWO;
            if mid <= Decimal::ZERO {
                break;
            }
            if slippage_bps_at(mid) <= max_slippage_bps {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Additive confidence score, capped at 1.0.
    fn confidence(
        &self,
        ob_buy: &Orderbook,
        ob_sell: &Orderbook,
        net_spread: Decimal,
        max_size: Decimal,
        total_latency_ms: f64,
    ) -> Decimal {
        let mut score = Decimal::ZERO;

        // Net spread: up to 0.40
        if net_spread > dec!(0.5) {
            score += dec!(0.40);
        } else if net_spread > dec!(0.2) {
            score += dec!(0.30);
        } else if net_spread > dec!(0.1) {
            score += dec!(0.20);
        } else if net_spread > Decimal::ZERO {
            score += dec!(0.10);
        }

        // Executable size: up to 0.30
        if max_size > dec!(10) {
            score += dec!(0.30);
        } else if max_size > dec!(5) {
            score += dec!(0.20);
        } else if max_size > Decimal::ONE {
            score += dec!(0.10);
        }

        // Freshness: up to 0.15
        if total_latency_ms < 100.0 {
            score += dec!(0.15);
        } else if total_latency_ms < 200.0 {
            score += dec!(0.10);
        } else if total_latency_ms < 500.0 {
            score += dec!(0.05);
        }

        // Book health: up to 0.15
        if ob_buy.asks.len() >= 5 && ob_sell.bids.len() >= 5 {
            score += dec!(0.10);
        }
        if ob_buy.imbalance().abs() < dec!(0.5) && ob_sell.imbalance().abs() < dec!(0.5) {
            score += dec!(0.05);
        }

        score.min(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_common::PriceLevel;

    fn book(
        exchange: &str,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Orderbook {
        let mut ob = Orderbook::new(exchange, "ETH-USD");
        ob.bids = bids.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect();
        ob.asks = asks.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect();
        ob.sort_levels();
        ob.timestamp_ms = 1_700_000_000_000;
        ob
    }

    #[test]
    fn test_analyze_requires_quotes() {
        let analyzer = SpreadAnalyzer::default();
        let empty = Orderbook::new("a", "ETH-USD");
        let full = book("b", &[(dec!(101), dec!(10))], &[(dec!(101.1), dec!(10))]);
        assert!(analyzer.analyze_spread(&empty, &full, None).is_none());
        assert!(analyzer.analyze_spread(&full, &empty, None).is_none());
    }

    #[test]
    fn test_happy_arb_direction() {
        // Venue A: asks at 100; venue B: bids at 101 -> ~1% gross.
        let a = book("a", &[(dec!(99.9), dec!(10))], &[(dec!(100), dec!(10))]);
        let b = book("b", &[(dec!(101), dec!(10))], &[(dec!(101.1), dec!(10))]);
        let analyzer = SpreadAnalyzer::new(dec!(5), dec!(5));

        let opp = analyzer.analyze_spread(&a, &b, Some(dec!(5))).unwrap();
        assert_eq!(opp.buy_exchange, "a");
        assert_eq!(opp.sell_exchange, "b");
        assert_eq!(opp.spread_pct, dec!(1.00));
        assert_eq!(opp.spread_bps, dec!(100.00));
        assert_eq!(opp.buy_slippage_pct, Decimal::ZERO);
        assert_eq!(opp.sell_slippage_pct, Decimal::ZERO);
        // net = 1.0 - 0 - 0 - 0.05
        assert_eq!(opp.net_spread_pct, dec!(0.95));
        assert!(opp.recommended_size <= dec!(5));
        assert!(opp.recommended_size > Decimal::ZERO);
        assert!(opp.expected_profit_usd > Decimal::ZERO);
        assert!(opp.confidence >= dec!(0.7));
    }

    #[test]
    fn test_find_best_prefers_higher_net() {
        let a = book("a", &[(dec!(99.9), dec!(10))], &[(dec!(100), dec!(10))]);
        let b = book("b", &[(dec!(101), dec!(10))], &[(dec!(101.1), dec!(10))]);
        let analyzer = SpreadAnalyzer::new(dec!(1), dec!(5));

        // Only a->b is positive; b->a is deeply negative.
        let best = analyzer.find_best_opportunity(&a, &b, None).unwrap();
        assert_eq!(best.buy_exchange, "a");
        assert_eq!(best.sell_exchange, "b");

        // Swapping the arguments must yield the same direction.
        let swapped = analyzer.find_best_opportunity(&b, &a, None).unwrap();
        assert_eq!(swapped.buy_exchange, "a");
        assert_eq!(swapped.sell_exchange, "b");
        assert_eq!(swapped.net_spread_pct, best.net_spread_pct);
    }

    #[test]
    fn test_max_profitable_size_thin_books() {
        // Crossed but thin: walking either ladder erodes the edge.
        let a = book(
            "a",
            &[(dec!(99.5), dec!(1))],
            &[(dec!(100), dec!(1)), (dec!(100.2), dec!(1)), (dec!(100.5), dec!(1))],
        );
        let b = book(
            "b",
            &[(dec!(101), dec!(1)), (dec!(100.8), dec!(0.5))],
            &[(dec!(101.5), dec!(1))],
        );
        let analyzer = SpreadAnalyzer::new(dec!(3), dec!(5));

        let buy_slip = a.estimate_buy_slippage(dec!(3));
        let sell_slip = b.estimate_sell_slippage(dec!(3));
        assert!(buy_slip > dec!(0.2));
        assert!(sell_slip > dec!(0.1));

        let max = analyzer.max_profitable_size(&a, &b);
        assert!(max > Decimal::ONE, "max {max} should exceed 1");
        assert!(max < Decimal::TWO, "max {max} should stay under 2");
    }

    #[test]
    fn test_max_profitable_size_unprofitable_cross() {
        // Sell side below buy side: no size is profitable.
        let a = book("a", &[(dec!(99), dec!(10))], &[(dec!(100), dec!(10))]);
        let b = book("b", &[(dec!(99.5), dec!(10))], &[(dec!(100.5), dec!(10))]);
        let analyzer = SpreadAnalyzer::default();
        assert_eq!(analyzer.max_profitable_size(&a, &b), Decimal::ZERO);
    }

    #[test]
    fn test_max_safe_qty_respects_slippage_bound() {
        let b = book(
            "a",
            &[],
            &[(dec!(100), dec!(5)), (dec!(100.5), dec!(5)), (dec!(101), dec!(5))],
        );
        let analyzer = SpreadAnalyzer::default();

        // 5 bps: barely past the touch.
        let tight = analyzer.max_safe_qty(&b, Side::Buy, dec!(5));
        assert!(tight >= dec!(5), "touch size is always safe, got {tight}");
        assert!(tight < dec!(7.6));
        let slip_bps = b.estimate_buy_slippage(tight) * Decimal::ONE_HUNDRED;
        assert!(slip_bps <= dec!(5));

        // A loose bound admits the whole ladder.
        let loose = analyzer.max_safe_qty(&b, Side::Buy, dec!(200));
        assert_eq!(loose, dec!(15));
    }

    #[test]
    fn test_max_safe_qty_empty_side() {
        let b = book("a", &[(dec!(100), dec!(5))], &[]);
        let analyzer = SpreadAnalyzer::default();
        assert_eq!(analyzer.max_safe_qty(&b, Side::Buy, dec!(100)), Decimal::ZERO);
        assert!(analyzer.max_safe_qty(&b, Side::Sell, dec!(100)) > Decimal::ZERO);
    }

    #[test]
    fn test_confidence_degrades_with_latency() {
        let mut a = book("a", &[(dec!(99.9), dec!(10))], &[(dec!(100), dec!(10))]);
        let mut b = book("b", &[(dec!(101), dec!(10))], &[(dec!(101.1), dec!(10))]);
        let analyzer = SpreadAnalyzer::new(dec!(5), dec!(5));

        let fast = analyzer.analyze_spread(&a, &b, None).unwrap();
        a.latency_ms = 400.0;
        b.latency_ms = 300.0;
        let slow = analyzer.analyze_spread(&a, &b, None).unwrap();
        assert!(slow.confidence < fast.confidence);
    }

    #[test]
    fn test_expected_profit_zero_when_net_negative() {
        let a = book("a", &[(dec!(99), dec!(10))], &[(dec!(100), dec!(10))]);
        let b = book("b", &[(dec!(100.01), dec!(10))], &[(dec!(101), dec!(10))]);
        // 1 bp gross, 5 bps fee -> negative net.
        let analyzer = SpreadAnalyzer::new(dec!(1), dec!(5));
        let opp = analyzer.analyze_spread(&a, &b, None).unwrap();
        assert!(opp.net_spread_pct < Decimal::ZERO);
        assert_eq!(opp.expected_profit_usd, Decimal::ZERO);
    }
}
