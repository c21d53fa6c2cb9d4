//! Per-bot counters and rolling statistics.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::analyzer::SpreadOpportunity;

/// Smoothing factor for the spread EMA.
const SPREAD_EMA_ALPHA: Decimal = dec!(0.05);
/// Smoothing factor for the latency EMA.
const LATENCY_EMA_ALPHA: f64 = 0.1;

/// Statistics owned by one bot. Reset only on teardown.
#[derive(Debug, Default)]
pub struct BotStats {
    pub polls: u64,
    pub push_updates: u64,
    pub opportunities: u64,
    pub profitable_opportunities: u64,
    pub trades: u64,
    pub errors: u64,
    pub start_time_ms: i64,

    avg_latency_ms: f64,
    min_latency_ms: Option<f64>,
    max_latency_ms: f64,

    last_spread: Decimal,
    last_net_spread: Decimal,
    best_spread: Decimal,
    avg_spread: Decimal,

    last_opportunity: Option<SpreadOpportunity>,
}

impl BotStats {
    pub fn new(start_time_ms: i64) -> Self {
        Self {
            start_time_ms,
            ..Default::default()
        }
    }

    /// Record the composite tick latency (EMA alpha = 0.1).
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.min_latency_ms = Some(match self.min_latency_ms {
            Some(min) => min.min(latency_ms),
            None => latency_ms,
        });
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
        if self.avg_latency_ms == 0.0 {
            self.avg_latency_ms = latency_ms;
        } else {
            self.avg_latency_ms =
                LATENCY_EMA_ALPHA * latency_ms + (1.0 - LATENCY_EMA_ALPHA) * self.avg_latency_ms;
        }
    }

    /// Record an observed spread (EMA alpha = 0.05).
    pub fn record_spread(&mut self, spread_pct: Decimal) {
        self.last_spread = spread_pct;
        self.best_spread = self.best_spread.max(spread_pct);
        if self.avg_spread == Decimal::ZERO {
            self.avg_spread = spread_pct;
        } else {
            self.avg_spread = SPREAD_EMA_ALPHA * spread_pct
                + (Decimal::ONE - SPREAD_EMA_ALPHA) * self.avg_spread;
        }
    }

    /// Store the latest evaluated opportunity.
    pub fn record_opportunity(&mut self, opp: SpreadOpportunity) {
        self.last_net_spread = opp.net_spread_pct;
        self.last_opportunity = Some(opp);
        self.opportunities += 1;
    }

    pub fn last_opportunity(&self) -> Option<&SpreadOpportunity> {
        self.last_opportunity.as_ref()
    }

    /// Serializable point-in-time view.
    pub fn snapshot(&self, now_ms: i64) -> BotStatsSnapshot {
        BotStatsSnapshot {
            polls: self.polls,
            push_updates: self.push_updates,
            opportunities: self.opportunities,
            profitable_opportunities: self.profitable_opportunities,
            trades: self.trades,
            errors: self.errors,
            runtime_secs: if self.start_time_ms > 0 {
                ((now_ms - self.start_time_ms) / 1_000).max(0)
            } else {
                0
            },
            avg_latency_ms: self.avg_latency_ms,
            min_latency_ms: self.min_latency_ms.unwrap_or(0.0),
            max_latency_ms: self.max_latency_ms,
            last_spread: self.last_spread,
            last_net_spread: self.last_net_spread,
            best_spread: self.best_spread,
            avg_spread: self.avg_spread,
        }
    }
}

/// Snapshot of [`BotStats`] for the observer boundary.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatsSnapshot {
    pub polls: u64,
    pub push_updates: u64,
    pub opportunities: u64,
    pub profitable_opportunities: u64,
    pub trades: u64,
    pub errors: u64,
    pub runtime_secs: i64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub last_spread: Decimal,
    pub last_net_spread: Decimal,
    pub best_spread: Decimal,
    pub avg_spread: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_ema() {
        let mut stats = BotStats::new(0);
        stats.record_latency(100.0);
        assert_eq!(stats.avg_latency_ms, 100.0);
        stats.record_latency(200.0);
        assert!((stats.avg_latency_ms - 110.0).abs() < 1e-9);

        let snap = stats.snapshot(0);
        assert_eq!(snap.min_latency_ms, 100.0);
        assert_eq!(snap.max_latency_ms, 200.0);
    }

    #[test]
    fn test_spread_ema_and_best() {
        let mut stats = BotStats::new(0);
        stats.record_spread(dec!(1.0));
        assert_eq!(stats.avg_spread, dec!(1.0));
        stats.record_spread(dec!(2.0));
        // 0.05 * 2 + 0.95 * 1 = 1.05
        assert_eq!(stats.avg_spread, dec!(1.05));
        assert_eq!(stats.best_spread, dec!(2.0));
        assert_eq!(stats.last_spread, dec!(2.0));

        // Best never regresses.
        stats.record_spread(dec!(0.1));
        assert_eq!(stats.best_spread, dec!(2.0));
    }

    #[test]
    fn test_runtime() {
        let stats = BotStats::new(10_000);
        let snap = stats.snapshot(73_000);
        assert_eq!(snap.runtime_secs, 63);

        let unstarted = BotStats::default();
        assert_eq!(unstarted.snapshot(73_000).runtime_secs, 0);
    }
}
