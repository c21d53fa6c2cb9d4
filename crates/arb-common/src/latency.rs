//! Per-venue latency tracking.

use serde::{Deserialize, Serialize};

/// Smoothing factor for the latency EMA.
const EMA_ALPHA: f64 = 0.1;

/// Rolling latency statistics for one venue connection.
///
/// Latency is wall-clock milliseconds (not financial data), so f64 is
/// fine here. Updates are monotone: min/max only tighten outward.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    last_ms: f64,
    avg_ms: f64,
    min_ms: Option<f64>,
    max_ms: f64,
    count: u64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request's wall time.
    pub fn record(&mut self, latency_ms: f64) {
        self.last_ms = latency_ms;
        self.min_ms = Some(match self.min_ms {
            Some(min) => min.min(latency_ms),
            None => latency_ms,
        });
        self.max_ms = self.max_ms.max(latency_ms);
        self.count += 1;

        if self.avg_ms == 0.0 {
            self.avg_ms = latency_ms;
        } else {
            self.avg_ms = EMA_ALPHA * latency_ms + (1.0 - EMA_ALPHA) * self.avg_ms;
        }
    }

    #[inline]
    pub fn last_ms(&self) -> f64 {
        self.last_ms
    }

    /// Exponential moving average (alpha = 0.1).
    #[inline]
    pub fn avg_ms(&self) -> f64 {
        self.avg_ms
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Serializable point-in-time summary.
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            last_ms: self.last_ms,
            avg_ms: self.avg_ms,
            min_ms: self.min_ms.unwrap_or(0.0),
            max_ms: self.max_ms,
            count: self.count,
        }
    }
}

/// Snapshot of [`LatencyStats`] for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub last_ms: f64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub count: u64,
}
