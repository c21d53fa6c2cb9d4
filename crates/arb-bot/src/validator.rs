//! Anti-fakeout signal validation.
//!
//! A spread crossing the arming threshold must hold continuously for
//! `min_validity_ms` before the execution manager may fire. Momentary
//! spikes reset nothing downstream: the validator simply never reports
//! valid for them.

use std::collections::VecDeque;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

/// Retained samples, for introspection only.
const SAMPLE_CAPACITY: usize = 100;

/// One recorded spread measurement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpreadSample {
    pub spread: Decimal,
    pub timestamp_ms: i64,
    pub above_threshold: bool,
}

/// Dwell-time gate over a spread signal.
///
/// Direction-oblivious: the caller supplies the threshold for whichever
/// direction is armed.
#[derive(Debug)]
pub struct SignalValidator {
    min_validity_ms: i64,
    valid_since_ms: Option<i64>,
    samples: VecDeque<SpreadSample>,
}

impl SignalValidator {
    pub fn new(min_validity_ms: i64) -> Self {
        Self {
            min_validity_ms,
            valid_since_ms: None,
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
        }
    }

    /// Record a spread measurement against the armed threshold.
    pub fn record(&mut self, spread: Decimal, threshold: Decimal) {
        self.record_at(spread, threshold, Utc::now().timestamp_millis());
    }

    /// True once the signal has held for the configured duration.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp_millis())
    }

    /// How long the signal has currently been valid.
    pub fn duration_ms(&self) -> i64 {
        match self.valid_since_ms {
            Some(since) => Utc::now().timestamp_millis() - since,
            None => 0,
        }
    }

    /// Hot-reload the dwell requirement. Deliberately does not clear
    /// `valid_since`: an already-valid signal keeps its clock.
    pub fn update_config(&mut self, min_validity_ms: i64) {
        self.min_validity_ms = min_validity_ms;
    }

    pub fn reset(&mut self) {
        self.valid_since_ms = None;
        self.samples.clear();
    }

    /// Recent samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &SpreadSample> {
        self.samples.iter()
    }

    pub(crate) fn record_at(&mut self, spread: Decimal, threshold: Decimal, now_ms: i64) {
        let above = spread >= threshold;
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(SpreadSample {
            spread,
            timestamp_ms: now_ms,
            above_threshold: above,
        });

        if above {
            if self.valid_since_ms.is_none() {
                self.valid_since_ms = Some(now_ms);
            }
        } else {
            self.valid_since_ms = None;
        }
    }

    pub(crate) fn is_valid_at(&self, now_ms: i64) -> bool {
        match self.valid_since_ms {
            Some(since) => now_ms - since >= self.min_validity_ms,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invalid_until_dwell_elapses() {
        let mut v = SignalValidator::new(100);
        v.record_at(dec!(0.8), dec!(0.5), 1_000);
        assert!(!v.is_valid_at(1_050));
        assert!(v.is_valid_at(1_100));
        assert!(v.is_valid_at(1_500));
    }

    #[test]
    fn test_drop_below_threshold_disarms() {
        let mut v = SignalValidator::new(100);
        v.record_at(dec!(0.8), dec!(0.5), 1_000);
        v.record_at(dec!(0.4), dec!(0.5), 1_050);
        assert!(!v.is_valid_at(1_200));

        // Re-crossing restarts the clock from scratch.
        v.record_at(dec!(0.9), dec!(0.5), 1_300);
        assert!(!v.is_valid_at(1_350));
        assert!(v.is_valid_at(1_400));
    }

    #[test]
    fn test_fakeout_spike_never_validates() {
        let mut v = SignalValidator::new(100);
        v.record_at(dec!(0.9), dec!(0.5), 0);
        assert!(!v.is_valid_at(50));
        v.record_at(dec!(0.2), dec!(0.5), 50);
        assert!(!v.is_valid_at(50));
        assert!(!v.is_valid_at(1_000));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut v = SignalValidator::new(0);
        v.record_at(dec!(0.5), dec!(0.5), 1_000);
        assert!(v.is_valid_at(1_000));
    }

    #[test]
    fn test_hot_reload_preserves_clock() {
        let mut v = SignalValidator::new(500);
        v.record_at(dec!(0.8), dec!(0.5), 1_000);
        assert!(!v.is_valid_at(1_200));

        // Shrinking the dwell keeps the original valid-since.
        v.update_config(100);
        assert!(v.is_valid_at(1_200));

        // Growing it re-gates without clearing.
        v.update_config(1_000);
        assert!(!v.is_valid_at(1_200));
        assert!(v.is_valid_at(2_000));
    }

    #[test]
    fn test_sample_ring_is_bounded() {
        let mut v = SignalValidator::new(100);
        for i in 0..250 {
            v.record_at(dec!(0.8), dec!(0.5), i);
        }
        assert_eq!(v.samples().count(), 100);
        // Oldest retained sample is from the 151st record.
        assert_eq!(v.samples().next().unwrap().timestamp_ms, 150);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut v = SignalValidator::new(0);
        v.record_at(dec!(0.8), dec!(0.5), 1_000);
        assert!(v.is_valid_at(1_000));
        v.reset();
        assert!(!v.is_valid_at(2_000));
        assert_eq!(v.samples().count(), 0);
    }
}
