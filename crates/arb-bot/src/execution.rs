//! Scale-in / scale-out execution state machine.
//!
//! One episode runs at a time per bot. Entry accumulates toward a target
//! while the spread holds above the arming threshold; exit unwinds a
//! position unconditionally once started. Every slice obeys the Rule of
//! the Weakest: never fire more than the thinner venue can absorb within
//! the slippage bound, and never more than what remains of the target.

use std::collections::VecDeque;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use arb_common::{Orderbook, Side};

use crate::analyzer::SpreadAnalyzer;
use crate::validator::SignalValidator;

/// Retained execution records, newest last.
const EXECUTION_RING_CAPACITY: usize = 100;

/// What the manager is currently working toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Idle,
    Entry,
    Exit,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Idle => write!(f, "idle"),
            ExecutionMode::Entry => write!(f, "entry"),
            ExecutionMode::Exit => write!(f, "exit"),
        }
    }
}

/// Where the current episode stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Idle,
    Executing,
    Completed,
    Paused,
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPhase::Idle => write!(f, "idle"),
            ExecutionPhase::Executing => write!(f, "executing"),
            ExecutionPhase::Completed => write!(f, "completed"),
            ExecutionPhase::Paused => write!(f, "paused"),
        }
    }
}

/// Errors from episode control and hot reload.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The config violates an invariant; the previous config is kept.
    #[error("invalid execution config: {0}")]
    InvalidConfig(String),
}

/// Entry (scale-in) parameters. Hot-reloadable while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Spread at which the validator may arm, percent.
    pub entry_start_pct: Decimal,
    /// Spread at which intensity saturates at 1.0, percent.
    pub entry_full_pct: Decimal,
    /// Base-asset quantity to accumulate.
    pub target_amount: Decimal,
    /// Per-leg walk-the-book slippage cap, percent.
    pub max_slippage_pct: Decimal,
    /// Minimum gap between consecutive fires.
    pub refill_delay_ms: i64,
    /// Anti-fakeout dwell time.
    pub min_validity_ms: i64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            entry_start_pct: dec!(0.5),
            entry_full_pct: dec!(1.0),
            target_amount: dec!(15),
            max_slippage_pct: dec!(0.05),
            refill_delay_ms: 500,
            min_validity_ms: 100,
        }
    }
}

impl EntryConfig {
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.entry_start_pct <= Decimal::ZERO {
            return Err(ExecutionError::InvalidConfig(
                "entry_start_pct must be positive".into(),
            ));
        }
        if self.entry_full_pct < self.entry_start_pct {
            return Err(ExecutionError::InvalidConfig(
                "entry_full_pct must be >= entry_start_pct".into(),
            ));
        }
        if self.target_amount <= Decimal::ZERO {
            return Err(ExecutionError::InvalidConfig(
                "target_amount must be positive".into(),
            ));
        }
        if self.max_slippage_pct <= Decimal::ZERO {
            return Err(ExecutionError::InvalidConfig(
                "max_slippage_pct must be positive".into(),
            ));
        }
        if self.refill_delay_ms < 0 || self.min_validity_ms < 0 {
            return Err(ExecutionError::InvalidConfig(
                "millisecond fields must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Exit (scale-out) parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    pub max_slippage_pct: Decimal,
    pub refill_delay_ms: i64,
    pub min_validity_ms: i64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            max_slippage_pct: dec!(0.05),
            refill_delay_ms: 500,
            min_validity_ms: 100,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.max_slippage_pct <= Decimal::ZERO {
            return Err(ExecutionError::InvalidConfig(
                "max_slippage_pct must be positive".into(),
            ));
        }
        if self.refill_delay_ms < 0 || self.min_validity_ms < 0 {
            return Err(ExecutionError::InvalidConfig(
                "millisecond fields must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// What one tick decided.
#[derive(Debug, Clone, Serialize)]
pub struct SliceResult {
    pub should_execute: bool,
    /// Quantity to fire on both legs.
    pub size: Decimal,
    pub reason: String,
    /// Largest slippage-safe quantity on venue A for this direction.
    pub safe_qty_a: Decimal,
    /// Largest slippage-safe quantity on venue B for this direction.
    pub safe_qty_b: Decimal,
    /// Target still outstanding before this slice.
    pub remaining: Decimal,
    /// True when liquidity, not the target, bounded the slice.
    pub capped_by_liquidity: bool,
}

impl SliceResult {
    fn skip(reason: impl Into<String>, remaining: Decimal) -> Self {
        Self {
            should_execute: false,
            size: Decimal::ZERO,
            reason: reason.into(),
            safe_qty_a: Decimal::ZERO,
            safe_qty_b: Decimal::ZERO,
            remaining,
            capped_by_liquidity: false,
        }
    }
}

/// One recorded fill, for the rolling status window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExecutionRecord {
    pub qty: Decimal,
    pub executed_total: Decimal,
    pub remaining: Decimal,
    pub timestamp_ms: i64,
}

/// Serializable status for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatus {
    pub mode: ExecutionMode,
    pub phase: ExecutionPhase,
    pub target: Decimal,
    pub executed: Decimal,
    pub remaining: Decimal,
    pub progress_pct: Decimal,
    pub slices_executed: u64,
    pub can_fire: bool,
    pub signal_valid: bool,
    pub signal_duration_ms: i64,
    pub entry_config: Option<EntryConfig>,
    pub exit_config: Option<ExitConfig>,
}

/// Unified entry/exit execution manager.
///
/// Owned exclusively by one bot task; every method is synchronous and
/// never suspends. Config writes arrive through the owning task (the
/// supervisor drains its control queue at the top of each tick), so hot
/// reload needs no locking here.
pub struct ExecutionManager {
    analyzer: SpreadAnalyzer,
    mode: ExecutionMode,
    phase: ExecutionPhase,
    entry_config: Option<EntryConfig>,
    exit_config: Option<ExitConfig>,
    target: Decimal,
    executed: Decimal,
    refill_delay_ms: i64,
    last_fire_ms: i64,
    validator: SignalValidator,
    slices_executed: u64,
    executions: VecDeque<ExecutionRecord>,
}

impl ExecutionManager {
    pub fn new(analyzer: SpreadAnalyzer) -> Self {
        Self {
            analyzer,
            mode: ExecutionMode::Idle,
            phase: ExecutionPhase::Idle,
            entry_config: None,
            exit_config: None,
            target: Decimal::ZERO,
            executed: Decimal::ZERO,
            refill_delay_ms: 500,
            last_fire_ms: 0,
            validator: SignalValidator::new(100),
            slices_executed: 0,
            executions: VecDeque::with_capacity(EXECUTION_RING_CAPACITY),
        }
    }

    #[inline]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[inline]
    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    #[inline]
    pub fn executed(&self) -> Decimal {
        self.executed
    }

    #[inline]
    pub fn remaining(&self) -> Decimal {
        self.target - self.executed
    }

    /// Begin a scale-in episode toward `config.target_amount`.
    pub fn start_entry(&mut self, config: EntryConfig) -> Result<(), ExecutionError> {
        config.validate()?;
        self.mode = ExecutionMode::Entry;
        self.phase = ExecutionPhase::Executing;
        self.target = config.target_amount;
        self.executed = Decimal::ZERO;
        self.refill_delay_ms = config.refill_delay_ms;
        self.last_fire_ms = 0;
        self.slices_executed = 0;
        self.executions.clear();
        self.validator = SignalValidator::new(config.min_validity_ms);
        info!(
            target = %config.target_amount,
            start = %config.entry_start_pct,
            full = %config.entry_full_pct,
            "entry started"
        );
        self.entry_config = Some(config);
        Ok(())
    }

    /// Begin a scale-out episode unwinding `position_size`.
    pub fn start_exit(
        &mut self,
        position_size: Decimal,
        config: ExitConfig,
    ) -> Result<(), ExecutionError> {
        config.validate()?;
        if position_size <= Decimal::ZERO {
            return Err(ExecutionError::InvalidConfig(
                "position_size must be positive".into(),
            ));
        }
        self.mode = ExecutionMode::Exit;
        self.phase = ExecutionPhase::Executing;
        self.target = position_size;
        self.executed = Decimal::ZERO;
        self.refill_delay_ms = config.refill_delay_ms;
        self.last_fire_ms = 0;
        self.slices_executed = 0;
        self.executions.clear();
        self.validator = SignalValidator::new(config.min_validity_ms);
        info!(position = %position_size, "exit started");
        self.exit_config = Some(config);
        Ok(())
    }

    /// Hot-reload entry parameters. A rejected config leaves the previous
    /// one in place. The validator keeps its clock across the reload.
    pub fn update_entry_config(&mut self, config: EntryConfig) -> Result<(), ExecutionError> {
        config.validate()?;
        self.refill_delay_ms = config.refill_delay_ms;
        self.validator.update_config(config.min_validity_ms);

        if self.mode == ExecutionMode::Entry {
            // A lowered target never claws back fills already done.
            self.target = config.target_amount;
            if self.phase == ExecutionPhase::Executing && self.executed >= self.target {
                self.phase = ExecutionPhase::Completed;
                info!(executed = %self.executed, "target lowered below executed, entry completed");
            }
        }
        debug!(target = %config.target_amount, refill_ms = config.refill_delay_ms, "entry config updated");
        self.entry_config = Some(config);
        Ok(())
    }

    /// Hot-reload exit parameters.
    pub fn update_exit_config(&mut self, config: ExitConfig) -> Result<(), ExecutionError> {
        config.validate()?;
        self.refill_delay_ms = config.refill_delay_ms;
        self.validator.update_config(config.min_validity_ms);
        debug!(refill_ms = config.refill_delay_ms, "exit config updated");
        self.exit_config = Some(config);
        Ok(())
    }

    /// True once the refill delay has elapsed since the last fire.
    /// Always true before the first fire of an episode.
    pub fn can_fire(&self) -> bool {
        self.can_fire_at(Utc::now().timestamp_millis())
    }

    /// Tick entry point: evaluate the books and decide the next slice.
    ///
    /// Returns None while gated (wrong phase, refill delay, invalid
    /// signal) and a [`SliceResult`] otherwise - which may itself say
    /// "don't execute" when liquidity is insufficient.
    pub fn update(
        &mut self,
        spread: Decimal,
        ob_a: &Orderbook,
        ob_b: &Orderbook,
    ) -> Option<SliceResult> {
        self.update_at(spread, ob_a, ob_b, Utc::now().timestamp_millis())
    }

    /// Record the outcome of the supervisor's paired submission.
    pub fn record_execution(&mut self, qty: Decimal, success: bool) {
        self.record_execution_at(qty, success, Utc::now().timestamp_millis());
    }

    /// Compute the next slice for the given direction under the Rule of
    /// the Weakest: `min(safe_qty_a, safe_qty_b, remaining)`.
    ///
    /// `direction` is the action on venue A; venue B always takes the
    /// opposite leg.
    pub fn calculate_next_slice(
        &self,
        ob_a: &Orderbook,
        ob_b: &Orderbook,
        direction: Side,
        max_slippage_pct: Decimal,
    ) -> SliceResult {
        let remaining = self.remaining();
        if remaining <= Decimal::ZERO {
            return SliceResult::skip("no remaining target", remaining);
        }

        let max_slippage_bps = max_slippage_pct * Decimal::ONE_HUNDRED;
        let (safe_qty_a, safe_qty_b) = match direction {
            Side::Buy => (
                self.analyzer.max_safe_qty(ob_a, Side::Buy, max_slippage_bps),
                self.analyzer.max_safe_qty(ob_b, Side::Sell, max_slippage_bps),
            ),
            Side::Sell => (
                self.analyzer.max_safe_qty(ob_a, Side::Sell, max_slippage_bps),
                self.analyzer.max_safe_qty(ob_b, Side::Buy, max_slippage_bps),
            ),
        };

        let slice = safe_qty_a.min(safe_qty_b).min(remaining);
        if slice <= Decimal::ZERO {
            return SliceResult {
                should_execute: false,
                size: Decimal::ZERO,
                reason: "insufficient liquidity on both sides".into(),
                safe_qty_a,
                safe_qty_b,
                remaining,
                capped_by_liquidity: false,
            };
        }

        SliceResult {
            should_execute: true,
            size: slice,
            reason: format!("slice {slice} (A:{safe_qty_a}, B:{safe_qty_b})"),
            safe_qty_a,
            safe_qty_b,
            remaining,
            capped_by_liquidity: slice < remaining,
        }
    }

    /// Fire-size fraction for the current spread: zero at or below the
    /// arming threshold, 1.0 at or above saturation, and a linear ramp
    /// from the 10% floor in between.
    pub fn entry_intensity(&self, spread: Decimal) -> Decimal {
        let Some(config) = &self.entry_config else {
            return Decimal::ONE;
        };
        let start = config.entry_start_pct;
        let full = config.entry_full_pct;

        if spread <= start {
            return Decimal::ZERO;
        }
        if spread >= full {
            return Decimal::ONE;
        }
        let progress = (spread - start) / (full - start);
        dec!(0.1) + dec!(0.9) * progress
    }

    /// Pause a running episode (e.g. after a failed cancel leaves an
    /// unhedged leg). No slices are produced until `resume`.
    pub fn pause(&mut self) {
        if self.phase == ExecutionPhase::Executing {
            self.phase = ExecutionPhase::Paused;
            info!("execution paused");
        }
    }

    pub fn resume(&mut self) {
        if self.phase == ExecutionPhase::Paused {
            self.phase = ExecutionPhase::Executing;
            info!("execution resumed");
        }
    }

    /// Back to idle; clears the episode and the validator.
    pub fn reset(&mut self) {
        self.mode = ExecutionMode::Idle;
        self.phase = ExecutionPhase::Idle;
        self.entry_config = None;
        self.exit_config = None;
        self.target = Decimal::ZERO;
        self.executed = Decimal::ZERO;
        self.last_fire_ms = 0;
        self.slices_executed = 0;
        self.executions.clear();
        self.validator.reset();
    }

    /// Point-in-time status for snapshots.
    pub fn get_status(&self) -> ExecutionStatus {
        let progress_pct = if self.target > Decimal::ZERO {
            (self.executed / self.target) * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        ExecutionStatus {
            mode: self.mode,
            phase: self.phase,
            target: self.target,
            executed: self.executed,
            remaining: self.remaining(),
            progress_pct,
            slices_executed: self.slices_executed,
            can_fire: self.can_fire(),
            signal_valid: self.validator.is_valid(),
            signal_duration_ms: self.validator.duration_ms(),
            entry_config: self.entry_config.clone(),
            exit_config: self.exit_config.clone(),
        }
    }

    /// Rolling window of recorded fills, oldest first.
    pub fn executions(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.executions.iter()
    }

    fn can_fire_at(&self, now_ms: i64) -> bool {
        if self.last_fire_ms == 0 {
            return true;
        }
        now_ms - self.last_fire_ms >= self.refill_delay_ms
    }

    pub(crate) fn update_at(
        &mut self,
        spread: Decimal,
        ob_a: &Orderbook,
        ob_b: &Orderbook,
        now_ms: i64,
    ) -> Option<SliceResult> {
        if self.phase != ExecutionPhase::Executing {
            return None;
        }
        if self.remaining() <= Decimal::ZERO {
            self.phase = ExecutionPhase::Completed;
            info!(mode = %self.mode, executed = %self.executed, "episode completed");
            return None;
        }
        if !self.can_fire_at(now_ms) {
            return None;
        }

        match self.mode {
            ExecutionMode::Entry => {
                let config = self.entry_config.clone()?;
                self.validator
                    .record_at(spread, config.entry_start_pct, now_ms);
                if !self.validator.is_valid_at(now_ms) {
                    return None;
                }

                let mut result = self.calculate_next_slice(
                    ob_a,
                    ob_b,
                    Side::Buy,
                    config.max_slippage_pct,
                );
                if result.should_execute {
                    let intensity = self.entry_intensity(spread);
                    result.size *= intensity;
                    debug!(
                        size = %result.size,
                        %spread,
                        %intensity,
                        "entry slice ready"
                    );
                }
                Some(result)
            }
            ExecutionMode::Exit => {
                let config = self.exit_config.clone()?;
                let result = self.calculate_next_slice(
                    ob_a,
                    ob_b,
                    Side::Sell,
                    config.max_slippage_pct,
                );
                if result.should_execute {
                    debug!(size = %result.size, "exit slice ready");
                }
                Some(result)
            }
            ExecutionMode::Idle => None,
        }
    }

    pub(crate) fn record_execution_at(&mut self, qty: Decimal, success: bool, now_ms: i64) {
        if !success || qty <= Decimal::ZERO {
            return;
        }
        self.executed += qty;
        self.last_fire_ms = now_ms;
        self.slices_executed += 1;

        if self.executions.len() == EXECUTION_RING_CAPACITY {
            self.executions.pop_front();
        }
        self.executions.push_back(ExecutionRecord {
            qty,
            executed_total: self.executed,
            remaining: self.remaining(),
            timestamp_ms: now_ms,
        });

        if self.remaining() <= Decimal::ZERO {
            self.phase = ExecutionPhase::Completed;
            info!(mode = %self.mode, executed = %self.executed, "episode completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_common::PriceLevel;

    fn deep_book(exchange: &str, bid: Decimal, ask: Decimal) -> Orderbook {
        let mut ob = Orderbook::new(exchange, "ETH-USD");
        ob.bids.push(PriceLevel::new(bid, dec!(100)));
        ob.asks.push(PriceLevel::new(ask, dec!(100)));
        ob.timestamp_ms = 1_700_000_000_000;
        ob
    }

    fn manager_with_entry(config: EntryConfig) -> ExecutionManager {
        let mut mgr = ExecutionManager::new(SpreadAnalyzer::new(dec!(5), dec!(5)));
        mgr.start_entry(config).unwrap();
        mgr
    }

    fn instant_entry() -> EntryConfig {
        EntryConfig {
            min_validity_ms: 0,
            ..EntryConfig::default()
        }
    }

    #[test]
    fn test_config_validation() {
        let bad = EntryConfig {
            entry_start_pct: dec!(1.0),
            entry_full_pct: dec!(0.5),
            ..EntryConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = EntryConfig {
            target_amount: Decimal::ZERO,
            ..EntryConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = EntryConfig {
            refill_delay_ms: -1,
            ..EntryConfig::default()
        };
        assert!(bad.validate().is_err());

        assert!(EntryConfig::default().validate().is_ok());
        assert!(ExitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_start_entry_resets_state() {
        let mut mgr = manager_with_entry(instant_entry());
        assert_eq!(mgr.mode(), ExecutionMode::Entry);
        assert_eq!(mgr.phase(), ExecutionPhase::Executing);
        assert_eq!(mgr.executed(), Decimal::ZERO);
        assert_eq!(mgr.remaining(), dec!(15));

        mgr.record_execution_at(dec!(5), true, 1_000);
        assert_eq!(mgr.executed(), dec!(5));

        // Restarting clears progress.
        mgr.start_entry(instant_entry()).unwrap();
        assert_eq!(mgr.executed(), Decimal::ZERO);
        assert_eq!(mgr.phase(), ExecutionPhase::Executing);
    }

    #[test]
    fn test_rejected_start_keeps_idle() {
        let mut mgr = ExecutionManager::new(SpreadAnalyzer::default());
        let bad = EntryConfig {
            max_slippage_pct: Decimal::ZERO,
            ..EntryConfig::default()
        };
        assert!(mgr.start_entry(bad).is_err());
        assert_eq!(mgr.mode(), ExecutionMode::Idle);
        assert_eq!(mgr.phase(), ExecutionPhase::Idle);
    }

    #[test]
    fn test_rule_of_the_weakest() {
        let mut a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        a.asks[0].size = dec!(3); // thin buy side

        let mgr = manager_with_entry(instant_entry());
        let slice = mgr.calculate_next_slice(&a, &b, Side::Buy, dec!(0.05));
        assert!(slice.should_execute);
        assert_eq!(slice.size, dec!(3));
        assert_eq!(slice.safe_qty_a, dec!(3));
        assert!(slice.capped_by_liquidity);
        assert!(slice.size <= slice.safe_qty_a.min(slice.safe_qty_b).min(slice.remaining));
    }

    #[test]
    fn test_slice_bounded_by_remaining() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));

        let mut mgr = manager_with_entry(instant_entry());
        mgr.record_execution_at(dec!(13), true, 1_000);
        // remaining = 2, both sides could absorb 100
        let slice = mgr.calculate_next_slice(&a, &b, Side::Buy, dec!(0.05));
        assert_eq!(slice.size, dec!(2));
        assert!(!slice.capped_by_liquidity);
    }

    #[test]
    fn test_insufficient_liquidity() {
        let mut a = deep_book("a", dec!(99.9), dec!(100));
        a.asks.clear();
        let b = deep_book("b", dec!(101), dec!(101.1));

        let mgr = manager_with_entry(instant_entry());
        let slice = mgr.calculate_next_slice(&a, &b, Side::Buy, dec!(0.05));
        assert!(!slice.should_execute);
        assert_eq!(slice.size, Decimal::ZERO);
        assert!(slice.reason.contains("insufficient liquidity"));
    }

    #[test]
    fn test_refill_gate() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = manager_with_entry(EntryConfig {
            min_validity_ms: 0,
            refill_delay_ms: 500,
            ..EntryConfig::default()
        });

        // Spread ~1% >= start; first tick fires.
        let first = mgr.update_at(dec!(1.0), &a, &b, 1_000).unwrap();
        assert!(first.should_execute);
        mgr.record_execution_at(first.size, true, 1_000);

        // 100ms later: refill delay gates.
        assert!(mgr.update_at(dec!(1.0), &a, &b, 1_100).is_none());
        // At 500ms past the fire the gate opens again.
        assert!(mgr.update_at(dec!(1.0), &a, &b, 1_500).is_some());
    }

    #[test]
    fn test_anti_fakeout_gates_entry() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = manager_with_entry(EntryConfig {
            min_validity_ms: 100,
            ..EntryConfig::default()
        });

        // Crossing at t=0: not valid yet.
        assert!(mgr.update_at(dec!(1.0), &a, &b, 0).is_none());
        // Spike dies at t=50.
        mgr.update_at(dec!(0.1), &a, &b, 50);
        // Even much later nothing fires without a fresh dwell.
        assert!(mgr.update_at(dec!(0.1), &a, &b, 1_000).is_none());

        // A sustained signal passes.
        assert!(mgr.update_at(dec!(1.0), &a, &b, 2_000).is_none());
        let slice = mgr.update_at(dec!(1.0), &a, &b, 2_100).unwrap();
        assert!(slice.should_execute);
    }

    #[test]
    fn test_intensity_ramp() {
        let mgr = manager_with_entry(instant_entry());
        // start=0.5, full=1.0
        assert_eq!(mgr.entry_intensity(dec!(0.3)), Decimal::ZERO);
        assert_eq!(mgr.entry_intensity(dec!(0.5)), Decimal::ZERO);
        assert_eq!(mgr.entry_intensity(dec!(0.75)), dec!(0.55));
        assert_eq!(mgr.entry_intensity(dec!(1.0)), Decimal::ONE);
        assert_eq!(mgr.entry_intensity(dec!(1.5)), Decimal::ONE);
        // Just above the arming threshold the floor applies.
        let near_start = mgr.entry_intensity(dec!(0.501));
        assert!(near_start > dec!(0.1) && near_start < dec!(0.11));
    }

    #[test]
    fn test_intensity_monotone() {
        let mgr = manager_with_entry(instant_entry());
        let mut prev = Decimal::ZERO;
        for spread in [
            dec!(0.5),
            dec!(0.55),
            dec!(0.6),
            dec!(0.7),
            dec!(0.85),
            dec!(0.99),
            dec!(1.0),
            dec!(2.0),
        ] {
            let i = mgr.entry_intensity(spread);
            assert!(i >= prev, "intensity must be monotone");
            assert!(i >= Decimal::ZERO && i <= Decimal::ONE);
            prev = i;
        }
    }

    #[test]
    fn test_update_scales_by_intensity() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = manager_with_entry(instant_entry());

        // Spread 0.75% -> intensity 0.55; raw slice = remaining = 15.
        let slice = mgr.update_at(dec!(0.75), &a, &b, 0).unwrap();
        assert!(slice.should_execute);
        assert_eq!(slice.size, dec!(15) * dec!(0.55));
    }

    #[test]
    fn test_target_completion() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = manager_with_entry(EntryConfig {
            target_amount: dec!(10),
            min_validity_ms: 0,
            refill_delay_ms: 0,
            ..EntryConfig::default()
        });

        for (i, qty) in [dec!(3), dec!(3), dec!(3), dec!(1)].iter().enumerate() {
            assert_eq!(mgr.phase(), ExecutionPhase::Executing);
            mgr.record_execution_at(*qty, true, (i as i64 + 1) * 1_000);
        }
        assert_eq!(mgr.phase(), ExecutionPhase::Completed);
        assert_eq!(mgr.executed(), dec!(10));
        assert_eq!(mgr.slices_executed, 4);

        // Further ticks are inert.
        assert!(mgr.update_at(dec!(2.0), &a, &b, 10_000).is_none());
    }

    #[test]
    fn test_failed_execution_changes_nothing() {
        let mut mgr = manager_with_entry(instant_entry());
        mgr.record_execution_at(dec!(5), false, 1_000);
        mgr.record_execution_at(Decimal::ZERO, true, 1_000);
        assert_eq!(mgr.executed(), Decimal::ZERO);
        assert_eq!(mgr.slices_executed, 0);
        // last_fire untouched: still allowed to fire immediately.
        assert!(mgr.can_fire_at(1_001));
    }

    #[test]
    fn test_hot_reload_target_shrink_completes() {
        let mut mgr = manager_with_entry(instant_entry());
        mgr.record_execution_at(dec!(8), true, 1_000);

        let lowered = EntryConfig {
            target_amount: dec!(5),
            ..instant_entry()
        };
        mgr.update_entry_config(lowered).unwrap();
        assert_eq!(mgr.phase(), ExecutionPhase::Completed);
        // Executed is never clawed back.
        assert_eq!(mgr.executed(), dec!(8));
    }

    #[test]
    fn test_hot_reload_rejects_invalid_and_keeps_previous() {
        let mut mgr = manager_with_entry(instant_entry());
        let bad = EntryConfig {
            entry_full_pct: dec!(0.1),
            ..instant_entry()
        };
        assert!(mgr.update_entry_config(bad).is_err());
        // Previous config still in force.
        let status = mgr.get_status();
        assert_eq!(
            status.entry_config.unwrap().entry_full_pct,
            dec!(1.0)
        );
    }

    #[test]
    fn test_hot_reload_refill_delay_immediate() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = manager_with_entry(EntryConfig {
            min_validity_ms: 0,
            refill_delay_ms: 10_000,
            ..EntryConfig::default()
        });

        let first = mgr.update_at(dec!(1.0), &a, &b, 1_000).unwrap();
        mgr.record_execution_at(first.size, true, 1_000);
        assert!(mgr.update_at(dec!(1.0), &a, &b, 1_600).is_none());

        mgr.update_entry_config(EntryConfig {
            min_validity_ms: 0,
            refill_delay_ms: 500,
            ..EntryConfig::default()
        })
        .unwrap();
        assert!(mgr.update_at(dec!(1.0), &a, &b, 1_600).is_some());
    }

    #[test]
    fn test_pause_resume() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = manager_with_entry(instant_entry());

        mgr.pause();
        assert_eq!(mgr.phase(), ExecutionPhase::Paused);
        assert!(mgr.update_at(dec!(1.0), &a, &b, 1_000).is_none());

        mgr.resume();
        assert_eq!(mgr.phase(), ExecutionPhase::Executing);
        assert!(mgr.update_at(dec!(1.0), &a, &b, 2_000).is_some());
    }

    #[test]
    fn test_exit_fires_without_ramp_or_validator() {
        let a = deep_book("a", dec!(99.9), dec!(100));
        let b = deep_book("b", dec!(101), dec!(101.1));
        let mut mgr = ExecutionManager::new(SpreadAnalyzer::new(dec!(5), dec!(5)));
        mgr.start_exit(dec!(10), ExitConfig::default()).unwrap();
        assert_eq!(mgr.mode(), ExecutionMode::Exit);

        // Fires immediately even with a negative spread.
        let slice = mgr.update_at(dec!(-2.0), &a, &b, 0).unwrap();
        assert!(slice.should_execute);
        assert_eq!(slice.size, dec!(10));
    }

    #[test]
    fn test_exit_requires_position() {
        let mut mgr = ExecutionManager::new(SpreadAnalyzer::default());
        assert!(mgr.start_exit(Decimal::ZERO, ExitConfig::default()).is_err());
        assert_eq!(mgr.mode(), ExecutionMode::Idle);
    }

    #[test]
    fn test_execution_ring_bounded() {
        let mut mgr = manager_with_entry(EntryConfig {
            target_amount: dec!(1_000_000),
            min_validity_ms: 0,
            refill_delay_ms: 0,
            ..EntryConfig::default()
        });
        for i in 0..150 {
            mgr.record_execution_at(dec!(1), true, i);
        }
        assert_eq!(mgr.executions().count(), 100);
        assert_eq!(mgr.executed(), dec!(150));
    }

    #[test]
    fn test_reset() {
        let mut mgr = manager_with_entry(instant_entry());
        mgr.record_execution_at(dec!(5), true, 1_000);
        mgr.reset();
        assert_eq!(mgr.mode(), ExecutionMode::Idle);
        assert_eq!(mgr.phase(), ExecutionPhase::Idle);
        assert_eq!(mgr.executed(), Decimal::ZERO);
        assert_eq!(mgr.remaining(), Decimal::ZERO);
    }

    #[test]
    fn test_status_snapshot() {
        let mut mgr = manager_with_entry(instant_entry());
        mgr.record_execution_at(dec!(3), true, 1_000);
        let status = mgr.get_status();
        assert_eq!(status.mode, ExecutionMode::Entry);
        assert_eq!(status.target, dec!(15));
        assert_eq!(status.executed, dec!(3));
        assert_eq!(status.remaining, dec!(12));
        assert_eq!(status.progress_pct, dec!(20));
        assert_eq!(status.slices_executed, 1);
    }
}
