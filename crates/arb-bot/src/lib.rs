//! Cross-exchange perpetual-futures arbitrage bot.
//!
//! For each configured pair the engine watches order books on two venues,
//! detects dislocations that survive realistic execution costs, and takes
//! them incrementally with paired orders sized to what the thinner book
//! can absorb.
//!
//! ## Architecture
//!
//! - **Per-bot task**: one supervisor task per (symbol, venue A, venue B)
//!   triple; all book math, analysis and slicing run synchronously inside
//!   the tick, I/O suspends only at fetch/submit boundaries
//! - **Shared adapters**: bots on the same venue share one adapter handle
//!   through the process-wide registry
//! - **Fire-and-forget observability**: snapshots go out through a
//!   bounded channel, dropped on overflow
//!
//! ## Modules
//!
//! - `analyzer`: spread evaluation, max-profitable sizing, confidence
//! - `validator`: anti-fakeout dwell gate
//! - `execution`: scale-in/scale-out slicing state machine
//! - `bot`: per-pair supervisor driving poll or push feeds
//! - `manager`: multi-bot lifecycle and adapter sharing
//! - `config`: TOML configuration with env overrides
//! - `stats`, `snapshot`: per-bot statistics and observer types

pub mod analyzer;
pub mod bot;
pub mod config;
pub mod execution;
pub mod manager;
pub mod snapshot;
pub mod stats;
pub mod validator;

pub use analyzer::{SpreadAnalyzer, SpreadOpportunity};
pub use bot::{BotCommand, BotHandle, BotSupervisor};
pub use config::{AppConfig, BotConfig, ConfigError};
pub use execution::{
    EntryConfig, ExecutionError, ExecutionManager, ExecutionMode, ExecutionPhase,
    ExecutionStatus, ExitConfig, SliceResult,
};
pub use manager::BotManager;
pub use snapshot::{BookView, BotSnapshot, Observer, ObserverReceiver};
pub use stats::{BotStats, BotStatsSnapshot};
pub use validator::SignalValidator;
