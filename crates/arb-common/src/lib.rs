//! Shared types for the cross-exchange perpetual-futures arbitrage engine.
//!
//! CRITICAL: All prices and quantities use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math. The only f64 in this crate is
//! wall-clock latency in milliseconds.

pub mod book;
pub mod latency;
pub mod types;

pub use book::{Orderbook, PriceLevel};
pub use latency::{LatencyStats, LatencySummary};
pub use types::{Balance, Order, OrderStatus, Side};
