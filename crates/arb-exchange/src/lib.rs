//! Venue adapters for the cross-exchange arbitrage engine.
//!
//! The engine consumes every venue through the [`ExchangeAdapter`] trait:
//! order-book snapshots (polled or pushed), balances, order submission
//! and cancellation, and latency telemetry. Concrete adapters own their
//! transports; the core never sees a venue's wire format.
//!
//! ## Modules
//!
//! - `adapter`: the contract (`ExchangeAdapter`, `AdapterError`)
//! - `registry`: process-wide shared adapter handles
//! - `paradex`: Paradex REST adapter
//! - `extended`: Extended REST + WebSocket push adapter
//! - `mock`: scripted in-memory adapter for tests and demos

pub mod adapter;
pub mod extended;
pub mod mock;
pub mod paradex;
pub mod registry;

pub use adapter::{AdapterError, BookReceiver, ExchangeAdapter};
pub use extended::ExtendedAdapter;
pub use mock::MockAdapter;
pub use paradex::ParadexAdapter;
pub use registry::{AdapterRegistry, VenueCredentials};
