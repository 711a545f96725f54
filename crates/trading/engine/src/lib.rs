//! Execution core for a market-making leg
//!
//! Each leg owns one instrument's book, its execution state and the orders
//! it has working. The [`Engine`] connector feeds legs from the shared
//! market-data and response queues and writes requests through a
//! [`VenueAdapter`].
//!
//! Flow per message:
//! - market data updates the book, LTP and (on BBO change) PNL and thresholds
//! - responses advance the order lifecycle and book fills into the position
//! - every poll evaluates squareoff conditions and works the exit
//!
//! Order IDs are `client_id * 1_000_000 + seq`; responses for other
//! clients are skipped.

#![deny(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod execution;
pub mod leg;
pub mod logging;
pub mod memory;
pub mod position;
pub mod response;
pub mod risk;
pub mod snapshot;
pub mod threshold;
pub mod venue;

// Re-exports
pub use config::{
    EngineConfig, Fees, LegConfig, RiskLimits, ThresholdConfig, TransportBackend, TransportConfig,
};
pub use self::core::{Engine, PollStats};
pub use error::{OrderError, SnapshotError};
pub use execution::{HitType, NewOrder, Order, OrderManager, OrderStatus, TypeOfOrder};
pub use leg::Leg;
pub use memory::SlotPool;
pub use position::{ExecutionState, Thresholds};
pub use risk::{SquareoffController, SquareoffReason};
pub use snapshot::DailyInit;
pub use threshold::ThresholdPolicy;
pub use venue::{Identity, OrderIdMinter, PaperVenue, RequestTemplate, ShmVenue, VenueAdapter};
