//! Instrument book
//!
//! Best-20 bid/ask ladder per traded symbol, refreshed from market-data
//! records, plus the static contract parameters every PNL and sizing
//! calculation reads.

#![deny(clippy::all)]

pub mod contract;
pub mod instrument;

pub use contract::ContractSpec;
pub use instrument::{Instrument, Level};
