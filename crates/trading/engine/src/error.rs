//! Engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Local validation failures on order instructions
///
/// Nothing is sent to the router when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// Another order already rests at this price on this side
    #[error("order {existing} already rests at {price} on this side")]
    DuplicatePrice {
        /// Price requested
        price: f64,
        /// Order occupying the price
        existing: u32,
    },

    /// A modify for this order is still waiting for its confirm
    #[error("modify already pending for order {0}")]
    ModifyPending(u32),

    #[error("order {0} not found")]
    NotFound(u32),

    /// Cancel requested while the order is not in a confirmed state
    #[error("order {order_id} cannot be cancelled in state {status}")]
    InvalidState {
        /// Target order
        order_id: u32,
        /// Current status name
        status: &'static str,
    },

    /// Non-positive quantity or price
    #[error("invalid order: qty {qty} price {price}")]
    InvalidOrder {
        /// Requested quantity
        qty: i64,
        /// Requested price
        price: f64,
    },

    /// The venue could not take the request
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

/// Daily snapshot file errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error on {path}: {source}")]
    Io {
        /// Snapshot file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Header plus at least one data line are required
    #[error("snapshot {0} needs a header and a data line")]
    Truncated(PathBuf),

    #[error("strategy {strategy_id} not found in {path}")]
    StrategyNotFound {
        /// Snapshot file
        path: PathBuf,
        /// Strategy looked up
        strategy_id: i32,
    },

    /// A column could not be parsed
    #[error("bad value {value:?} for column {column} in {path}")]
    BadValue {
        /// Snapshot file
        path: PathBuf,
        /// Header name
        column: &'static str,
        /// Raw token
        value: String,
    },
}
