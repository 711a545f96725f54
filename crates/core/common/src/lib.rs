//! Common types shared by every crate of the execution core
//!
//! - [`types`]: price key, side and timestamp
//! - [`wire`]: fixed-layout records exchanged with the order-routing process
//! - [`enums`]: typed views of wire discriminants
//! - [`layout`]: the counterparty's offset table, checked in tests

#![deny(clippy::all)]

pub mod enums;
pub mod layout;
pub mod types;
pub mod wire;

pub use enums::{
    ExchangeType, FeedType, MdExchange, OpenCloseType, OrderDuration, OrderType,
    PositionDirection, PriceType, RequestType, ResponseType, SubResponseType, TsExchangeId,
    WireError,
};
pub use types::{Px, Side, Ts};
pub use wire::{
    BookElement, ContractDescription, INTEREST_LEVELS, MarketUpdate, MdDataPart, MdHeaderPart,
    RequestMsg, ResponseMsg,
};
