//! Counterparty layout table
//!
//! Offsets and sizes as compiled by the order-routing process (GCC, x86-64).
//! The test module checks every row against the Rust definitions, and the
//! `const` block below fails the build if a total size drifts.

use crate::wire::{
    BookElement, ContractDescription, MarketUpdate, MdDataPart, MdHeaderPart, RequestMsg,
    ResponseMsg,
};
use std::mem::{align_of, size_of};

/// One field of a counterparty record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub record: &'static str,
    pub field: &'static str,
    pub offset: usize,
    pub size: usize,
}

const fn f(record: &'static str, field: &'static str, offset: usize, size: usize) -> FieldLayout {
    FieldLayout {
        record,
        field,
        offset,
        size,
    }
}

/// Total record sizes on the counterparty side
pub const RECORD_SIZES: &[(&str, usize)] = &[
    ("BookElement", 16),
    ("ContractDescription", 96),
    ("RequestMsg", 256),
    ("ResponseMsg", 176),
    ("MDHeaderPart", 96),
    ("MDDataPart", 720),
    ("MarketUpdateNew", 816),
];

/// Queue element sizes (`payload + u64 tag`, padded to payload alignment)
pub const QUEUE_ELEM_SIZES: &[(&str, usize)] = &[
    ("MarketUpdateNew", 824),
    ("ResponseMsg", 184),
    ("RequestMsg", 320),
];

pub const FIELDS: &[FieldLayout] = &[
    f("BookElement", "quantity", 0, 4),
    f("BookElement", "orderCount", 4, 4),
    f("BookElement", "price", 8, 8),
    f("ContractDescription", "InstrumentName", 0, 32),
    f("ContractDescription", "Symbol", 32, 50),
    f("ContractDescription", "ExpiryDate", 84, 4),
    f("ContractDescription", "StrikePrice", 88, 4),
    f("ContractDescription", "OptionType", 92, 2),
    f("ContractDescription", "CALevel", 94, 2),
    f("RequestMsg", "Contract_Description", 0, 96),
    f("RequestMsg", "Request_Type", 96, 4),
    f("RequestMsg", "OrdType", 100, 4),
    f("RequestMsg", "Duration", 104, 4),
    f("RequestMsg", "PxType", 108, 4),
    f("RequestMsg", "PosDirection", 112, 4),
    f("RequestMsg", "OrderID", 116, 4),
    f("RequestMsg", "Token", 120, 4),
    f("RequestMsg", "Quantity", 124, 4),
    f("RequestMsg", "QuantityFilled", 128, 4),
    f("RequestMsg", "DisclosedQnty", 132, 4),
    f("RequestMsg", "Price", 136, 8),
    f("RequestMsg", "TimeStamp", 144, 8),
    f("RequestMsg", "AccountID", 152, 11),
    f("RequestMsg", "Transaction_Type", 163, 1),
    f("RequestMsg", "Exchange_Type", 164, 1),
    f("RequestMsg", "padding", 165, 20),
    f("RequestMsg", "Product", 185, 32),
    f("RequestMsg", "StrategyID", 220, 4),
    f("ResponseMsg", "Response_Type", 0, 4),
    f("ResponseMsg", "Child_Response", 4, 4),
    f("ResponseMsg", "OrderID", 8, 4),
    f("ResponseMsg", "ErrorCode", 12, 4),
    f("ResponseMsg", "Quantity", 16, 4),
    f("ResponseMsg", "Price", 24, 8),
    f("ResponseMsg", "TimeStamp", 32, 8),
    f("ResponseMsg", "Side", 40, 1),
    f("ResponseMsg", "Symbol", 41, 50),
    f("ResponseMsg", "AccountID", 91, 11),
    f("ResponseMsg", "ExchangeOrderId", 104, 8),
    f("ResponseMsg", "ExchangeTradeId", 112, 21),
    f("ResponseMsg", "OpenClose", 133, 1),
    f("ResponseMsg", "ExchangeID", 134, 1),
    f("ResponseMsg", "Product", 135, 32),
    f("ResponseMsg", "StrategyID", 168, 4),
    f("MDHeaderPart", "m_exchTS", 0, 8),
    f("MDHeaderPart", "m_timestamp", 8, 8),
    f("MDHeaderPart", "m_seqnum", 16, 8),
    f("MDHeaderPart", "m_rptseqnum", 24, 8),
    f("MDHeaderPart", "m_tokenId", 32, 8),
    f("MDHeaderPart", "m_symbol", 40, 48),
    f("MDHeaderPart", "m_symbolID", 88, 2),
    f("MDHeaderPart", "m_exchangeName", 90, 1),
    f("MDDataPart", "m_newPrice", 0, 8),
    f("MDDataPart", "m_oldPrice", 8, 8),
    f("MDDataPart", "m_lastTradedPrice", 16, 8),
    f("MDDataPart", "m_lastTradedTime", 24, 8),
    f("MDDataPart", "m_totalTradedValue", 32, 8),
    f("MDDataPart", "m_totalTradedQuantity", 40, 8),
    f("MDDataPart", "m_yield", 48, 8),
    f("MDDataPart", "m_bidUpdates", 56, 320),
    f("MDDataPart", "m_askUpdates", 376, 320),
    f("MDDataPart", "m_newQuant", 696, 4),
    f("MDDataPart", "m_oldQuant", 700, 4),
    f("MDDataPart", "m_lastTradedQuantity", 704, 4),
    f("MDDataPart", "m_validBids", 708, 1),
    f("MDDataPart", "m_validAsks", 709, 1),
    f("MDDataPart", "m_updateLevel", 710, 1),
    f("MDDataPart", "m_endPkt", 711, 1),
    f("MDDataPart", "m_side", 712, 1),
    f("MDDataPart", "m_updateType", 713, 1),
    f("MDDataPart", "m_feedType", 714, 1),
    f("MarketUpdateNew", "MDHeaderPart", 0, 96),
    f("MarketUpdateNew", "MDDataPart", 96, 720),
];

const _: () = {
    assert!(size_of::<BookElement>() == 16);
    assert!(size_of::<ContractDescription>() == 96);
    assert!(size_of::<RequestMsg>() == 256);
    assert!(align_of::<RequestMsg>() == 64);
    assert!(size_of::<ResponseMsg>() == 176);
    assert!(size_of::<MdHeaderPart>() == 96);
    assert!(size_of::<MdDataPart>() == 720);
    assert!(size_of::<MarketUpdate>() == 816);
};

/// Look up a counterparty field
#[must_use]
pub fn field(record: &str, name: &str) -> Option<&'static FieldLayout> {
    FIELDS
        .iter()
        .find(|f| f.record == record && f.field == name)
}
