//! Fixed-layout records exchanged with the order-routing process
//!
//! Every struct here is `#[repr(C)]` with explicit padding so that size and
//! field offsets are identical to the counterparty's x86-64 layout. Padding
//! is spelled out as named byte arrays; zeroed constructors keep it zero so
//! records are bit-identical after a round trip through shared memory.
//! Enumerated fields are stored raw, see [`crate::enums`] for typed access.

use crate::enums::{
    ExchangeType, OrderDuration, OrderType, PositionDirection, PriceType, RequestType,
    ResponseType, WireError,
};
use crate::types::Side;

/// Depth of the bid/ask ladders carried by a market update
pub const INTEREST_LEVELS: usize = 20;
pub const MAX_SYMBOL_SIZE: usize = 50;
pub const MAX_ACCOUNT_ID_LEN: usize = 10;
pub const MAX_INSTR_NAME_SIZE: usize = 32;
pub const MAX_TRADE_ID_SIZE: usize = 21;
pub const MAX_PRODUCT_SIZE: usize = 32;
/// Symbol field width inside the market-data header
pub const MD_SYMBOL_SIZE: usize = MAX_SYMBOL_SIZE - 2;

/// Copy `src` into a NUL-padded fixed field, truncating so at least one
/// trailing NUL remains.
pub fn write_fixed(dst: &mut [u8], src: &str) {
    dst.fill(0);
    let n = src.len().min(dst.len().saturating_sub(1));
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
}

/// Read a NUL-terminated fixed field; invalid UTF-8 reads as empty
#[must_use]
pub fn read_fixed(src: &[u8]) -> &str {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    std::str::from_utf8(&src[..end]).unwrap_or("")
}

/// Instrument description embedded at the start of every request
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractDescription {
    pub instrument_name: [u8; MAX_INSTR_NAME_SIZE],
    pub symbol: [u8; MAX_SYMBOL_SIZE],
    pub _pad0: [u8; 2],
    pub expiry_date: i32,
    pub strike_price: i32,
    pub option_type: [u8; 2],
    pub ca_level: i16,
}

impl ContractDescription {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            instrument_name: [0; MAX_INSTR_NAME_SIZE],
            symbol: [0; MAX_SYMBOL_SIZE],
            _pad0: [0; 2],
            expiry_date: 0,
            strike_price: 0,
            option_type: [0; 2],
            ca_level: 0,
        }
    }
}

impl Default for ContractDescription {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Order instruction sent to the order-routing process (256 bytes, 64-aligned)
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestMsg {
    pub contract: ContractDescription,
    pub request_type: i32,
    pub ord_type: i32,
    pub duration: i32,
    pub px_type: i32,
    pub pos_direction: i32,
    pub order_id: u32,
    pub token: i32,
    pub quantity: i32,
    pub quantity_filled: i32,
    pub disclosed_qnty: i32,
    pub price: f64,
    pub timestamp: u64,
    pub account_id: [u8; MAX_ACCOUNT_ID_LEN + 1],
    pub transaction_type: u8,
    pub exchange_type: u8,
    pub padding: [u8; 20],
    pub product: [u8; MAX_PRODUCT_SIZE],
    pub _pad1: [u8; 3],
    pub strategy_id: i32,
    pub _pad2: [u8; 32],
}

impl RequestMsg {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            contract: ContractDescription::zeroed(),
            request_type: 0,
            ord_type: 0,
            duration: 0,
            px_type: 0,
            pos_direction: 0,
            order_id: 0,
            token: 0,
            quantity: 0,
            quantity_filled: 0,
            disclosed_qnty: 0,
            price: 0.0,
            timestamp: 0,
            account_id: [0; MAX_ACCOUNT_ID_LEN + 1],
            transaction_type: 0,
            exchange_type: 0,
            padding: [0; 20],
            product: [0; MAX_PRODUCT_SIZE],
            _pad1: [0; 3],
            strategy_id: 0,
            _pad2: [0; 32],
        }
    }

    pub fn request_kind(&self) -> Result<RequestType, WireError> {
        RequestType::try_from(self.request_type)
    }

    pub fn order_kind(&self) -> Result<OrderType, WireError> {
        OrderType::try_from(self.ord_type)
    }

    pub fn order_duration(&self) -> Result<OrderDuration, WireError> {
        OrderDuration::try_from(self.duration)
    }

    pub fn price_kind(&self) -> Result<PriceType, WireError> {
        PriceType::try_from(self.px_type)
    }

    pub fn position_direction(&self) -> Result<PositionDirection, WireError> {
        PositionDirection::try_from(self.pos_direction)
    }

    pub fn exchange(&self) -> Result<ExchangeType, WireError> {
        ExchangeType::try_from(self.exchange_type)
    }

    #[must_use]
    pub fn side(&self) -> Option<Side> {
        Side::from_byte(self.transaction_type)
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        read_fixed(&self.contract.symbol)
    }

    #[must_use]
    pub fn account(&self) -> &str {
        read_fixed(&self.account_id)
    }

    #[must_use]
    pub fn product_code(&self) -> &str {
        read_fixed(&self.product)
    }
}

impl Default for RequestMsg {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Execution report received from the order-routing process (176 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseMsg {
    pub response_type: i32,
    pub child_response: i32,
    pub order_id: u32,
    pub error_code: u32,
    pub quantity: i32,
    pub _pad0: [u8; 4],
    pub price: f64,
    pub timestamp: u64,
    pub side: u8,
    pub symbol: [u8; MAX_SYMBOL_SIZE],
    pub account_id: [u8; MAX_ACCOUNT_ID_LEN + 1],
    pub _pad1: [u8; 2],
    pub exchange_order_id: f64,
    pub exchange_trade_id: [u8; MAX_TRADE_ID_SIZE],
    pub open_close: i8,
    pub exchange_id: i8,
    pub product: [u8; MAX_PRODUCT_SIZE],
    pub _pad2: [u8; 1],
    pub strategy_id: i32,
    pub _pad3: [u8; 4],
}

impl ResponseMsg {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            response_type: 0,
            child_response: 0,
            order_id: 0,
            error_code: 0,
            quantity: 0,
            _pad0: [0; 4],
            price: 0.0,
            timestamp: 0,
            side: 0,
            symbol: [0; MAX_SYMBOL_SIZE],
            account_id: [0; MAX_ACCOUNT_ID_LEN + 1],
            _pad1: [0; 2],
            exchange_order_id: 0.0,
            exchange_trade_id: [0; MAX_TRADE_ID_SIZE],
            open_close: 0,
            exchange_id: 0,
            product: [0; MAX_PRODUCT_SIZE],
            _pad2: [0; 1],
            strategy_id: 0,
            _pad3: [0; 4],
        }
    }

    /// Convenience constructor for the fields the execution core reads
    #[must_use]
    pub fn new(kind: ResponseType, order_id: u32, quantity: i32, price: f64) -> Self {
        Self {
            response_type: kind.raw(),
            order_id,
            quantity,
            price,
            ..Self::zeroed()
        }
    }

    pub fn kind(&self) -> Result<ResponseType, WireError> {
        ResponseType::try_from(self.response_type)
    }

    #[must_use]
    pub fn side(&self) -> Option<Side> {
        Side::from_byte(self.side)
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        read_fixed(&self.symbol)
    }

    #[must_use]
    pub fn trade_id(&self) -> &str {
        read_fixed(&self.exchange_trade_id)
    }
}

impl Default for ResponseMsg {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// One ladder level
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BookElement {
    pub quantity: i32,
    pub order_count: i32,
    pub price: f64,
}

impl BookElement {
    pub const EMPTY: Self = Self {
        quantity: 0,
        order_count: 0,
        price: 0.0,
    };
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdHeaderPart {
    pub exch_ts: u64,
    pub timestamp: u64,
    pub seqnum: u64,
    pub rpt_seqnum: u64,
    pub token_id: u64,
    pub symbol: [u8; MD_SYMBOL_SIZE],
    pub symbol_id: u16,
    pub exchange_name: u8,
    pub _pad0: [u8; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdDataPart {
    pub new_price: f64,
    pub old_price: f64,
    pub last_traded_price: f64,
    pub last_traded_time: u64,
    pub total_traded_value: f64,
    pub total_traded_quantity: i64,
    pub yield_: f64,
    pub bid_updates: [BookElement; INTEREST_LEVELS],
    pub ask_updates: [BookElement; INTEREST_LEVELS],
    pub new_quant: i32,
    pub old_quant: i32,
    pub last_traded_quantity: i32,
    pub valid_bids: i8,
    pub valid_asks: i8,
    pub update_level: i8,
    pub end_pkt: u8,
    pub side: u8,
    pub update_type: u8,
    pub feed_type: u8,
    pub _pad0: [u8; 5],
}

/// Market-data snapshot: header followed by the data part (816 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketUpdate {
    pub header: MdHeaderPart,
    pub data: MdDataPart,
}

impl MarketUpdate {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            header: MdHeaderPart {
                exch_ts: 0,
                timestamp: 0,
                seqnum: 0,
                rpt_seqnum: 0,
                token_id: 0,
                symbol: [0; MD_SYMBOL_SIZE],
                symbol_id: 0,
                exchange_name: 0,
                _pad0: [0; 5],
            },
            data: MdDataPart {
                new_price: 0.0,
                old_price: 0.0,
                last_traded_price: 0.0,
                last_traded_time: 0,
                total_traded_value: 0.0,
                total_traded_quantity: 0,
                yield_: 0.0,
                bid_updates: [BookElement::EMPTY; INTEREST_LEVELS],
                ask_updates: [BookElement::EMPTY; INTEREST_LEVELS],
                new_quant: 0,
                old_quant: 0,
                last_traded_quantity: 0,
                valid_bids: 0,
                valid_asks: 0,
                update_level: 0,
                end_pkt: 0,
                side: 0,
                update_type: 0,
                feed_type: 0,
                _pad0: [0; 5],
            },
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        read_fixed(&self.header.symbol)
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        write_fixed(&mut self.header.symbol, symbol);
    }

    /// Number of populated bid levels, clamped to the ladder depth
    #[must_use]
    pub fn valid_bids(&self) -> usize {
        usize::try_from(self.data.valid_bids)
            .unwrap_or(0)
            .min(INTEREST_LEVELS)
    }

    #[must_use]
    pub fn valid_asks(&self) -> usize {
        usize::try_from(self.data.valid_asks)
            .unwrap_or(0)
            .min(INTEREST_LEVELS)
    }
}

impl Default for MarketUpdate {
    fn default() -> Self {
        Self::zeroed()
    }
}
