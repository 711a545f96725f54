//! 20-level ladder fed from market-data records

use crate::contract::ContractSpec;
use common::{INTEREST_LEVELS, MarketUpdate, Side};
use tracing::trace;

/// Price/quantity pair at one ladder level
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Level {
    pub price: f64,
    pub qty: f64,
}

/// One traded instrument: contract parameters plus the latest book
#[derive(Debug, Clone)]
pub struct Instrument {
    contract: ContractSpec,

    pub bid_px: [f64; INTEREST_LEVELS],
    pub bid_qty: [f64; INTEREST_LEVELS],
    pub ask_px: [f64; INTEREST_LEVELS],
    pub ask_qty: [f64; INTEREST_LEVELS],
    pub valid_bids: usize,
    pub valid_asks: usize,

    pub last_trade_px: f64,
    pub last_trade_qty: f64,
    /// Exchange timestamp of the latest update
    pub exch_ts: u64,

    prev_bid: f64,
    prev_ask: f64,
}

impl Instrument {
    #[must_use]
    pub fn new(contract: ContractSpec) -> Self {
        Self {
            contract,
            bid_px: [0.0; INTEREST_LEVELS],
            bid_qty: [0.0; INTEREST_LEVELS],
            ask_px: [0.0; INTEREST_LEVELS],
            ask_qty: [0.0; INTEREST_LEVELS],
            valid_bids: 0,
            valid_asks: 0,
            last_trade_px: 0.0,
            last_trade_qty: 0.0,
            exch_ts: 0,
            prev_bid: 0.0,
            prev_ask: 0.0,
        }
    }

    #[must_use]
    pub fn contract(&self) -> &ContractSpec {
        &self.contract
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.contract.symbol
    }

    /// Copy both ladders and the last-trade fields from `md`
    pub fn update(&mut self, md: &MarketUpdate) {
        self.prev_bid = self.bid_px[0];
        self.prev_ask = self.ask_px[0];

        let data = &md.data;
        self.valid_bids = md.valid_bids();
        self.valid_asks = md.valid_asks();
        for (i, level) in data.bid_updates.iter().enumerate() {
            self.bid_px[i] = level.price;
            self.bid_qty[i] = f64::from(level.quantity);
        }
        for (i, level) in data.ask_updates.iter().enumerate() {
            self.ask_px[i] = level.price;
            self.ask_qty[i] = f64::from(level.quantity);
        }
        self.last_trade_px = data.last_traded_price;
        self.last_trade_qty = f64::from(data.last_traded_quantity);
        self.exch_ts = md.header.exch_ts;

        trace!(
            symbol = %self.contract.symbol,
            bid = self.bid_px[0],
            ask = self.ask_px[0],
            "book updated"
        );
    }

    /// Level 0 bid, `None` when the bid side is empty
    #[must_use]
    pub fn best_bid(&self) -> Option<Level> {
        (self.valid_bids > 0).then(|| Level {
            price: self.bid_px[0],
            qty: self.bid_qty[0],
        })
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Level> {
        (self.valid_asks > 0).then(|| Level {
            price: self.ask_px[0],
            qty: self.ask_qty[0],
        })
    }

    /// Valid levels of one side, best first
    pub fn levels(&self, side: Side) -> impl Iterator<Item = Level> + '_ {
        let (px, qty, n) = match side {
            Side::Buy => (&self.bid_px, &self.bid_qty, self.valid_bids),
            Side::Sell => (&self.ask_px, &self.ask_qty, self.valid_asks),
        };
        px.iter()
            .zip(qty.iter())
            .take(n)
            .map(|(&price, &qty)| Level { price, qty })
    }

    /// Resting quantity at `price` on `side`, if that level is in the book
    #[must_use]
    pub fn qty_at(&self, side: Side, price: f64) -> Option<f64> {
        self.levels(side)
            .find(|l| l.price == price)
            .map(|l| l.qty)
    }

    /// Level 0 bid/ask before the latest update
    #[must_use]
    pub fn previous_bbo(&self) -> (f64, f64) {
        (self.prev_bid, self.prev_ask)
    }

    /// Best bid or best ask moved with the latest update
    #[must_use]
    pub fn bbo_changed(&self) -> bool {
        self.prev_bid != self.bid_px[0] || self.prev_ask != self.ask_px[0]
    }

    #[must_use]
    pub fn has_valid_book(&self) -> bool {
        self.bid_px[0] > 0.0 && self.ask_px[0] > 0.0
    }

    #[must_use]
    pub fn mid_price(&self) -> f64 {
        (self.bid_px[0] + self.ask_px[0]) / 2.0
    }

    /// Size-weighted mid: each side's price weighted by the opposite size
    #[must_use]
    pub fn msw_price(&self) -> f64 {
        let total = self.ask_qty[0] + self.bid_qty[0];
        if total == 0.0 {
            return self.mid_price();
        }
        (self.ask_qty[0] * self.bid_px[0] + self.bid_qty[0] * self.ask_px[0]) / total
    }

    #[must_use]
    pub fn spread(&self) -> f64 {
        self.ask_px[0] - self.bid_px[0]
    }
}
