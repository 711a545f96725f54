//! Per-leg execution state: position, PNL, counters and control flags
//!
//! Quantities are in contract units; values are price × quantity before the
//! price multiplier is applied. "Current cycle" fields cover trades since
//! the position was last flat and are zeroed whenever net position returns
//! to exactly zero.

use crate::config::Fees;
use crate::execution::HitType;
use common::{Side, Ts};
use orderbook::Instrument;
use tracing::debug;

/// Derived threshold outputs consumed by the quoting layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub bid_place: f64,
    pub bid_remove: f64,
    pub ask_place: f64,
    pub ask_remove: f64,
    /// Absolute position limit
    pub max_pos: i64,
    /// Position beyond which the long/short regime applies
    pub begin_pos: i64,
    /// Default order size
    pub size: i64,
    /// max / size
    pub sms_ratio: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            bid_place: -1.0,
            bid_remove: -1.0,
            ask_place: -1.0,
            ask_remove: -1.0,
            max_pos: 0,
            begin_pos: 0,
            size: 0,
            sms_ratio: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionState {
    /// Cumulative buy minus cumulative sell
    pub netpos: i64,
    /// Sub-position from resting (standard) fills
    pub netpos_pass: i64,
    /// Carry-over passive position loaded from the daily snapshot
    pub netpos_pass_ytd: i64,
    /// Sub-position from crossing/matching fills
    pub netpos_agg: i64,

    pub buy_total_qty: i64,
    pub sell_total_qty: i64,
    pub buy_open_qty: i64,
    pub sell_open_qty: i64,
    pub buy_qty: i64,
    pub sell_qty: i64,

    pub buy_total_value: f64,
    pub sell_total_value: f64,
    pub trans_total_value: f64,
    pub buy_value: f64,
    pub sell_value: f64,
    pub trans_value: f64,

    /// Session averages
    pub buy_avg_price: f64,
    pub sell_avg_price: f64,
    /// Current-cycle averages
    pub buy_price: f64,
    pub sell_price: f64,

    pub realised_pnl: f64,
    pub unrealised_pnl: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    /// High-water mark of net PNL
    pub max_pnl: f64,
    /// net - max, never positive
    pub drawdown: f64,

    pub buy_open_orders: i64,
    pub sell_open_orders: i64,
    pub order_count: u64,
    pub trade_count: u64,
    pub cancel_count: u64,
    pub confirm_count: u64,
    pub cancel_confirm_count: u64,
    /// Rejects since the last confirm
    pub reject_count: u64,
    pub improve_count: u64,
    pub cross_count: u64,

    pub active: bool,
    pub on_exit: bool,
    pub on_cancel: bool,
    pub on_flat: bool,
    pub agg_flat: bool,
    pub on_stop_loss: bool,
    pub stop_loss_ts: Ts,
    /// Liquidation order size floor, halved on RMS rejects
    pub rms_qty: i64,
    pub set_high: bool,

    pub thold: Thresholds,

    pub ltp: f64,
    pub last_trade_px: f64,
    pub last_trade_side: Option<Side>,
    pub exch_ts: u64,
    pub best_bid_last_pnl: f64,
    pub best_ask_last_pnl: f64,

    pub fees: Fees,
}

impl ExecutionState {
    #[must_use]
    pub fn new(fees: Fees) -> Self {
        Self {
            fees,
            ..Self::default()
        }
    }

    /// Session reset; fees are configuration and survive
    pub fn reset(&mut self) {
        *self = Self::new(self.fees);
        debug!("execution state reset");
    }

    /// Book a fill into position, value and fee accumulators.
    ///
    /// Realizes PNL and clears the current-cycle accumulators when net
    /// position lands on exactly zero. Does not recompute unrealized PNL.
    pub fn apply_trade(&mut self, side: Side, qty: i64, price: f64, hit: HitType, multiplier: f64) {
        let value = price * qty as f64;
        match side {
            Side::Buy => {
                self.buy_total_value += value;
                self.buy_value += value;
                self.buy_total_qty += qty;
                self.buy_avg_price = self.buy_total_value / self.buy_total_qty as f64;
                self.buy_qty += qty;
                if self.buy_qty > 0 {
                    self.buy_price = self.buy_value / self.buy_qty as f64;
                }
                self.buy_open_qty -= qty;
            }
            Side::Sell => {
                self.sell_total_value += value;
                self.sell_value += value;
                self.sell_total_qty += qty;
                self.sell_avg_price = self.sell_total_value / self.sell_total_qty as f64;
                self.sell_qty += qty;
                if self.sell_qty > 0 {
                    self.sell_price = self.sell_value / self.sell_qty as f64;
                }
                self.sell_open_qty -= qty;
            }
        }
        self.last_trade_px = price;
        self.last_trade_side = Some(side);

        let signed = side.sign() * qty;
        match hit {
            HitType::Standard => self.netpos_pass += signed,
            HitType::Cross | HitType::Match => self.netpos_agg += signed,
            HitType::Improve => self.improve_count += 1,
            HitType::Detect => {}
        }
        if hit == HitType::Cross {
            self.cross_count += 1;
        }
        self.trade_count += 1;

        self.netpos = self.buy_total_qty - self.sell_total_qty;

        let f = &self.fees;
        self.trans_value = (f.buy_exch_tx * self.buy_value + f.sell_exch_tx * self.sell_value)
            * multiplier
            + f.buy_exch_contract_tx * self.buy_qty as f64
            + f.sell_exch_contract_tx * self.sell_qty as f64;

        if self.netpos == 0 {
            self.settle_flat(multiplier);
        }
    }

    fn settle_flat(&mut self, multiplier: f64) {
        self.realised_pnl = (self.sell_total_value - self.buy_total_value) * multiplier;
        let f = &self.fees;
        self.trans_total_value = f.buy_exch_tx * self.buy_total_value * multiplier
            + f.sell_exch_tx * self.sell_total_value * multiplier
            + f.buy_exch_contract_tx * self.buy_total_qty as f64
            + f.sell_exch_contract_tx * self.sell_total_qty as f64;

        self.buy_value = 0.0;
        self.buy_qty = 0;
        self.buy_price = 0.0;
        self.sell_value = 0.0;
        self.sell_qty = 0;
        self.sell_price = 0.0;
        self.trans_value = 0.0;
        debug!(
            realised = self.realised_pnl,
            fees = self.trans_total_value,
            "position flat, cycle settled"
        );
    }

    /// Recompute unrealized/gross/net PNL, high-water mark and drawdown
    /// from the current book. Idempotent for unchanged inputs.
    pub fn calculate_pnl(&mut self, inst: &Instrument) {
        let mult = inst.contract().price_multiplier;
        let bid = inst.bid_px[0];
        let ask = inst.ask_px[0];
        let f = &self.fees;

        let closed_qty = if self.netpos > 0 { self.sell_qty } else { self.buy_qty };

        let mut upnl = if self.netpos > 0 {
            self.netpos as f64
                * ((bid - self.buy_price - bid * f.sell_exch_tx) * mult - f.sell_exch_contract_tx)
        } else if self.netpos < 0 {
            (-self.netpos) as f64
                * ((self.sell_price - ask - ask * f.buy_exch_tx) * mult - f.buy_exch_contract_tx)
        } else {
            0.0
        };
        upnl += closed_qty as f64 * (self.sell_price - self.buy_price) * mult;
        upnl -= self.trans_value;

        self.unrealised_pnl = upnl;
        self.gross_pnl = self.realised_pnl + upnl;
        self.net_pnl = self.gross_pnl - self.trans_total_value;
        if self.net_pnl > self.max_pnl {
            self.max_pnl = self.net_pnl;
        }
        self.drawdown = self.net_pnl - self.max_pnl;
    }

    /// Open quantity for one side
    #[must_use]
    pub fn open_qty(&self, side: Side) -> i64 {
        match side {
            Side::Buy => self.buy_open_qty,
            Side::Sell => self.sell_open_qty,
        }
    }

    pub(crate) fn add_open(&mut self, side: Side, qty: i64) {
        match side {
            Side::Buy => self.buy_open_qty += qty,
            Side::Sell => self.sell_open_qty += qty,
        }
    }

    pub(crate) fn add_open_orders(&mut self, side: Side, n: i64) {
        match side {
            Side::Buy => self.buy_open_orders += n,
            Side::Sell => self.sell_open_orders += n,
        }
    }
}
