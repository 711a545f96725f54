//! One traded instrument: book, execution state, orders, thresholds, risk
//!
//! This is the strategy-facing surface. Everything here runs on the
//! engine's polling thread; nothing is shared between legs.

use crate::config::{LegConfig, ThresholdConfig};
use crate::error::OrderError;
use crate::execution::{HitType, NewOrder, OrderManager};
use crate::position::{ExecutionState, Thresholds};
use crate::risk::{SquareoffController, SquareoffReason, handle_rms_reject};
use crate::threshold::set_thresholds;
use crate::venue::{Identity, RequestTemplate, VenueAdapter};
use anyhow::Result;
use common::{MarketUpdate, ResponseMsg, ResponseType, Side, Ts};
use orderbook::Instrument;
use tracing::{debug, info};

pub struct Leg {
    inst: Instrument,
    state: ExecutionState,
    orders: OrderManager,
    thresholds: ThresholdConfig,
    squareoff: SquareoffController,
}

impl Leg {
    /// Build a leg, resolving session times for today
    pub fn new(cfg: &LegConfig, identity: &Identity) -> Result<Self> {
        let squareoff = SquareoffController::from_limits(&cfg.risk)?;
        Ok(Self::with_controller(cfg, identity, squareoff))
    }

    #[must_use]
    pub fn with_controller(cfg: &LegConfig, identity: &Identity, squareoff: SquareoffController) -> Self {
        let inst = Instrument::new(cfg.contract.clone());
        let orders = OrderManager::new(RequestTemplate::new(&cfg.contract, identity));
        let mut state = ExecutionState::new(cfg.fees);
        state.set_high = cfg.thresholds.set_high;
        let mut leg = Self {
            inst,
            state,
            orders,
            thresholds: cfg.thresholds.clone(),
            squareoff,
        };
        leg.refresh_thresholds();
        leg
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        self.inst.symbol()
    }

    #[must_use]
    pub fn instrument(&self) -> &Instrument {
        &self.inst
    }

    #[must_use]
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    #[must_use]
    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.state.thold
    }

    #[must_use]
    pub fn squareoff(&self) -> &SquareoffController {
        &self.squareoff
    }

    /// Carry-over passive position from the daily snapshot
    pub fn set_ytd_position(&mut self, netpos_pass_ytd: i64) {
        self.state.netpos_pass_ytd = netpos_pass_ytd;
    }

    /// Market-data callback: book update, LTP, PNL on BBO change
    pub fn on_market_data(&mut self, md: &MarketUpdate) {
        self.inst.update(md);
        if md.data.last_traded_price > 0.0 {
            self.state.ltp = md.data.last_traded_price;
        }
        self.state.exch_ts = md.header.exch_ts;

        let (bid, ask) = (self.inst.bid_px[0], self.inst.ask_px[0]);
        if bid != self.state.best_bid_last_pnl || ask != self.state.best_ask_last_pnl {
            self.state.calculate_pnl(&self.inst);
            self.state.best_bid_last_pnl = bid;
            self.state.best_ask_last_pnl = ask;
            self.refresh_thresholds();
        }
    }

    /// Order-response callback
    pub fn on_response(&mut self, resp: &ResponseMsg) -> Option<ResponseType> {
        let kind = self.orders.process_response(&mut self.state, &self.inst, resp)?;
        if kind == ResponseType::RmsReject {
            handle_rms_reject(&mut self.state, self.inst.contract().lot_size);
        }
        if kind == ResponseType::TradeConfirm || kind == ResponseType::CancelOrderReject {
            self.refresh_thresholds();
        }
        Some(kind)
    }

    /// Recompute sizing and thresholds from the current position and book
    pub fn refresh_thresholds(&mut self) {
        set_thresholds(&mut self.state, &self.thresholds, &self.inst);
    }

    /// Switch between the normal and the high-size thresholds
    pub fn set_high(&mut self, high: bool) {
        self.state.set_high = high;
        self.refresh_thresholds();
    }

    pub fn send_new(&mut self, venue: &mut dyn VenueAdapter, order: NewOrder) -> Result<u32, OrderError> {
        self.orders.send_new(&mut self.state, &self.inst, venue, order)
    }

    /// Bid at `price`; `qty` defaults to the threshold size
    pub fn send_bid(
        &mut self,
        venue: &mut dyn VenueAdapter,
        price: f64,
        qty: Option<i64>,
        hit: HitType,
    ) -> Result<u32, OrderError> {
        let qty = qty.unwrap_or(self.state.thold.size);
        self.send_new(venue, NewOrder::new(Side::Buy, price, qty).hit(hit))
    }

    /// Offer at `price`; `qty` defaults to the threshold size
    pub fn send_ask(
        &mut self,
        venue: &mut dyn VenueAdapter,
        price: f64,
        qty: Option<i64>,
        hit: HitType,
    ) -> Result<u32, OrderError> {
        let qty = qty.unwrap_or(self.state.thold.size);
        self.send_new(venue, NewOrder::new(Side::Sell, price, qty).hit(hit))
    }

    pub fn send_modify(
        &mut self,
        venue: &mut dyn VenueAdapter,
        order_id: u32,
        price: f64,
        qty: i64,
        hit: HitType,
    ) -> Result<(), OrderError> {
        self.orders.send_modify(&mut self.state, venue, order_id, price, qty, hit)
    }

    pub fn send_cancel(&mut self, venue: &mut dyn VenueAdapter, order_id: u32) -> Result<(), OrderError> {
        self.orders.send_cancel(&mut self.state, venue, order_id)
    }

    pub fn send_cancel_at(
        &mut self,
        venue: &mut dyn VenueAdapter,
        side: Side,
        price: f64,
    ) -> Result<(), OrderError> {
        self.orders.send_cancel_at(&mut self.state, venue, side, price)
    }

    /// Cancel every confirmed order; returns how many cancels went out
    pub fn cancel_all(&mut self, venue: &mut dyn VenueAdapter) -> usize {
        let mut sent = 0;
        for side in [Side::Buy, Side::Sell] {
            for id in self.orders.order_ids(side) {
                if self.try_cancel(venue, id) {
                    sent += 1;
                }
            }
        }
        sent
    }

    fn try_cancel(&mut self, venue: &mut dyn VenueAdapter, order_id: u32) -> bool {
        match self.orders.send_cancel(&mut self.state, venue, order_id) {
            Ok(()) => true,
            Err(e) => {
                debug!(order_id, error = %e, "cancel skipped");
                false
            }
        }
    }

    /// Per-tick risk evaluation
    pub fn check_squareoff(&mut self, now: Ts) -> Option<SquareoffReason> {
        self.squareoff.evaluate(&mut self.state, now)
    }

    /// Work the position towards flat: cancel what stands in the way, then
    /// send one closing order once the book is clear of our orders.
    pub fn handle_squareoff(&mut self, venue: &mut dyn VenueAdapter) {
        let netpos = self.state.netpos;
        if netpos == 0 && self.state.on_exit && self.orders.is_empty() {
            if self.state.active {
                self.state.active = false;
                info!(symbol = %self.inst.symbol(), "flat on exit, leg deactivated");
            }
            return;
        }

        let (bid, ask) = (self.inst.bid_px[0], self.inst.ask_px[0]);
        let tick = self.inst.contract().tick_size;
        let (mut sell_px, mut buy_px) = if self.state.agg_flat {
            (bid - tick, ask + tick)
        } else {
            (ask, bid)
        };
        if sell_px <= 0.0 {
            sell_px = bid;
        }
        if buy_px <= 0.0 {
            buy_px = ask;
        }

        let on_cancel = self.state.on_cancel;
        let stale: Vec<u32> = self
            .orders
            .orders()
            .filter(|o| {
                on_cancel
                    || netpos == 0
                    || match o.side {
                        Side::Sell => sell_px < o.price,
                        Side::Buy => buy_px > o.price,
                    }
            })
            .map(|o| o.order_id)
            .collect();
        for id in stale {
            self.try_cancel(venue, id);
        }
        self.state.on_cancel = false;

        let mut qty = netpos.abs();
        if self.state.rms_qty == 0 {
            self.state.rms_qty = qty;
        }
        qty = qty.min(self.state.rms_qty);

        if self.orders.is_empty() && netpos != 0 {
            let hit = if self.state.agg_flat { HitType::Cross } else { HitType::Standard };
            let (side, price) = if netpos > 0 { (Side::Sell, sell_px) } else { (Side::Buy, buy_px) };
            match self.send_new(venue, NewOrder::new(side, price, qty).hit(hit)) {
                Ok(order_id) => info!(order_id, %side, price, qty, ?hit, "squareoff order sent"),
                Err(e) => debug!(error = %e, "squareoff order not sent"),
            }
        }
    }

    pub fn activate(&mut self) {
        self.state.active = true;
        info!(symbol = %self.inst.symbol(), "leg activated");
    }

    pub fn deactivate(&mut self) {
        self.state.active = false;
        info!(symbol = %self.inst.symbol(), "leg deactivated");
    }

    /// Operator squareoff: cancel everything, flatten, then stop
    pub fn force_squareoff(&mut self) {
        self.state.on_exit = true;
        self.state.on_cancel = true;
        self.state.on_flat = true;
        info!(symbol = %self.inst.symbol(), netpos = self.state.netpos, "forced squareoff");
    }

    /// Session reset of state, orders and live risk limits
    pub fn reset(&mut self) {
        let set_high = self.state.set_high;
        self.state.reset();
        self.state.set_high = set_high;
        self.orders.clear();
        self.squareoff.reset();
        self.refresh_thresholds();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskLimits;
    use crate::venue::PaperVenue;
    use common::RequestType;
    use orderbook::ContractSpec;

    fn leg() -> Leg {
        let cfg = LegConfig {
            contract: ContractSpec::new("ag2506", 1.0, 15.0, 15.0),
            thresholds: ThresholdConfig { size: 2, max_size: 10, ..ThresholdConfig::default() },
            ..LegConfig::default()
        };
        let ctl = SquareoffController::new(RiskLimits::default(), None, None);
        Leg::with_controller(&cfg, &Identity::default(), ctl)
    }

    fn book(bid: f64, ask: f64) -> MarketUpdate {
        let mut md = MarketUpdate::zeroed();
        md.data.bid_updates[0].price = bid;
        md.data.bid_updates[0].quantity = 10;
        md.data.ask_updates[0].price = ask;
        md.data.ask_updates[0].quantity = 10;
        md.data.valid_bids = 1;
        md.data.valid_asks = 1;
        md
    }

    fn fill(leg: &mut Leg, id: u32, qty: i32, price: f64) {
        leg.on_response(&ResponseMsg::new(ResponseType::NewOrderConfirm, id, 0, 0.0));
        leg.on_response(&ResponseMsg::new(ResponseType::TradeConfirm, id, qty, price));
    }

    #[test]
    fn test_send_bid_defaults_to_threshold_size() -> Result<(), OrderError> {
        let mut leg = leg();
        let mut venue = PaperVenue::new(1);
        let id = leg.send_bid(&mut venue, 5800.0, None, HitType::Standard)?;
        assert_eq!(leg.orders().order(id).map(|o| o.qty), Some(2));
        Ok(())
    }

    #[test]
    fn test_pnl_only_on_bbo_change() -> Result<(), OrderError> {
        let mut leg = leg();
        let mut venue = PaperVenue::new(1);
        leg.on_market_data(&book(5799.0, 5800.0));
        let id = leg.send_bid(&mut venue, 5800.0, Some(1), HitType::Standard)?;
        fill(&mut leg, id, 1, 5800.0);

        let mut md = book(5810.0, 5811.0);
        md.data.last_traded_price = 5810.0;
        leg.on_market_data(&md);
        assert_eq!(leg.state().unrealised_pnl, 150.0);
        assert_eq!(leg.state().ltp, 5810.0);

        // same BBO, deeper level change: no recompute
        let mut again = book(5810.0, 5811.0);
        again.data.bid_updates[1].price = 5809.0;
        leg.on_market_data(&again);
        assert_eq!(leg.state().best_bid_last_pnl, 5810.0);
        assert_eq!(leg.state().unrealised_pnl, 150.0);
        Ok(())
    }

    #[test]
    fn test_squareoff_cancels_then_closes() -> Result<(), OrderError> {
        let mut leg = leg();
        let mut venue = PaperVenue::new(1);
        leg.activate();
        leg.on_market_data(&book(5800.0, 5801.0));
        let long = leg.send_bid(&mut venue, 5800.0, Some(3), HitType::Standard)?;
        fill(&mut leg, long, 3, 5800.0);
        let resting = leg.send_bid(&mut venue, 5799.0, Some(1), HitType::Standard)?;
        leg.on_response(&ResponseMsg::new(ResponseType::NewOrderConfirm, resting, 0, 0.0));

        leg.force_squareoff();
        leg.handle_squareoff(&mut venue);
        let cancel = venue.last().map(|r| (r.request_type, r.order_id));
        assert_eq!(cancel, Some((RequestType::CancelOrder.raw(), resting)));
        assert!(!leg.state().on_cancel);

        leg.on_response(&ResponseMsg::new(ResponseType::CancelOrderConfirm, resting, 1, 5799.0));
        leg.handle_squareoff(&mut venue);
        let close = venue.last().copied().ok_or(OrderError::NotFound(0))?;
        assert_eq!(close.request_kind(), Ok(RequestType::NewOrder));
        assert_eq!(close.side(), Some(Side::Sell));
        assert_eq!(close.price, 5801.0);
        assert_eq!(close.quantity, 3);

        fill(&mut leg, close.order_id, 3, 5801.0);
        assert_eq!(leg.state().netpos, 0);
        leg.handle_squareoff(&mut venue);
        assert!(!leg.state().active);
        Ok(())
    }

    #[test]
    fn test_aggressive_squareoff_crosses() -> Result<(), OrderError> {
        let mut leg = leg();
        let mut venue = PaperVenue::new(1);
        leg.on_market_data(&book(5800.0, 5801.0));
        let short = leg.send_ask(&mut venue, 5801.0, Some(2), HitType::Standard)?;
        fill(&mut leg, short, 2, 5801.0);

        let refused = leg.send_ask(&mut venue, 5805.0, Some(1), HitType::Standard)?;
        leg.on_response(&ResponseMsg::new(ResponseType::RmsReject, refused, 0, 0.0));
        assert_eq!(leg.state().rms_qty, 15);
        leg.force_squareoff();
        leg.handle_squareoff(&mut venue);
        let close = venue.last().copied().ok_or(OrderError::NotFound(0))?;
        assert_eq!(close.side(), Some(Side::Buy));
        assert_eq!(close.price, 5802.0);
        assert_eq!(close.order_duration(), Ok(common::OrderDuration::Fak));
        Ok(())
    }

    #[test]
    fn test_rms_reject_halves_liquidation_size() -> Result<(), OrderError> {
        let mut leg = leg();
        let mut venue = PaperVenue::new(1);
        leg.on_market_data(&book(5800.0, 5801.0));
        let id = leg.send_bid(&mut venue, 5800.0, Some(8), HitType::Standard)?;
        fill(&mut leg, id, 8, 5800.0);
        leg.force_squareoff();
        leg.handle_squareoff(&mut venue);
        let close = venue.last().copied().ok_or(OrderError::NotFound(0))?;
        assert_eq!(close.quantity, 8);

        leg.on_response(&ResponseMsg::new(ResponseType::RmsReject, close.order_id, 0, 0.0));
        assert_eq!(leg.state().rms_qty, 4);
        assert!(leg.state().agg_flat);
        leg.handle_squareoff(&mut venue);
        let retry = venue.last().copied().ok_or(OrderError::NotFound(0))?;
        assert_eq!(retry.quantity, 4);
        assert_eq!(retry.price, 5799.0);
        Ok(())
    }

    #[test]
    fn test_reset_clears_orders_and_state() -> Result<(), OrderError> {
        let mut leg = leg();
        let mut venue = PaperVenue::new(1);
        leg.send_bid(&mut venue, 5800.0, None, HitType::Standard)?;
        leg.reset();
        assert!(leg.orders().is_empty());
        assert_eq!(leg.state().buy_open_qty, 0);
        assert_eq!(leg.thresholds().size, 2);
        Ok(())
    }
}
