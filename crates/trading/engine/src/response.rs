//! Response handling: drives orders through their lifecycle and books fills
//!
//! Rejects never surface as errors. Each one rolls back whatever the
//! matching instruction reserved and leaves a state flag or counter behind.

use crate::execution::{CancelRejectMark, OrderManager, OrderStatus};
use crate::memory::SlotId;
use crate::position::ExecutionState;
use common::{Px, ResponseMsg, ResponseType};
use orderbook::Instrument;
use tracing::{debug, error, info, trace, warn};

impl OrderManager {
    /// Apply one response for an order of this leg.
    ///
    /// Returns the decoded response kind, or `None` when the kind or the
    /// order ID is unknown.
    pub fn process_response(
        &mut self,
        state: &mut ExecutionState,
        inst: &Instrument,
        resp: &ResponseMsg,
    ) -> Option<ResponseType> {
        let order_id = resp.order_id;
        let kind = match resp.kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(order_id, error = %e, "undecodable response");
                return None;
            }
        };
        let Some(&slot) = self.by_id.get(&order_id) else {
            warn!(order_id, ?kind, "response for unknown order id");
            return None;
        };

        match kind {
            ResponseType::NewOrderConfirm => self.on_new_confirm(state, inst, slot),
            ResponseType::ModifyOrderConfirm => self.on_modify_confirm(state, slot),
            ResponseType::CancelOrderConfirm | ResponseType::OrderExpired => {
                self.on_cancel_confirm(state, slot);
            }
            ResponseType::TradeConfirm => {
                if let Some(ord) = self.orders.get_mut(slot) {
                    if !matches!(ord.status, OrderStatus::ModifyOrder | OrderStatus::CancelOrder) {
                        ord.status = OrderStatus::NewConfirm;
                    }
                }
                self.process_trade(state, inst, slot, i64::from(resp.quantity), resp.price);
            }
            ResponseType::OrsReject
            | ResponseType::RmsReject
            | ResponseType::SimReject
            | ResponseType::BusinessReject
            | ResponseType::OrdersPerDayLimitReject => {
                state.reject_count += 1;
                let status = self.orders.get(slot).map(|o| o.status);
                warn!(order_id, ?kind, error_code = resp.error_code, ?status, "order rejected");
                match status {
                    Some(OrderStatus::Traded) | None => {}
                    Some(OrderStatus::CancelOrder) => self.restore_after_cancel_reject(slot),
                    Some(OrderStatus::ModifyOrder) => self.on_modify_reject(state, slot),
                    Some(_) => self.on_new_reject(state, slot),
                }
            }
            ResponseType::NewOrderFreeze | ResponseType::OrderError => {
                warn!(order_id, ?kind, error_code = resp.error_code, "new order refused");
                self.on_new_reject(state, slot);
            }
            ResponseType::ModifyOrderReject => {
                warn!(order_id, error_code = resp.error_code, "modify rejected");
                self.on_modify_reject(state, slot);
            }
            ResponseType::CancelOrderReject => self.on_cancel_reject(state, inst, slot, resp),
            ResponseType::ModifyOrderPending
            | ResponseType::CancelOrderPending
            | ResponseType::OrdersPerDayLimitWarning
            | ResponseType::StopLossWarning
            | ResponseType::NullResponse => {
                debug!(order_id, ?kind, "informational response");
            }
        }
        Some(kind)
    }

    fn on_new_confirm(&mut self, state: &mut ExecutionState, inst: &Instrument, slot: SlotId) {
        let Some(ord) = self.orders.get_mut(slot) else { return };
        if ord.status == OrderStatus::NewOrder {
            ord.status = OrderStatus::NewConfirm;
        }
        ord.quant_ahead = inst.qty_at(ord.side, ord.price).unwrap_or(0.0);
        state.reject_count = 0;
        state.confirm_count += 1;
        trace!(order_id = ord.order_id, quant_ahead = ord.quant_ahead, "new confirmed");
    }

    fn on_modify_confirm(&mut self, state: &mut ExecutionState, slot: SlotId) {
        let Some(ord) = self.orders.get_mut(slot) else { return };
        if !ord.modify_wait {
            warn!(order_id = ord.order_id, "modify confirm without pending modify");
            return;
        }
        let (side, old_key, new_key) = (ord.side, Px::new(ord.price), Px::new(ord.new_price));
        ord.price = ord.new_price;
        ord.qty = ord.new_qty;
        ord.open_qty = ord.qty - ord.done_qty;
        ord.modify_wait = false;
        ord.status = OrderStatus::ModifyConfirm;
        let (order_id, open) = (ord.order_id, ord.open_qty);
        info!(order_id, price = ord.price, qty = ord.qty, "modify confirmed");

        if old_key != new_key {
            let index = self.index_mut(side);
            if index.get(&old_key) == Some(&slot) {
                index.remove(&old_key);
            }
        }
        state.reject_count = 0;
        state.confirm_count += 1;
        if open <= 0 {
            if let Some(ord) = self.orders.get_mut(slot) {
                ord.status = OrderStatus::Traded;
            }
            self.remove_order(state, order_id);
        }
    }

    fn on_cancel_confirm(&mut self, state: &mut ExecutionState, slot: SlotId) {
        if self.orders.get(slot).is_some_and(|o| o.modify_wait) {
            self.rollback_modify(state, slot);
        }
        let Some(ord) = self.orders.get_mut(slot) else { return };
        let cancelled = ord.open_qty;
        state.add_open(ord.side, -cancelled);
        ord.cxl_qty += cancelled;
        ord.open_qty -= cancelled;
        ord.status = OrderStatus::CancelConfirm;
        let order_id = ord.order_id;
        state.reject_count = 0;
        state.confirm_count += 1;
        state.cancel_confirm_count += 1;
        info!(order_id, cancelled, "cancel confirmed");
        self.remove_order(state, order_id);
    }

    fn on_new_reject(&mut self, state: &mut ExecutionState, slot: SlotId) {
        let Some(ord) = self.orders.get_mut(slot) else { return };
        ord.status = OrderStatus::NewReject;
        state.add_open(ord.side, -ord.open_qty);
        let order_id = ord.order_id;
        self.remove_order(state, order_id);
    }

    fn on_modify_reject(&mut self, state: &mut ExecutionState, slot: SlotId) {
        self.rollback_modify(state, slot);
        if let Some(ord) = self.orders.get_mut(slot) {
            if ord.status != OrderStatus::Traded {
                ord.status = OrderStatus::ModifyReject;
            }
        }
    }

    /// Undo the index entry and open-quantity reservation of a pending modify
    fn rollback_modify(&mut self, state: &mut ExecutionState, slot: SlotId) {
        let Some(ord) = self.orders.get_mut(slot) else { return };
        if !ord.modify_wait {
            return;
        }
        let delta = ord.modify_delta();
        let (side, key, new_key) = (ord.side, Px::new(ord.price), Px::new(ord.new_price));
        ord.modify_wait = false;
        ord.new_price = 0.0;
        ord.new_qty = 0;
        debug!(order_id = ord.order_id, delta, "pending modify rolled back");

        state.add_open(side, -delta);
        if new_key != key {
            let index = self.index_mut(side);
            if index.get(&new_key) == Some(&slot) {
                index.remove(&new_key);
            }
        }
    }

    fn on_cancel_reject(
        &mut self,
        state: &mut ExecutionState,
        inst: &Instrument,
        slot: SlotId,
        resp: &ResponseMsg,
    ) {
        let Some(ord) = self.orders.get(slot) else { return };
        let (order_id, open, price) = (ord.order_id, ord.open_qty, ord.price);
        self.last_cancel_reject = Some(CancelRejectMark { order_id, ts: resp.timestamp });

        if resp.quantity == 0 {
            // nothing left to cancel: the order filled before the cancel arrived
            info!(order_id, open, price, "cancel rejected on filled order, booking fill");
            if let Some(ord) = self.orders.get_mut(slot) {
                if ord.status == OrderStatus::CancelOrder {
                    ord.status = OrderStatus::NewConfirm;
                }
            }
            self.process_trade(state, inst, slot, open, price);
        } else {
            warn!(order_id, error_code = resp.error_code, "cancel rejected");
            self.restore_after_cancel_reject(slot);
            state.reject_count += 1;
        }
    }

    fn restore_after_cancel_reject(&mut self, slot: SlotId) {
        if let Some(ord) = self.orders.get_mut(slot) {
            if ord.status != OrderStatus::Traded {
                ord.status = OrderStatus::NewConfirm;
            }
        }
    }

    /// Book `qty` filled at `price` against the order in `slot`
    fn process_trade(
        &mut self,
        state: &mut ExecutionState,
        inst: &Instrument,
        slot: SlotId,
        qty: i64,
        price: f64,
    ) {
        let Some(ord) = self.orders.get_mut(slot) else { return };
        ord.open_qty -= qty;
        ord.done_qty += qty;
        let (order_id, side, hit, open) = (ord.order_id, ord.side, ord.hit, ord.open_qty);

        state.apply_trade(side, qty, price, hit, inst.contract().price_multiplier);
        state.calculate_pnl(inst);
        info!(
            order_id,
            %side,
            qty,
            price,
            open,
            netpos = state.netpos,
            net_pnl = state.net_pnl,
            "trade"
        );

        if open <= 0 {
            if open < 0 {
                error!(order_id, open, "fill exceeds open quantity");
            }
            self.rollback_modify(state, slot);
            if let Some(ord) = self.orders.get_mut(slot) {
                ord.status = OrderStatus::Traded;
            }
            self.remove_order(state, order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrderError;
    use crate::execution::{HitType, NewOrder};
    use crate::venue::{Identity, PaperVenue, RequestTemplate};
    use common::{MarketUpdate, Side};
    use orderbook::ContractSpec;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct Fixture {
        om: OrderManager,
        state: ExecutionState,
        inst: Instrument,
        venue: PaperVenue,
    }

    impl Fixture {
        fn new() -> Self {
            let contract = ContractSpec::new("ag2506", 1.0, 15.0, 15.0);
            let om = OrderManager::new(RequestTemplate::new(&contract, &Identity::default()));
            let mut inst = Instrument::new(contract);
            let mut md = MarketUpdate::zeroed();
            md.data.bid_updates[0].price = 5819.0;
            md.data.bid_updates[0].quantity = 42;
            md.data.ask_updates[0].price = 5821.0;
            md.data.ask_updates[0].quantity = 9;
            md.data.valid_bids = 1;
            md.data.valid_asks = 1;
            inst.update(&md);
            Self { om, state: ExecutionState::default(), inst, venue: PaperVenue::new(1) }
        }

        fn send(&mut self, side: Side, price: f64, qty: i64) -> Result<u32, OrderError> {
            self.om
                .send_new(&mut self.state, &self.inst, &mut self.venue, NewOrder::new(side, price, qty))
        }

        fn respond(&mut self, kind: ResponseType, order_id: u32, qty: i32, price: f64) -> Option<ResponseType> {
            let resp = ResponseMsg::new(kind, order_id, qty, price);
            self.om.process_response(&mut self.state, &self.inst, &resp)
        }

        fn confirmed(&mut self, side: Side, price: f64, qty: i64) -> Result<u32, OrderError> {
            let id = self.send(side, price, qty)?;
            self.respond(ResponseType::NewOrderConfirm, id, 0, 0.0);
            Ok(id)
        }

        fn status(&self, id: u32) -> Option<OrderStatus> {
            self.om.order(id).map(|o| o.status)
        }
    }

    #[test]
    fn test_new_confirm_resets_rejects_and_estimates_queue() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        f.state.reject_count = 3;
        let id = f.confirmed(Side::Buy, 5819.0, 2)?;
        assert_eq!(f.status(id), Some(OrderStatus::NewConfirm));
        assert_eq!(f.state.reject_count, 0);
        assert_eq!(f.state.confirm_count, 1);
        assert_eq!(f.om.order(id).map(|o| o.quant_ahead), Some(42.0));
        Ok(())
    }

    #[test]
    fn test_unknown_order_is_ignored() {
        let mut f = Fixture::new();
        assert_eq!(f.respond(ResponseType::TradeConfirm, 99, 1, 5819.0), None);
        assert_eq!(f.state.trade_count, 0);
    }

    #[test]
    fn test_full_fill_removes_order() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Buy, 5819.0, 3)?;
        f.respond(ResponseType::TradeConfirm, id, 1, 5819.0);
        assert_eq!(f.om.order(id).map(|o| (o.open_qty, o.done_qty)), Some((2, 1)));
        assert_eq!(f.state.buy_open_qty, 2);

        f.respond(ResponseType::TradeConfirm, id, 2, 5819.0);
        assert!(f.om.order(id).is_none());
        assert!(f.om.order_at(Side::Buy, 5819.0).is_none());
        assert_eq!(f.state.netpos, 3);
        assert_eq!(f.state.buy_open_qty, 0);
        assert_eq!(f.state.buy_open_orders, 0);
        Ok(())
    }

    #[test]
    fn test_modify_confirm_moves_price() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Sell, 5825.0, 2)?;
        f.om.send_modify(&mut f.state, &mut f.venue, id, 5823.0, 4, HitType::Standard)?;

        // both prices point at the order until the confirm
        assert_eq!(f.om.indexed_prices(Side::Sell), 2);
        assert_eq!(f.state.sell_open_qty, 4);
        assert_eq!(
            f.om.send_modify(&mut f.state, &mut f.venue, id, 5822.0, 4, HitType::Standard),
            Err(OrderError::ModifyPending(id))
        );

        f.respond(ResponseType::ModifyOrderConfirm, id, 4, 5823.0);
        let ord = f.om.order(id).ok_or(OrderError::NotFound(id))?;
        assert_eq!((ord.price, ord.qty, ord.open_qty), (5823.0, 4, 4));
        assert_eq!((ord.old_price, ord.old_qty), (5825.0, 2));
        assert_eq!(ord.status, OrderStatus::ModifyConfirm);
        assert!(!ord.modify_wait);
        assert_eq!(f.om.indexed_prices(Side::Sell), 1);
        assert!(f.om.order_at(Side::Sell, 5825.0).is_none());
        Ok(())
    }

    #[test]
    fn test_modify_reject_restores_terms() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Buy, 5815.0, 2)?;
        f.om.send_modify(&mut f.state, &mut f.venue, id, 5817.0, 5, HitType::Standard)?;
        assert_eq!(f.state.buy_open_qty, 5);

        f.respond(ResponseType::ModifyOrderReject, id, 0, 0.0);
        let ord = f.om.order(id).ok_or(OrderError::NotFound(id))?;
        assert_eq!((ord.price, ord.qty, ord.open_qty), (5815.0, 2, 2));
        assert_eq!(ord.status, OrderStatus::ModifyReject);
        assert_eq!(f.state.buy_open_qty, 2);
        assert!(f.om.order_at(Side::Buy, 5817.0).is_none());
        assert_eq!(f.om.order_at(Side::Buy, 5815.0).map(|o| o.order_id), Some(id));

        // rejected modify leaves the order confirmed enough to cancel
        f.om.send_cancel(&mut f.state, &mut f.venue, id)?;
        Ok(())
    }

    #[test]
    fn test_modify_into_occupied_price_fails() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let a = f.confirmed(Side::Buy, 5815.0, 1)?;
        f.confirmed(Side::Buy, 5814.0, 1)?;
        let sent = f.venue.sent().len();
        let err = f.om.send_modify(&mut f.state, &mut f.venue, a, 5814.0, 1, HitType::Standard);
        assert!(matches!(err, Err(OrderError::DuplicatePrice { .. })));
        assert_eq!(f.venue.sent().len(), sent);
        Ok(())
    }

    #[test]
    fn test_cancel_confirm_releases_open() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Sell, 5830.0, 4)?;
        f.respond(ResponseType::TradeConfirm, id, 1, 5830.0);
        f.om.send_cancel(&mut f.state, &mut f.venue, id)?;
        assert_eq!(f.status(id), Some(OrderStatus::CancelOrder));

        f.respond(ResponseType::CancelOrderConfirm, id, 3, 5830.0);
        assert!(f.om.order(id).is_none());
        assert_eq!(f.state.sell_open_qty, 0);
        assert_eq!(f.state.cancel_count, 1);
        assert_eq!(f.state.cancel_confirm_count, 1);
        assert_eq!(f.state.netpos, -1);
        Ok(())
    }

    #[test]
    fn test_cancel_reject_with_quantity_restores() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Buy, 5819.0, 2)?;
        f.om.send_cancel(&mut f.state, &mut f.venue, id)?;
        let mut resp = ResponseMsg::new(ResponseType::CancelOrderReject, id, 2, 5819.0);
        resp.timestamp = 77;
        f.om.process_response(&mut f.state, &f.inst, &resp);

        assert_eq!(f.status(id), Some(OrderStatus::NewConfirm));
        assert_eq!(f.state.reject_count, 1);
        assert_eq!(f.om.last_cancel_reject(), Some(CancelRejectMark { order_id: id, ts: 77 }));
        Ok(())
    }

    #[test]
    fn test_cancel_reject_zero_qty_equals_trade() -> Result<(), OrderError> {
        let mut by_reject = Fixture::new();
        let id = by_reject.confirmed(Side::Buy, 5819.0, 3)?;
        by_reject.respond(ResponseType::TradeConfirm, id, 1, 5819.0);
        by_reject.om.send_cancel(&mut by_reject.state, &mut by_reject.venue, id)?;
        by_reject.respond(ResponseType::CancelOrderReject, id, 0, 0.0);

        let mut by_trade = Fixture::new();
        let id = by_trade.confirmed(Side::Buy, 5819.0, 3)?;
        by_trade.respond(ResponseType::TradeConfirm, id, 1, 5819.0);
        by_trade.om.send_cancel(&mut by_trade.state, &mut by_trade.venue, id)?;
        by_trade.respond(ResponseType::TradeConfirm, id, 2, 5819.0);

        assert!(by_reject.om.is_empty());
        assert_eq!(by_reject.state, by_trade.state);
        Ok(())
    }

    #[rstest]
    #[case(ResponseType::OrsReject)]
    #[case(ResponseType::RmsReject)]
    #[case(ResponseType::SimReject)]
    #[case(ResponseType::NewOrderFreeze)]
    #[case(ResponseType::OrderError)]
    fn test_new_reject_rolls_back(#[case] kind: ResponseType) -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.send(Side::Sell, 5822.0, 2)?;
        f.respond(kind, id, 0, 0.0);
        assert!(f.om.is_empty());
        assert!(f.om.order_at(Side::Sell, 5822.0).is_none());
        assert_eq!(f.state.sell_open_qty, 0);
        assert_eq!(f.state.sell_open_orders, 0);
        Ok(())
    }

    #[test]
    fn test_generic_reject_on_pending_modify_is_modify_reject() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Buy, 5810.0, 1)?;
        f.om.send_modify(&mut f.state, &mut f.venue, id, 5812.0, 1, HitType::Standard)?;
        f.respond(ResponseType::RmsReject, id, 0, 0.0);
        assert_eq!(f.status(id), Some(OrderStatus::ModifyReject));
        assert_eq!(f.state.reject_count, 1);
        assert!(f.om.order_at(Side::Buy, 5812.0).is_none());
        Ok(())
    }

    #[test]
    fn test_fill_during_pending_modify() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Buy, 5810.0, 4)?;
        f.om.send_modify(&mut f.state, &mut f.venue, id, 5811.0, 6, HitType::Standard)?;
        f.respond(ResponseType::TradeConfirm, id, 1, 5810.0);
        f.respond(ResponseType::ModifyOrderConfirm, id, 6, 5811.0);

        let ord = f.om.order(id).ok_or(OrderError::NotFound(id))?;
        assert_eq!((ord.qty, ord.done_qty, ord.open_qty), (6, 1, 5));
        assert_eq!(f.state.buy_open_qty, 5);
        Ok(())
    }

    #[test]
    fn test_informational_responses_change_nothing() -> Result<(), OrderError> {
        let mut f = Fixture::new();
        let id = f.confirmed(Side::Buy, 5810.0, 1)?;
        let before = f.state.clone();
        assert_eq!(
            f.respond(ResponseType::CancelOrderPending, id, 0, 0.0),
            Some(ResponseType::CancelOrderPending)
        );
        assert_eq!(f.state, before);
        assert_eq!(f.status(id), Some(OrderStatus::NewConfirm));
        Ok(())
    }
}
