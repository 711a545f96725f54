//! Order manager: resting orders and the instructions that create them
//!
//! Orders live in a [`SlotPool`]; the order-ID index and the two per-side
//! price indexes map into it. An order is in a price index only while it is
//! in the ID index, and [`OrderManager::remove_order`] is the only path
//! that deletes it.
//!
//! Response handling lives in [`crate::response`].

use crate::error::OrderError;
use crate::memory::{SlotId, SlotPool};
use crate::position::ExecutionState;
use crate::venue::{RequestTemplate, VenueAdapter};
use common::{Px, RequestType, Side, Ts};
use orderbook::Instrument;
use rustc_hash::FxHashMap;
use std::fmt;
use tracing::{debug, info};

/// Order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    NewOrder,
    NewConfirm,
    NewReject,
    ModifyOrder,
    ModifyConfirm,
    ModifyReject,
    CancelOrder,
    CancelConfirm,
    CancelReject,
    Traded,
}

impl OrderStatus {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NewOrder => "NEW_ORDER",
            Self::NewConfirm => "NEW_CONFIRM",
            Self::NewReject => "NEW_REJECT",
            Self::ModifyOrder => "MODIFY_ORDER",
            Self::ModifyConfirm => "MODIFY_CONFIRM",
            Self::ModifyReject => "MODIFY_REJECT",
            Self::CancelOrder => "CANCEL_ORDER",
            Self::CancelConfirm => "CANCEL_CONFIRM",
            Self::CancelReject => "CANCEL_REJECT",
            Self::Traded => "TRADED",
        }
    }

    /// Accepted by the exchange and not waiting on another instruction
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::NewConfirm | Self::ModifyConfirm | Self::ModifyReject)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an order is meant to interact with the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HitType {
    /// Rests passively
    #[default]
    Standard,
    /// Improves the best price
    Improve,
    /// Crosses the spread
    Cross,
    Detect,
    Match,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeOfOrder {
    #[default]
    Quote,
    PassiveHedge,
    AggressiveHedge,
}

/// Parameters of a new order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewOrder {
    pub side: Side,
    pub price: f64,
    pub qty: i64,
    /// Book level the price was taken from, for the queue estimate
    pub level: usize,
    pub hit: HitType,
    pub type_of_order: TypeOfOrder,
}

impl NewOrder {
    #[must_use]
    pub fn new(side: Side, price: f64, qty: i64) -> Self {
        Self {
            side,
            price,
            qty,
            level: 0,
            hit: HitType::Standard,
            type_of_order: TypeOfOrder::Quote,
        }
    }

    #[must_use]
    pub fn level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn hit(mut self, hit: HitType) -> Self {
        self.hit = hit;
        self
    }

    #[must_use]
    pub fn type_of_order(mut self, type_of_order: TypeOfOrder) -> Self {
        self.type_of_order = type_of_order;
        self
    }
}

/// One live order
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: u32,
    pub side: Side,
    pub price: f64,
    /// Total quantity including fills
    pub qty: i64,
    pub open_qty: i64,
    pub done_qty: i64,
    pub cxl_qty: i64,
    /// Terms of the pending modify; `new_qty` is the new total quantity
    pub new_price: f64,
    pub new_qty: i64,
    /// Terms before the most recent modify
    pub old_price: f64,
    pub old_qty: i64,
    pub status: OrderStatus,
    pub hit: HitType,
    pub type_of_order: TypeOfOrder,
    /// Resting quantity estimated ahead of this order
    pub quant_ahead: f64,
    pub modify_count: u32,
    pub modify_wait: bool,
    pub sent_ts: Ts,
}

impl Order {
    /// Open-quantity change reserved by the pending modify
    #[must_use]
    pub fn modify_delta(&self) -> i64 {
        if self.modify_wait { self.new_qty - self.qty } else { 0 }
    }
}

/// Last cancel reject seen, for strategies that pause re-cancelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRejectMark {
    pub order_id: u32,
    pub ts: u64,
}

/// Order manager for one leg
#[derive(Debug, Clone)]
pub struct OrderManager {
    pub(crate) orders: SlotPool<Order>,
    pub(crate) by_id: FxHashMap<u32, SlotId>,
    pub(crate) bids: FxHashMap<Px, SlotId>,
    pub(crate) asks: FxHashMap<Px, SlotId>,
    template: RequestTemplate,
    pub(crate) last_cancel_reject: Option<CancelRejectMark>,
}

impl OrderManager {
    #[must_use]
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            orders: SlotPool::with_capacity(64),
            by_id: FxHashMap::default(),
            bids: FxHashMap::default(),
            asks: FxHashMap::default(),
            template,
            last_cancel_reject: None,
        }
    }

    pub(crate) fn index(&self, side: Side) -> &FxHashMap<Px, SlotId> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub(crate) fn index_mut(&mut self, side: Side) -> &mut FxHashMap<Px, SlotId> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Place a new limit order.
    ///
    /// Fails without dispatching if an order already rests at the price on
    /// that side. Open quantity and open-order counters are reserved as
    /// soon as the venue accepts the request.
    pub fn send_new(
        &mut self,
        state: &mut ExecutionState,
        inst: &Instrument,
        venue: &mut dyn VenueAdapter,
        order: NewOrder,
    ) -> Result<u32, OrderError> {
        let NewOrder { side, price, qty, level, hit, type_of_order } = order;
        if qty <= 0 || price <= 0.0 {
            return Err(OrderError::InvalidOrder { qty, price });
        }
        let key = Px::new(price);
        if let Some(&slot) = self.index(side).get(&key) {
            let existing = self.orders.get(slot).map_or(0, |o| o.order_id);
            debug!(%side, price, existing, "price already occupied");
            return Err(OrderError::DuplicatePrice { price, existing });
        }

        let mut req = self.template.build(RequestType::NewOrder, 0, side, price, qty, 0, hit)?;
        let order_id = venue.send(&mut req)?;

        let (px, book_qty) = match side {
            Side::Buy => (&inst.bid_px, &inst.bid_qty),
            Side::Sell => (&inst.ask_px, &inst.ask_qty),
        };
        let valid = match side {
            Side::Buy => inst.valid_bids,
            Side::Sell => inst.valid_asks,
        };
        let quant_ahead = if level < valid && Px::new(px[level]) == key { book_qty[level] } else { 0.0 };

        let slot = self.orders.insert(Order {
            order_id,
            side,
            price,
            qty,
            open_qty: qty,
            done_qty: 0,
            cxl_qty: 0,
            new_price: 0.0,
            new_qty: 0,
            old_price: price,
            old_qty: qty,
            status: OrderStatus::NewOrder,
            hit,
            type_of_order,
            quant_ahead,
            modify_count: 0,
            modify_wait: false,
            sent_ts: Ts::now(),
        });
        self.by_id.insert(order_id, slot);
        self.index_mut(side).insert(key, slot);

        state.add_open(side, qty);
        state.add_open_orders(side, 1);
        state.order_count += 1;

        info!(order_id, %side, price, qty, ?hit, quant_ahead, "new order sent");
        Ok(order_id)
    }

    /// Move a confirmed order to `price` with new total quantity `new_qty`.
    ///
    /// The order is indexed under the new price straight away; its current
    /// terms stay in force until the modify is confirmed.
    pub fn send_modify(
        &mut self,
        state: &mut ExecutionState,
        venue: &mut dyn VenueAdapter,
        order_id: u32,
        price: f64,
        new_qty: i64,
        hit: HitType,
    ) -> Result<(), OrderError> {
        let slot = *self.by_id.get(&order_id).ok_or(OrderError::NotFound(order_id))?;
        let ord = self.orders.get(slot).ok_or(OrderError::NotFound(order_id))?;
        if ord.status == OrderStatus::ModifyOrder {
            return Err(OrderError::ModifyPending(order_id));
        }
        if !ord.status.is_confirmed() {
            return Err(OrderError::InvalidState { order_id, status: ord.status.name() });
        }
        if price <= 0.0 || new_qty <= ord.done_qty {
            return Err(OrderError::InvalidOrder { qty: new_qty, price });
        }
        let side = ord.side;
        let key = Px::new(price);
        if let Some(&other) = self.index(side).get(&key) {
            if other != slot {
                let existing = self.orders.get(other).map_or(0, |o| o.order_id);
                return Err(OrderError::DuplicatePrice { price, existing });
            }
        }

        let mut req = self.template.build(
            RequestType::ModifyOrder,
            order_id,
            side,
            price,
            new_qty,
            ord.done_qty,
            hit,
        )?;
        venue.send(&mut req)?;

        let Some(ord) = self.orders.get_mut(slot) else {
            return Err(OrderError::NotFound(order_id));
        };
        ord.old_price = ord.price;
        ord.old_qty = ord.qty;
        ord.status = OrderStatus::ModifyOrder;
        ord.new_price = price;
        ord.new_qty = new_qty;
        ord.hit = hit;
        ord.modify_count += 1;
        ord.modify_wait = true;
        let delta = ord.modify_delta();
        let (old_price, old_qty) = (ord.price, ord.qty);

        self.index_mut(side).insert(key, slot);
        state.add_open(side, delta);

        info!(order_id, %side, old_price, old_qty, price, new_qty, "modify sent");
        Ok(())
    }

    /// Cancel a confirmed order
    pub fn send_cancel(
        &mut self,
        state: &mut ExecutionState,
        venue: &mut dyn VenueAdapter,
        order_id: u32,
    ) -> Result<(), OrderError> {
        let slot = *self.by_id.get(&order_id).ok_or(OrderError::NotFound(order_id))?;
        let ord = self.orders.get(slot).ok_or(OrderError::NotFound(order_id))?;
        if !ord.status.is_confirmed() {
            return Err(OrderError::InvalidState { order_id, status: ord.status.name() });
        }

        let mut req = self.template.build(
            RequestType::CancelOrder,
            order_id,
            ord.side,
            ord.price,
            ord.open_qty,
            ord.done_qty,
            ord.hit,
        )?;
        venue.send(&mut req)?;

        if let Some(ord) = self.orders.get_mut(slot) {
            ord.status = OrderStatus::CancelOrder;
            info!(order_id, side = %ord.side, price = ord.price, open = ord.open_qty, "cancel sent");
        }
        state.cancel_count += 1;
        Ok(())
    }

    /// Cancel whatever rests at `price` on `side`
    pub fn send_cancel_at(
        &mut self,
        state: &mut ExecutionState,
        venue: &mut dyn VenueAdapter,
        side: Side,
        price: f64,
    ) -> Result<(), OrderError> {
        let order_id = self
            .order_at(side, price)
            .map(|o| o.order_id)
            .ok_or(OrderError::NotFound(0))?;
        self.send_cancel(state, venue, order_id)
    }

    /// Drop an order from every index and release its open-order count
    pub fn remove_order(&mut self, state: &mut ExecutionState, order_id: u32) -> Option<Order> {
        let slot = self.by_id.remove(&order_id)?;
        let ord = self.orders.remove(slot)?;
        let index = self.index_mut(ord.side);
        for price in [ord.price, ord.new_price] {
            let key = Px::new(price);
            if index.get(&key) == Some(&slot) {
                index.remove(&key);
            }
        }
        state.add_open_orders(ord.side, -1);
        debug!(order_id, status = %ord.status, "order removed");
        Some(ord)
    }

    #[must_use]
    pub fn order(&self, order_id: u32) -> Option<&Order> {
        self.by_id.get(&order_id).and_then(|&slot| self.orders.get(slot))
    }

    /// Order indexed at `price` on `side`
    #[must_use]
    pub fn order_at(&self, side: Side, price: f64) -> Option<&Order> {
        self.index(side)
            .get(&Px::new(price))
            .and_then(|&slot| self.orders.get(slot))
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().map(|(_, o)| o)
    }

    pub fn orders_on(&self, side: Side) -> impl Iterator<Item = &Order> {
        self.orders().filter(move |o| o.side == side)
    }

    /// IDs of live orders on `side`, snapshot for iterate-and-mutate loops
    #[must_use]
    pub fn order_ids(&self, side: Side) -> Vec<u32> {
        self.orders_on(side).map(|o| o.order_id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[must_use]
    pub fn has_orders(&self, side: Side) -> bool {
        self.orders_on(side).next().is_some()
    }

    #[must_use]
    pub fn last_cancel_reject(&self) -> Option<CancelRejectMark> {
        self.last_cancel_reject
    }

    /// Price-index entries per side; a pending modify contributes two
    #[must_use]
    pub fn indexed_prices(&self, side: Side) -> usize {
        self.index(side).len()
    }

    /// Forget every order, e.g. on session reset
    pub fn clear(&mut self) {
        self.orders.clear();
        self.by_id.clear();
        self.bids.clear();
        self.asks.clear();
        self.last_cancel_reject = None;
    }
}
