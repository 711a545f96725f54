//! Venue adapters: where filled-in requests leave the engine
//!
//! The order manager builds a [`RequestMsg`] from a [`RequestTemplate`] and
//! hands it to a [`VenueAdapter`]. New orders get their ID assigned by the
//! adapter; modify and cancel carry the ID of the resting order.

use crate::error::OrderError;
use crate::execution::HitType;
use bus::QueueWriter;
use common::wire::write_fixed;
use common::{
    OrderDuration, OrderType, PositionDirection, PriceType, RequestMsg, RequestType, Side, Ts,
};
use orderbook::ContractSpec;
use tracing::{debug, trace};

/// Order IDs are `client_id * ORDER_ID_BLOCK + local_seq`
pub const ORDER_ID_BLOCK: u32 = 1_000_000;

/// Venue adapter trait - the single seam between order management and transport
pub trait VenueAdapter {
    /// Dispatch one request and return its order ID
    fn send(&mut self, req: &mut RequestMsg) -> Result<u32, OrderError>;
}

/// Mints order IDs inside this process's block
#[derive(Debug, Clone)]
pub struct OrderIdMinter {
    client_id: u32,
    seq: u32,
}

impl OrderIdMinter {
    #[must_use]
    pub fn new(client_id: u32) -> Self {
        Self { client_id, seq: 0 }
    }

    #[must_use]
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    pub fn next_id(&mut self) -> Result<u32, OrderError> {
        if self.seq + 1 >= ORDER_ID_BLOCK {
            return Err(OrderError::Dispatch(format!(
                "order id block of client {} exhausted",
                self.client_id
            )));
        }
        self.seq += 1;
        self.client_id
            .checked_mul(ORDER_ID_BLOCK)
            .and_then(|base| base.checked_add(self.seq))
            .ok_or_else(|| {
                OrderError::Dispatch(format!("client id {} out of range", self.client_id))
            })
    }

    /// True if `order_id` was minted by this client
    #[must_use]
    pub fn owns(&self, order_id: u32) -> bool {
        order_id / ORDER_ID_BLOCK == self.client_id
    }

    fn assign(&mut self, req: &mut RequestMsg) -> Result<u32, OrderError> {
        if req.request_type == RequestType::NewOrder.raw() {
            req.order_id = self.next_id()?;
        }
        Ok(req.order_id)
    }
}

/// Writes requests into the shared request queue
pub struct ShmVenue {
    ids: OrderIdMinter,
    queue: QueueWriter<RequestMsg>,
}

impl ShmVenue {
    #[must_use]
    pub fn new(client_id: u32, queue: QueueWriter<RequestMsg>) -> Self {
        Self {
            ids: OrderIdMinter::new(client_id),
            queue,
        }
    }

    #[must_use]
    pub fn ids(&self) -> &OrderIdMinter {
        &self.ids
    }
}

impl VenueAdapter for ShmVenue {
    fn send(&mut self, req: &mut RequestMsg) -> Result<u32, OrderError> {
        let order_id = self.ids.assign(req)?;
        req.timestamp = Ts::now().as_nanos();
        let seq = self.queue.enqueue(req);
        trace!(order_id, seq, kind = req.request_type, "request enqueued");
        Ok(order_id)
    }
}

/// In-memory venue for dry runs and tests
#[derive(Debug, Clone)]
pub struct PaperVenue {
    ids: OrderIdMinter,
    sent: Vec<RequestMsg>,
}

impl PaperVenue {
    #[must_use]
    pub fn new(client_id: u32) -> Self {
        Self {
            ids: OrderIdMinter::new(client_id),
            sent: Vec::new(),
        }
    }

    /// Requests in dispatch order
    #[must_use]
    pub fn sent(&self) -> &[RequestMsg] {
        &self.sent
    }

    #[must_use]
    pub fn last(&self) -> Option<&RequestMsg> {
        self.sent.last()
    }

    pub fn take(&mut self) -> Vec<RequestMsg> {
        std::mem::take(&mut self.sent)
    }
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new(1)
    }
}

impl VenueAdapter for PaperVenue {
    fn send(&mut self, req: &mut RequestMsg) -> Result<u32, OrderError> {
        let order_id = self.ids.assign(req)?;
        self.sent.push(*req);
        debug!(order_id, kind = req.request_type, price = req.price, "paper request");
        Ok(order_id)
    }
}

/// Process identity stamped on every request
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub account: String,
    pub product: String,
    pub strategy_id: i32,
    pub exchange_type: u8,
}

/// Request pre-filled with contract and identity fields
#[derive(Debug, Clone, Copy)]
pub struct RequestTemplate {
    base: RequestMsg,
}

impl RequestTemplate {
    #[must_use]
    pub fn new(contract: &ContractSpec, identity: &Identity) -> Self {
        let mut base = RequestMsg::zeroed();
        write_fixed(&mut base.contract.symbol, &contract.symbol);
        write_fixed(&mut base.contract.instrument_name, &contract.product);
        base.contract.expiry_date = contract.expiry_date;
        base.token = contract.token;
        write_fixed(&mut base.account_id, &identity.account);
        write_fixed(&mut base.product, &identity.product);
        base.strategy_id = identity.strategy_id;
        base.exchange_type = identity.exchange_type;
        base.ord_type = OrderType::Limit.raw();
        base.px_type = PriceType::PerUnit.raw();
        base.pos_direction = PositionDirection::Open.raw();
        Self { base }
    }

    /// Build one request; `qty` is the total order quantity including `filled`
    pub fn build(
        &self,
        kind: RequestType,
        order_id: u32,
        side: Side,
        price: f64,
        qty: i64,
        filled: i64,
        hit: HitType,
    ) -> Result<RequestMsg, OrderError> {
        let invalid = || OrderError::InvalidOrder { qty, price };
        let quantity = i32::try_from(qty).map_err(|_| invalid())?;
        let filled = i32::try_from(filled).map_err(|_| invalid())?;

        let mut req = self.base;
        req.request_type = kind.raw();
        req.order_id = order_id;
        req.transaction_type = side.as_byte();
        req.price = price;
        req.quantity = quantity;
        req.quantity_filled = filled;
        if kind != RequestType::CancelOrder {
            req.disclosed_qnty = quantity;
        }
        req.duration = if hit == HitType::Cross {
            OrderDuration::Fak.raw()
        } else {
            OrderDuration::Day.raw()
        };
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::MwmrQueue;

    fn template() -> RequestTemplate {
        let mut contract = ContractSpec::new("ag2506", 1.0, 15.0, 15.0);
        contract.token = 4711;
        contract.expiry_date = 20250616;
        let identity = Identity {
            account: "ACC01".into(),
            product: "TBSRC".into(),
            strategy_id: 92201,
            exchange_type: 5,
        };
        RequestTemplate::new(&contract, &identity)
    }

    #[test]
    fn test_template_fills_identity() -> Result<(), OrderError> {
        let req = template().build(RequestType::NewOrder, 0, Side::Sell, 5820.0, 3, 0, HitType::Standard)?;
        assert_eq!(req.symbol(), "ag2506");
        assert_eq!(req.account(), "ACC01");
        assert_eq!(req.product_code(), "TBSRC");
        assert_eq!(req.token, 4711);
        assert_eq!(req.contract.expiry_date, 20250616);
        assert_eq!(req.strategy_id, 92201);
        assert_eq!(req.side(), Some(Side::Sell));
        assert_eq!(req.order_kind(), Ok(OrderType::Limit));
        assert_eq!(req.price_kind(), Ok(PriceType::PerUnit));
        assert_eq!(req.order_duration(), Ok(OrderDuration::Day));
        assert_eq!(req.disclosed_qnty, 3);
        Ok(())
    }

    #[test]
    fn test_cross_uses_fak() -> Result<(), OrderError> {
        let req = template().build(RequestType::NewOrder, 0, Side::Buy, 5821.0, 1, 0, HitType::Cross)?;
        assert_eq!(req.order_duration(), Ok(OrderDuration::Fak));
        Ok(())
    }

    #[test]
    fn test_quantity_overflow_is_invalid() {
        let err = template().build(RequestType::NewOrder, 0, Side::Buy, 1.0, i64::MAX, 0, HitType::Standard);
        assert!(matches!(err, Err(OrderError::InvalidOrder { .. })));
    }

    #[test]
    fn test_minter_blocks() -> Result<(), OrderError> {
        let mut ids = OrderIdMinter::new(7);
        assert_eq!(ids.next_id()?, 7_000_001);
        assert_eq!(ids.next_id()?, 7_000_002);
        assert!(ids.owns(7_999_999));
        assert!(!ids.owns(8_000_001));
        Ok(())
    }

    #[test]
    fn test_minter_rejects_oversized_client() {
        let mut ids = OrderIdMinter::new(5000);
        assert!(ids.next_id().is_err());
    }

    #[test]
    fn test_paper_venue_assigns_only_new_orders() -> Result<(), OrderError> {
        let mut venue = PaperVenue::new(3);
        let mut new = template().build(RequestType::NewOrder, 0, Side::Buy, 5819.0, 1, 0, HitType::Standard)?;
        let id = venue.send(&mut new)?;
        assert_eq!(id, 3_000_001);

        let mut cancel = template().build(RequestType::CancelOrder, id, Side::Buy, 5819.0, 1, 0, HitType::Standard)?;
        assert_eq!(venue.send(&mut cancel)?, id);
        assert_eq!(venue.sent().len(), 2);
        assert_eq!(venue.sent()[1].order_id, id);
        Ok(())
    }

    #[test]
    fn test_shm_venue_enqueues() -> Result<(), Box<dyn std::error::Error>> {
        let mut queue = MwmrQueue::<RequestMsg>::anonymous(8)?;
        let mut venue = ShmVenue::new(2, queue.writer());
        let mut req = template().build(RequestType::NewOrder, 0, Side::Sell, 5830.0, 2, 0, HitType::Standard)?;
        let id = venue.send(&mut req)?;

        let out = queue.try_dequeue().ok_or("queue empty")?;
        assert_eq!(out.order_id, id);
        assert_eq!(out.quantity, 2);
        assert!(out.timestamp > 0);
        Ok(())
    }
}
