//! Connector: drains the shared queues into the legs
//!
//! One engine per process. It owns the reader ends of the market-data and
//! response queues, the venue that writes requests, and every leg. Polling
//! is explicit; [`Engine::run`] is a convenience loop with backoff.

use crate::config::EngineConfig;
use crate::leg::Leg;
use crate::snapshot::{DailyInit, snapshot_path};
use crate::venue::{Identity, ORDER_ID_BLOCK, ShmVenue, VenueAdapter};
use anyhow::{Context, Result};
use bus::{ClientStore, MwmrQueue};
use common::{MarketUpdate, RequestMsg, ResponseMsg, Ts};
use crossbeam::utils::Backoff;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, trace, warn};

/// Messages handled by one [`Engine::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollStats {
    pub market_data: usize,
    pub responses: usize,
}

impl PollStats {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.market_data == 0 && self.responses == 0
    }
}

pub struct Engine<V: VenueAdapter> {
    md: MwmrQueue<MarketUpdate>,
    responses: MwmrQueue<ResponseMsg>,
    venue: V,
    client_id: u32,
    legs: Vec<Leg>,
    by_symbol: FxHashMap<String, usize>,
    strategy_id: i32,
    snapshot_dir: PathBuf,
    daily_init: DailyInit,
}

impl Engine<ShmVenue> {
    /// Attach to (or create) the shared segments named in `cfg` and mint a
    /// client ID from the counter store
    pub fn connect(cfg: &EngineConfig) -> Result<Self> {
        let t = &cfg.transport;
        let backend = t.segment_backend();
        let (md, requests, responses, store) = if t.create_segments {
            (
                MwmrQueue::<MarketUpdate>::create_on(&backend, t.md_key, t.md_capacity),
                MwmrQueue::<RequestMsg>::create_on(&backend, t.request_key, t.request_capacity),
                MwmrQueue::<ResponseMsg>::create_on(&backend, t.response_key, t.response_capacity),
                ClientStore::create_on(&backend, t.client_store_key, 1),
            )
        } else {
            (
                MwmrQueue::<MarketUpdate>::open_on(&backend, t.md_key, t.md_capacity),
                MwmrQueue::<RequestMsg>::open_on(&backend, t.request_key, t.request_capacity),
                MwmrQueue::<ResponseMsg>::open_on(&backend, t.response_key, t.response_capacity),
                ClientStore::open_on(&backend, t.client_store_key),
            )
        };
        let md = md.context("market-data queue")?;
        let requests = requests.context("request queue")?;
        let responses = responses.context("response queue")?;
        let store = store.context("client store")?;

        let client_id = u32::try_from(store.next_id()).context("client id out of range")?;
        info!(client_id, backend = ?backend, "connected to shared memory");
        let venue = ShmVenue::new(client_id, requests.writer());
        Self::new(cfg, md, responses, venue, client_id)
    }
}

impl<V: VenueAdapter> Engine<V> {
    /// Build the legs and load the daily snapshot
    pub fn new(
        cfg: &EngineConfig,
        md: MwmrQueue<MarketUpdate>,
        responses: MwmrQueue<ResponseMsg>,
        venue: V,
        client_id: u32,
    ) -> Result<Self> {
        let identity = Identity {
            account: cfg.account.clone(),
            product: cfg.product.clone(),
            strategy_id: cfg.strategy_id,
            exchange_type: cfg.exchange_type,
        };
        let mut legs = Vec::with_capacity(cfg.legs.len());
        let mut by_symbol = FxHashMap::default();
        for leg_cfg in &cfg.legs {
            let leg = Leg::new(leg_cfg, &identity)
                .with_context(|| format!("leg {}", leg_cfg.contract.symbol))?;
            by_symbol.insert(leg_cfg.contract.symbol.clone(), legs.len());
            legs.push(leg);
        }

        let path = snapshot_path(&cfg.snapshot_dir, cfg.strategy_id);
        let daily_init = DailyInit::load(&path, cfg.strategy_id)?;
        if let Some(first) = legs.first_mut() {
            first.set_ytd_position(daily_init.netpos_ytd1);
        }

        Ok(Self {
            md,
            responses,
            venue,
            client_id,
            legs,
            by_symbol,
            strategy_id: cfg.strategy_id,
            snapshot_dir: cfg.snapshot_dir.clone(),
            daily_init,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    #[must_use]
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    #[must_use]
    pub fn leg(&self, symbol: &str) -> Option<&Leg> {
        self.by_symbol.get(symbol).map(|&i| &self.legs[i])
    }

    pub fn leg_mut(&mut self, symbol: &str) -> Option<&mut Leg> {
        let i = *self.by_symbol.get(symbol)?;
        self.legs.get_mut(i)
    }

    /// A leg together with the venue, for sending instructions
    pub fn leg_and_venue(&mut self, symbol: &str) -> Option<(&mut Leg, &mut V)> {
        let i = *self.by_symbol.get(symbol)?;
        let leg = self.legs.get_mut(i)?;
        Some((leg, &mut self.venue))
    }

    #[must_use]
    pub fn venue(&self) -> &V {
        &self.venue
    }

    /// Snapshot loaded at startup
    #[must_use]
    pub fn daily_init(&self) -> &DailyInit {
        &self.daily_init
    }

    /// Update the average-spread baseline persisted at shutdown
    pub fn set_avg_spread(&mut self, avg_spread: f64) {
        self.daily_init.avg_spread = avg_spread;
    }

    /// Drain whatever is available on both inbound queues, then run the
    /// squareoff checks once per leg. Never blocks.
    pub fn poll(&mut self, now: Ts) -> PollStats {
        let mut stats = PollStats::default();

        while let Some(md) = self.md.try_dequeue() {
            stats.market_data += 1;
            if let Some(&i) = self.by_symbol.get(md.symbol()) {
                self.legs[i].on_market_data(&md);
            }
        }

        while let Some(resp) = self.responses.try_dequeue() {
            let order_id = resp.order_id;
            if order_id / ORDER_ID_BLOCK != self.client_id {
                trace!(order_id, "response for another client");
                continue;
            }
            stats.responses += 1;
            match self.legs.iter_mut().find(|l| l.orders().order(order_id).is_some()) {
                Some(leg) => {
                    leg.on_response(&resp);
                }
                None => warn!(order_id, kind = resp.response_type, "response for unknown order id"),
            }
        }

        for leg in &mut self.legs {
            leg.check_squareoff(now);
            if leg.state().on_flat {
                leg.handle_squareoff(&mut self.venue);
            }
        }
        stats
    }

    /// Poll until `shutdown` is set, calling `handler` after every poll
    /// that handled at least one message
    pub fn run<F>(&mut self, shutdown: &AtomicBool, mut handler: F)
    where
        F: FnMut(&mut Self, PollStats),
    {
        let backoff = Backoff::new();
        info!(client_id = self.client_id, legs = self.legs.len(), "engine running");
        while !shutdown.load(Ordering::Acquire) {
            let stats = self.poll(Ts::now());
            if stats.is_idle() {
                backoff.snooze();
            } else {
                backoff.reset();
                handler(self, stats);
            }
        }
        info!("engine stopped");
    }

    /// Persist carry-over position for the next session
    pub fn save_snapshot(&self) -> Result<()> {
        let mut snapshot = self.daily_init.clone();
        snapshot.strategy_id = self.strategy_id;
        if let Some(first) = self.legs.first() {
            let state = first.state();
            snapshot.netpos_ytd1 = state.netpos_pass_ytd + state.netpos_pass;
            snapshot.orig_base_name1 = first.instrument().contract().orig_base_name.clone();
        }
        if let Some(second) = self.legs.get(1) {
            snapshot.orig_base_name2 = second.instrument().contract().orig_base_name.clone();
        }
        let path = snapshot_path(&self.snapshot_dir, self.strategy_id);
        snapshot.save(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegConfig;
    use crate::execution::{HitType, OrderStatus};
    use crate::venue::PaperVenue;
    use bus::QueueWriter;
    use common::ResponseType;
    use orderbook::ContractSpec;

    fn config(dir: &std::path::Path) -> EngineConfig {
        let mut leg = LegConfig::default();
        leg.contract = ContractSpec::new("ag2506", 1.0, 15.0, 15.0);
        leg.contract.orig_base_name = "ag".into();
        EngineConfig {
            strategy_id: 92201,
            snapshot_dir: dir.to_path_buf(),
            legs: vec![leg],
            ..EngineConfig::default()
        }
    }

    struct Harness {
        engine: Engine<PaperVenue>,
        md: QueueWriter<MarketUpdate>,
        responses: QueueWriter<ResponseMsg>,
    }

    fn harness(dir: &std::path::Path) -> Result<Harness> {
        let md = MwmrQueue::<MarketUpdate>::anonymous(16)?;
        let responses = MwmrQueue::<ResponseMsg>::anonymous(16)?;
        let (md_in, resp_in) = (md.writer(), responses.writer());
        let engine = Engine::new(&config(dir), md, responses, PaperVenue::new(4), 4)?;
        Ok(Harness { engine, md: md_in, responses: resp_in })
    }

    #[test]
    fn test_engine_builds_legs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let h = harness(dir.path())?;
        assert_eq!(h.engine.client_id(), 4);
        assert_eq!(h.engine.legs().len(), 1);
        assert!(h.engine.leg("ag2506").is_some());
        assert!(h.engine.leg("rb2510").is_none());
        Ok(())
    }

    #[test]
    fn test_poll_routes_and_filters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut h = harness(dir.path())?;
        let (leg, venue) = h.engine.leg_and_venue("ag2506").context("leg")?;
        let id = leg.send_bid(venue, 5800.0, Some(2), HitType::Standard)?;
        assert_eq!(id, 4_000_001);

        let mut md = MarketUpdate::zeroed();
        md.set_symbol("ag2506");
        md.data.last_traded_price = 5801.0;
        h.md.enqueue(&md);
        let mut other = MarketUpdate::zeroed();
        other.set_symbol("rb2510");
        h.md.enqueue(&other);
        h.responses.enqueue(&ResponseMsg::new(ResponseType::NewOrderConfirm, 7_000_001, 2, 5800.0));
        h.responses.enqueue(&ResponseMsg::new(ResponseType::NewOrderConfirm, id, 2, 5800.0));

        let stats = h.engine.poll(Ts(0));
        assert_eq!(stats, PollStats { market_data: 2, responses: 1 });
        let leg = h.engine.leg("ag2506").context("leg")?;
        assert_eq!(leg.state().ltp, 5801.0);
        assert_eq!(leg.orders().order(id).map(|o| o.status), Some(OrderStatus::NewConfirm));

        assert!(h.engine.poll(Ts(0)).is_idle());
        Ok(())
    }

    #[test]
    fn test_run_stops_on_shutdown() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut h = harness(dir.path())?;
        let mut md = MarketUpdate::zeroed();
        md.set_symbol("ag2506");
        h.md.enqueue(&md);

        let shutdown = AtomicBool::new(false);
        let mut seen = 0;
        h.engine.run(&shutdown, |_, stats| {
            seen += stats.market_data;
            shutdown.store(true, Ordering::Release);
        });
        assert_eq!(seen, 1);
        Ok(())
    }

    #[test]
    fn test_snapshot_round_trip_through_engine() -> Result<()> {
        let dir = tempfile::tempdir()?;
        DailyInit { strategy_id: 92201, netpos_ytd1: 3, avg_spread: 1.5, ..DailyInit::default() }
            .save(&snapshot_path(dir.path(), 92201))?;

        let mut h = harness(dir.path())?;
        assert_eq!(h.engine.leg("ag2506").map(|l| l.state().netpos_pass_ytd), Some(3));
        assert_eq!(h.engine.daily_init().avg_spread, 1.5);

        let (leg, venue) = h.engine.leg_and_venue("ag2506").context("leg")?;
        let id = leg.send_bid(venue, 5800.0, Some(2), HitType::Standard)?;
        leg.on_response(&ResponseMsg::new(ResponseType::NewOrderConfirm, id, 2, 5800.0));
        leg.on_response(&ResponseMsg::new(ResponseType::TradeConfirm, id, 2, 5800.0));
        h.engine.set_avg_spread(2.0);
        h.engine.save_snapshot()?;

        let saved = DailyInit::load(&snapshot_path(dir.path(), 92201), 92201)?;
        assert_eq!(saved.netpos_ytd1, 5);
        assert_eq!(saved.avg_spread, 2.0);
        assert_eq!(saved.orig_base_name1, "ag");
        Ok(())
    }
}
