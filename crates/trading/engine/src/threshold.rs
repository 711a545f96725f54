//! Inventory-dependent entry/exit thresholds
//!
//! Regimes by net position `n` against `begin_pos`:
//!
//! | position            | bid side        | ask side        |
//! |---------------------|-----------------|-----------------|
//! | flat                | begin           | begin           |
//! | 0 < n < begin       | begin           | short           |
//! | -begin < n < 0      | short           | begin           |
//! | n >= begin          | long (or lerp)  | short (or lerp) |
//! | n <= -begin         | short (or lerp) | long (or lerp)  |
//!
//! The discrete policy jumps straight to long/short; the linear policy
//! interpolates from begin towards long/short in proportion to `|n| / max`.

use crate::config::ThresholdConfig;
use crate::position::{ExecutionState, Thresholds};
use orderbook::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdPolicy {
    Discrete,
    Linear,
}

impl ThresholdPolicy {
    #[must_use]
    pub fn from_config(cfg: &ThresholdConfig) -> Self {
        if cfg.use_linear { Self::Linear } else { Self::Discrete }
    }
}

/// Absolute quantity limits derived from lot or notional sizing
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn compute_sizing(cfg: &ThresholdConfig, inst: &Instrument) -> Thresholds {
    let contract = inst.contract();
    let lot = contract.lot_size as i64;
    let per_lot = |n: i64| if contract.send_in_lots { n } else { n * lot };

    let mut t = Thresholds {
        begin_pos: per_lot(cfg.begin_size),
        ..Thresholds::default()
    };
    if cfg.use_notional {
        let contract_value = inst.mid_price() * contract.lot_size;
        if contract_value > 0.0 {
            let lots = |notional: f64| (notional * contract.price_factor / contract_value) as i64;
            t.max_pos = lots(cfg.notional_max) * lot;
            t.size = lots(cfg.notional_size) * lot;
        }
        if cfg.notional_size > 0.0 {
            t.sms_ratio = (cfg.notional_max / cfg.notional_size) as i64;
        }
    } else {
        t.max_pos = per_lot(cfg.max_size);
        t.size = per_lot(cfg.size);
        if cfg.size > 0 {
            t.sms_ratio = cfg.max_size / cfg.size;
        }
    }
    t
}

impl ThresholdPolicy {
    /// Thresholds for `netpos` given precomputed sizing
    #[must_use]
    pub fn thresholds(self, netpos: i64, sizing: Thresholds, cfg: &ThresholdConfig, set_high: bool) -> Thresholds {
        let mut t = sizing;
        if self == Self::Linear && t.max_pos == 0 {
            return t;
        }
        let begin_place = if set_high { cfg.begin_place_high } else { cfg.begin_place };
        let begin = t.begin_pos;

        // (place, remove) for the side accumulating inventory and the side reducing it
        let (adding, reducing) = if netpos == 0 {
            ((begin_place, cfg.begin_remove), (begin_place, cfg.begin_remove))
        } else if netpos.abs() < begin {
            ((begin_place, cfg.begin_remove), (cfg.short_place, cfg.short_remove))
        } else {
            match self {
                Self::Discrete => {
                    let place = if set_high { cfg.long_place_high } else { cfg.long_place };
                    ((place, cfg.long_remove), (cfg.short_place, cfg.short_remove))
                }
                Self::Linear => {
                    let ratio = netpos.abs() as f64 / t.max_pos as f64;
                    let place = if set_high {
                        cfg.long_place_high
                    } else {
                        cfg.begin_place + (cfg.long_place - cfg.begin_place) * ratio
                    };
                    let remove = cfg.begin_remove + (cfg.long_remove - cfg.begin_remove) * ratio;
                    let short_place = cfg.begin_place - (cfg.begin_place - cfg.short_place) * ratio;
                    let short_remove =
                        cfg.begin_remove - (cfg.begin_remove - cfg.short_remove) * ratio;
                    ((place, remove), (short_place, short_remove))
                }
            }
        };

        let (bid, ask) = if netpos >= 0 { (adding, reducing) } else { (reducing, adding) };
        t.bid_place = bid.0;
        t.bid_remove = bid.1;
        t.ask_place = ask.0;
        t.ask_remove = ask.1;
        t
    }
}

/// Recompute sizing and thresholds into `state.thold`
pub fn set_thresholds(state: &mut ExecutionState, cfg: &ThresholdConfig, inst: &Instrument) {
    let policy = ThresholdPolicy::from_config(cfg);
    let sizing = compute_sizing(cfg, inst);
    state.thold = policy.thresholds(state.netpos, sizing, cfg, state.set_high || cfg.set_high);
}
