//! Squareoff controller - forced exits and stop-loss cool-off
//!
//! Evaluated every tick. All outcomes are flags on [`ExecutionState`]; the
//! leg acts on them in `handle_squareoff`.

use crate::config::{RiskLimits, resolve_today};
use crate::position::ExecutionState;
use anyhow::{Context, Result};
use common::Ts;
use std::fmt;
use tracing::{info, warn};

/// Stop-loss cool-off before trading resumes (15 minutes)
pub const STOP_LOSS_COOL_OFF_NS: u64 = 900_000_000_000;

/// Consecutive rejects without a confirm that force an exit
pub const REJECT_LIMIT: u64 = 200;

/// What a tick's evaluation triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareoffReason {
    AggressiveDeadline,
    Deadline,
    MaxLoss,
    MaxOrders,
    MaxTradedQty,
    RejectLimit,
    UpnlLoss,
    Drawdown,
    /// Cool-off elapsed, forced-exit flags cleared
    Resumed,
}

impl fmt::Display for SquareoffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AggressiveDeadline => "aggressive_end_time",
            Self::Deadline => "end_time",
            Self::MaxLoss => "max_loss",
            Self::MaxOrders => "max_orders",
            Self::MaxTradedQty => "max_traded_qty",
            Self::RejectLimit => "reject_limit",
            Self::UpnlLoss => "upnl_loss",
            Self::Drawdown => "stop_loss",
            Self::Resumed => "resumed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SquareoffController {
    configured: RiskLimits,
    /// Live limits; stop-loss floors double on every breach
    limits: RiskLimits,
    end_ts: Option<Ts>,
    end_agg_ts: Option<Ts>,
}

impl SquareoffController {
    #[must_use]
    pub fn new(limits: RiskLimits, end_ts: Option<Ts>, end_agg_ts: Option<Ts>) -> Self {
        Self {
            configured: limits.clone(),
            limits,
            end_ts,
            end_agg_ts,
        }
    }

    /// Resolve the configured session times against today's local date
    pub fn from_limits(limits: &RiskLimits) -> Result<Self> {
        let end_ts = resolve_today(limits.end_time.as_deref()).context("end_time")?;
        let end_agg_ts = resolve_today(limits.end_time_agg.as_deref()).context("end_time_agg")?;
        Ok(Self::new(limits.clone(), end_ts, end_agg_ts))
    }

    #[must_use]
    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Restore configured limits for a new session
    pub fn reset(&mut self) {
        self.limits = self.configured.clone();
    }

    /// Run the per-tick checks against `state`
    pub fn evaluate(&mut self, state: &mut ExecutionState, now: Ts) -> Option<SquareoffReason> {
        let mut fired = None;

        if let Some(agg) = self.end_agg_ts {
            if now >= agg && !state.agg_flat {
                state.agg_flat = true;
                state.on_exit = true;
                state.on_cancel = true;
                state.on_flat = true;
                info!(now = %now, "aggressive squareoff deadline reached");
                fired = Some(SquareoffReason::AggressiveDeadline);
            }
        }

        if state.on_stop_loss
            && state.stop_loss_ts.as_nanos() > 0
            && now.saturating_since(state.stop_loss_ts) >= STOP_LOSS_COOL_OFF_NS
        {
            state.on_stop_loss = false;
            state.on_exit = false;
            state.on_cancel = false;
            state.on_flat = false;
            info!(stopped_at = %state.stop_loss_ts, "stop-loss cool-off over, resuming");
            return Some(SquareoffReason::Resumed);
        }

        if state.on_exit {
            return fired;
        }

        if let Some(reason) = self.exit_reason(state, now) {
            state.on_exit = true;
            state.on_cancel = true;
            state.on_flat = true;
            warn!(
                %reason,
                net_pnl = state.net_pnl,
                orders = state.order_count,
                rejects = state.reject_count,
                "exit triggered"
            );
            return Some(reason);
        }

        self.check_stop_loss(state, now).or(fired)
    }

    fn exit_reason(&self, state: &ExecutionState, now: Ts) -> Option<SquareoffReason> {
        let l = &self.limits;
        if self.end_ts.is_some_and(|end| now >= end) {
            Some(SquareoffReason::Deadline)
        } else if l.max_loss > 0.0 && state.net_pnl < -l.max_loss {
            Some(SquareoffReason::MaxLoss)
        } else if l.max_orders > 0 && state.order_count >= l.max_orders {
            Some(SquareoffReason::MaxOrders)
        } else if l.max_traded_qty > 0
            && (state.buy_total_qty >= l.max_traded_qty || state.sell_total_qty >= l.max_traded_qty)
        {
            Some(SquareoffReason::MaxTradedQty)
        } else if reject_limit_hit(state) {
            Some(SquareoffReason::RejectLimit)
        } else {
            None
        }
    }

    fn check_stop_loss(&mut self, state: &mut ExecutionState, now: Ts) -> Option<SquareoffReason> {
        if state.netpos == 0 {
            return None;
        }
        let mut reason = None;
        if self.limits.upnl_loss > 0.0 && state.unrealised_pnl < -self.limits.upnl_loss {
            self.limits.upnl_loss *= 2.0;
            reason = Some(SquareoffReason::UpnlLoss);
        }
        if self.limits.stop_loss > 0.0 && state.drawdown < -self.limits.stop_loss {
            self.limits.stop_loss *= 2.0;
            reason = Some(SquareoffReason::Drawdown);
        }
        if let Some(r) = reason {
            state.on_flat = true;
            state.on_cancel = true;
            state.on_stop_loss = true;
            state.stop_loss_ts = now;
            warn!(
                reason = %r,
                upnl = state.unrealised_pnl,
                drawdown = state.drawdown,
                next_upnl_floor = self.limits.upnl_loss,
                next_drawdown_floor = self.limits.stop_loss,
                "stop loss triggered"
            );
        }
        reason
    }
}

/// Consecutive rejects reached [`REJECT_LIMIT`]
#[must_use]
pub fn reject_limit_hit(state: &ExecutionState) -> bool {
    state.reject_count >= REJECT_LIMIT
}

/// RMS reject: flatten aggressively with a halved liquidation size
#[allow(clippy::cast_possible_truncation)]
pub fn handle_rms_reject(state: &mut ExecutionState, lot_size: f64) {
    state.agg_flat = true;
    if state.rms_qty > 0 {
        state.rms_qty /= 2;
    }
    if state.rms_qty <= 0 {
        state.rms_qty = lot_size.max(1.0) as i64;
    }
    warn!(rms_qty = state.rms_qty, "rms reject, flattening aggressively");
}
