//! Engine configuration
//!
//! Loaded with the `config` crate from a file plus `EXEC__*` environment
//! overrides, e.g. `EXEC__TRANSPORT__SHM_DIR=/tmp/shm`.

use anyhow::{Context, Result, bail};
use bus::SegmentBackend;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use common::Ts;
use orderbook::ContractSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Entry/exit spread thresholds and position sizing for one leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub begin_place: f64,
    pub begin_remove: f64,
    pub long_place: f64,
    pub long_remove: f64,
    pub short_place: f64,
    pub short_remove: f64,
    /// Used instead of `begin_place` when the high-size flag is set
    pub begin_place_high: f64,
    /// Used instead of `long_place` when the high-size flag is set
    pub long_place_high: f64,

    /// Sizes in lots (or units when the contract is not traded in lots)
    pub begin_size: i64,
    pub max_size: i64,
    pub size: i64,

    /// Notional sizing, active when `use_notional` is set
    pub notional_max: f64,
    pub notional_size: f64,
    pub use_notional: bool,

    /// Linear interpolation instead of discrete jumps
    pub use_linear: bool,
    pub set_high: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            begin_place: 0.0,
            begin_remove: 0.0,
            long_place: 0.0,
            long_remove: 0.0,
            short_place: 0.0,
            short_remove: 0.0,
            begin_place_high: 0.0,
            long_place_high: 0.0,
            begin_size: 1,
            max_size: 1,
            size: 1,
            notional_max: 0.0,
            notional_size: 0.0,
            use_notional: false,
            use_linear: false,
            set_high: false,
        }
    }
}

/// Exchange fees: rates on traded value plus a flat fee per contract
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fees {
    pub buy_exch_tx: f64,
    pub sell_exch_tx: f64,
    pub buy_exch_contract_tx: f64,
    pub sell_exch_contract_tx: f64,
}

/// Forced-exit limits; zero disables a limit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Net PNL floor (positive number)
    pub max_loss: f64,
    /// Unrealized PNL floor (positive number)
    pub upnl_loss: f64,
    /// Drawdown floor (positive number)
    pub stop_loss: f64,
    pub max_orders: u64,
    pub max_traded_qty: i64,
    /// Local `HH:MM[:SS]` after which the leg exits
    pub end_time: Option<String>,
    /// Local `HH:MM[:SS]` after which the leg flattens aggressively
    pub end_time_agg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegConfig {
    pub contract: ContractSpec,
    pub fees: Fees,
    pub thresholds: ThresholdConfig,
    pub risk: RiskLimits,
}

/// Segment flavour for the shared queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// System V segments keyed like the order router's
    #[default]
    SysV,
    /// Files under `shm_dir`
    File,
}

/// Shared-memory keys and capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub backend: TransportBackend,
    /// Only used by the file backend
    pub shm_dir: PathBuf,
    pub md_key: u32,
    pub md_capacity: usize,
    pub request_key: u32,
    pub request_capacity: usize,
    pub response_key: u32,
    pub response_capacity: usize,
    pub client_store_key: u32,
    /// Create (and zero) segments instead of attaching to the router's
    pub create_segments: bool,
}

impl TransportConfig {
    #[must_use]
    pub fn segment_backend(&self) -> SegmentBackend {
        match self.backend {
            TransportBackend::SysV => SegmentBackend::SysV,
            TransportBackend::File => SegmentBackend::File(self.shm_dir.clone()),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: TransportBackend::SysV,
            shm_dir: PathBuf::from(bus::DEFAULT_SHM_DIR),
            md_key: 0x1001,
            md_capacity: 1024,
            request_key: 0x0f00,
            request_capacity: 1024,
            response_key: 0x1111,
            response_capacity: 1024,
            client_store_key: 0x0d0d,
            create_segments: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy_id: i32,
    pub account: String,
    pub product: String,
    pub exchange_type: u8,
    pub snapshot_dir: PathBuf,
    pub log_filter: String,
    pub transport: TransportConfig,
    pub legs: Vec<LegConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy_id: 0,
            account: String::new(),
            product: String::new(),
            exchange_type: 0,
            snapshot_dir: PathBuf::from("../data"),
            log_filter: "info".to_string(),
            transport: TransportConfig::default(),
            legs: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("EXEC").separator("__"))
            .build()
            .with_context(|| format!("loading config {path}"))?;

        let cfg: Self = settings
            .try_deserialize()
            .with_context(|| format!("parsing config {path}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.transport;
        if t.md_capacity == 0 || t.request_capacity == 0 || t.response_capacity == 0 {
            bail!("queue capacities must be non-zero");
        }
        for leg in &self.legs {
            let c = &leg.contract;
            if c.symbol.is_empty() {
                bail!("leg without symbol");
            }
            if c.lot_size <= 0.0 {
                bail!("{}: lot_size must be positive", c.symbol);
            }
            if c.tick_size <= 0.0 {
                bail!("{}: tick_size must be positive", c.symbol);
            }
            for t in [&leg.risk.end_time, &leg.risk.end_time_agg].into_iter().flatten() {
                parse_time_of_day(t).with_context(|| format!("{}: bad session time", c.symbol))?;
            }
        }
        Ok(())
    }
}

/// Parse `HH:MM`, `HH:MM:SS` or `HHMM`
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    for fmt in ["%H:%M:%S", "%H:%M", "%H%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    bail!("unrecognised time of day {s:?}")
}

/// Local wall-clock `time` on `date` as an epoch timestamp
pub fn session_epoch(time: NaiveTime, date: NaiveDate) -> Result<Ts> {
    let local = Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .with_context(|| format!("{date} {time} does not exist locally"))?;
    let nanos = local
        .timestamp_nanos_opt()
        .context("session time out of range")?;
    Ok(Ts::from_nanos(u64::try_from(nanos).context("session time before epoch")?))
}

/// Resolve an optional `HH:MM` limit for today; `None` disables it
pub fn resolve_today(time_of_day: Option<&str>) -> Result<Option<Ts>> {
    time_of_day.map(|s| {
        let time = parse_time_of_day(s)?;
        session_epoch(time, Local::now().date_naive())
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("14:55", 14, 55, 0)]
    #[case("14:55:30", 14, 55, 30)]
    #[case("1500", 15, 0, 0)]
    fn test_parse_time_of_day(#[case] s: &str, #[case] h: u32, #[case] m: u32, #[case] sec: u32) {
        assert_eq!(
            parse_time_of_day(s).ok(),
            NaiveTime::from_hms_opt(h, m, sec)
        );
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time_of_day("25:99").is_err());
        assert!(parse_time_of_day("soon").is_err());
    }

    #[test]
    fn test_session_epoch_orders_times() -> Result<()> {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).context("date")?;
        let early = session_epoch(parse_time_of_day("09:00")?, date)?;
        let late = session_epoch(parse_time_of_day("14:55")?, date)?;
        assert_eq!(late.as_nanos() - early.as_nanos(), (5 * 3600 + 55 * 60) * 1_000_000_000);
        Ok(())
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.toml");
        let mut f = std::fs::File::create(&path)?;
        writeln!(
            f,
            r#"
strategy_id = 92201
account = "ACC01"
snapshot_dir = "/tmp/snap"

[transport]
shm_dir = "/tmp/shm"
request_capacity = 500

[[legs]]
[legs.contract]
symbol = "ag2506"
tick_size = 1.0
lot_size = 15.0
price_multiplier = 15.0

[legs.thresholds]
begin_place = 2.0
max_size = 10

[legs.risk]
max_loss = 50000.0
end_time = "14:55"
"#
        )?;
        let cfg = EngineConfig::from_file(path.to_str().context("utf8 path")?)?;
        assert_eq!(cfg.strategy_id, 92201);
        assert_eq!(cfg.transport.request_capacity, 500);
        assert_eq!(cfg.transport.response_capacity, 1024);
        assert_eq!(cfg.transport.segment_backend(), SegmentBackend::SysV);
        assert_eq!(cfg.legs.len(), 1);
        assert_eq!(cfg.legs[0].contract.lot_size, 15.0);
        assert_eq!(cfg.legs[0].thresholds.max_size, 10);
        assert_eq!(cfg.legs[0].risk.end_time.as_deref(), Some("14:55"));
        Ok(())
    }

    #[test]
    fn test_file_backend_uses_shm_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "[transport]\nbackend = \"file\"\nshm_dir = \"/tmp/shm\"\n",
        )?;
        let cfg = EngineConfig::from_file(path.to_str().context("utf8 path")?)?;
        assert_eq!(cfg.transport.backend, TransportBackend::File);
        assert_eq!(
            cfg.transport.segment_backend(),
            SegmentBackend::File(PathBuf::from("/tmp/shm"))
        );
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_lot() {
        let mut cfg = EngineConfig::default();
        let mut leg = LegConfig::default();
        leg.contract.symbol = "rb2510".into();
        leg.contract.lot_size = 0.0;
        cfg.legs.push(leg);
        assert!(cfg.validate().is_err());
    }
}
