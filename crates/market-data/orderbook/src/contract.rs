//! Static contract parameters

use serde::{Deserialize, Serialize};

/// Contract parameters fixed for the life of an [`crate::Instrument`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractSpec {
    /// Exchange symbol, e.g. `ag2506`
    pub symbol: String,
    /// Product code sent on requests
    pub product: String,
    /// Symbol alias persisted in the daily snapshot
    pub orig_base_name: String,
    pub exchange: String,
    pub token: i32,
    /// YYYYMMDD
    pub expiry_date: i32,
    pub tick_size: f64,
    pub lot_size: f64,
    /// Order quantities are already expressed in lots
    pub send_in_lots: bool,
    /// Value of one price point per unit, scales every PNL figure
    pub price_multiplier: f64,
    /// Price scaling used by notional sizing
    pub price_factor: f64,
}

impl Default for ContractSpec {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            product: String::new(),
            orig_base_name: String::new(),
            exchange: String::new(),
            token: 0,
            expiry_date: 0,
            tick_size: 1.0,
            lot_size: 1.0,
            send_in_lots: true,
            price_multiplier: 1.0,
            price_factor: 1.0,
        }
    }
}

impl ContractSpec {
    #[must_use]
    pub fn new(symbol: impl Into<String>, tick_size: f64, lot_size: f64, price_multiplier: f64) -> Self {
        let symbol = symbol.into();
        Self {
            orig_base_name: symbol.clone(),
            symbol,
            tick_size,
            lot_size,
            price_multiplier,
            ..Self::default()
        }
    }

    /// Round a price to the nearest tick
    #[must_use]
    pub fn round_to_tick(&self, price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        (price / self.tick_size).round() * self.tick_size
    }
}
