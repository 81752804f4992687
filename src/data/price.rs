use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PRICE_UPPER_BOUND;

/// One generated price for a symbol at a point in time.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PriceSample {
    pub symbol: String,
    pub price: f64,
    pub time: DateTime<Utc>,
}

impl PriceSample {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Draws prices uniformly from `[0, 100)`.
///
/// Stateless: every call uses the calling thread's RNG, so concurrent tickers
/// never contend on a shared generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceGenerator;

impl PriceGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, symbol: &str) -> PriceSample {
        PriceSample {
            symbol: symbol.to_string(),
            price: rand::thread_rng().gen_range(0.0..PRICE_UPPER_BOUND),
            time: Utc::now(),
        }
    }
}
