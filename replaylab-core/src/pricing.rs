//! External market-price lookup, used only to price max-hold forced closes.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Timestamp → price lookup per contract.
///
/// The replay driver consults this only when force-closing a position that
/// exceeded the maximum hold duration; a `None` answer falls back to the
/// position's entry price.
pub trait PriceLookup {
    fn price_at(&self, contract_address: &str, at: DateTime<Utc>) -> Option<f64>;
}

/// Default lookup: knows nothing, always falls back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrices;

impl PriceLookup for NoPrices {
    fn price_at(&self, _contract_address: &str, _at: DateTime<Utc>) -> Option<f64> {
        None
    }
}

/// In-memory price table: per contract, the most recent sample at or before
/// the queried timestamp.
#[derive(Debug, Default, Clone)]
pub struct PriceTable {
    by_contract: HashMap<String, BTreeMap<DateTime<Utc>, f64>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contract_address: impl Into<String>, at: DateTime<Utc>, price: f64) {
        self.by_contract
            .entry(contract_address.into())
            .or_default()
            .insert(at, price);
    }
}

impl PriceLookup for PriceTable {
    fn price_at(&self, contract_address: &str, at: DateTime<Utc>) -> Option<f64> {
        self.by_contract
            .get(contract_address)?
            .range(..=at)
            .next_back()
            .map(|(_, price)| *price)
    }
}
