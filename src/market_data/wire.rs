//! Wire shapes for the aggregator's pairs/trending endpoints, and the
//! conversion into a [`NormalizedRow`].

use serde::Deserialize;

use crate::models::{NormalizedRow, TxnBucket, Windowed};

use super::numeric::{de_opt_f64, de_opt_i64};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireTxns {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireWindowed<T: Default> {
    pub m5: Option<T>,
    pub h1: Option<T>,
    pub h6: Option<T>,
    pub h24: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireToken {
    pub address: String,
    #[serde(default)]
    pub symbol: String,
}

/// A single pair as returned under `pairs[]` by the aggregator's tokens
/// endpoint. Numeric fields are tolerant of string encoding.
#[derive(Debug, Clone, Deserialize)]
pub struct Pair {
    #[serde(rename = "chainId", default = "default_chain")]
    pub chain_id: String,
    #[serde(rename = "pairAddress", default)]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: WireToken,

    #[serde(rename = "priceUsd", default, deserialize_with = "de_opt_f64")]
    pub price_usd: Option<f64>,
    #[serde(rename = "priceNative", default, deserialize_with = "de_opt_f64")]
    pub price_native: Option<f64>,

    #[serde(default)]
    pub volume: WireWindowed<f64>,
    #[serde(rename = "liquidity")]
    pub liquidity: Option<WireLiquidity>,
    #[serde(rename = "priceChange", default)]
    pub price_change: WireWindowed<f64>,
    #[serde(default)]
    pub txns: WireWindowed<WireTxns>,

    #[serde(rename = "pairCreatedAt", default, deserialize_with = "de_opt_i64")]
    pub pair_created_at: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub fdv: Option<f64>,
    #[serde(rename = "marketCap", default, deserialize_with = "de_opt_f64")]
    pub market_cap: Option<f64>,
}

fn default_chain() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLiquidity {
    pub usd: Option<f64>,
}

impl Pair {
    pub fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }
}

impl Pair {
    pub fn volume_24h(&self) -> Option<f64> {
        self.volume.h24
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingEntry {
    #[serde(rename = "tokenAddress")]
    pub token_address: Option<String>,
}

fn windowed<T: Default + Clone>(w: &WireWindowed<T>) -> Windowed<T> {
    Windowed {
        m5: w.m5.clone(),
        h1: w.h1.clone(),
        h6: w.h6.clone(),
        h24: w.h24.clone(),
    }
}

fn txn_windowed(w: &WireWindowed<WireTxns>) -> Windowed<TxnBucket> {
    let conv = |t: &WireTxns| TxnBucket {
        buys: t.buys,
        sells: t.sells,
    };
    Windowed {
        m5: w.m5.as_ref().map(conv),
        h1: w.h1.as_ref().map(conv),
        h6: w.h6.as_ref().map(conv),
        h24: w.h24.as_ref().map(conv),
    }
}

pub fn to_normalized_row(requested_address: &str, pair: &Pair) -> NormalizedRow {
    NormalizedRow {
        chain: pair.chain_id.clone(),
        address: requested_address.to_string(),
        pair_address: pair.pair_address.clone(),
        symbol: pair.base_token.symbol.clone(),
        price_usd: pair.price_usd,
        price_native: pair.price_native,
        volume: windowed(&pair.volume),
        liquidity_usd: pair.liquidity_usd(),
        price_change_pct: windowed(&pair.price_change),
        txns: txn_windowed(&pair.txns),
        pair_created_at_ms: pair.pair_created_at,
        fdv: pair.fdv,
        market_cap: pair.market_cap,
    }
}
