//! Pre-entry anti-chase, single-snapshot contradiction checks, and the
//! consistency guard (coarse fingerprint alternation detector).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::models::NormalizedRow;

/// Single-snapshot sanity checks, §4.3.2. Returns the pipe-joined reason
/// codes for every failing check (empty if the row passes).
pub fn contradictions(row: &NormalizedRow) -> Vec<&'static str> {
    let mut reasons = Vec::new();

    if let (Some(mcap), Some(fdv)) = (row.market_cap, row.fdv) {
        if mcap > 1.05 * fdv {
            reasons.push("FDV_LT_MARKETCAP");
        }
    }

    if let (Some(liq), Some(mcap)) = (row.liquidity_usd, row.market_cap) {
        if liq > mcap {
            reasons.push("LIQUIDITY_GT_MARKETCAP");
        }
    }

    if let (Some(vol24), Some(txns24)) = (row.volume.h24, row.txns.h24) {
        let total = txns24.total();
        if (vol24 > 0.0 && total == 0) || (vol24 == 0.0 && total > 0) {
            reasons.push("VOLUME_TXNS_CONFLICT");
        }
    }

    let buckets = [
        row.txns.m5.map(|b| b.total()),
        row.txns.h1.map(|b| b.total()),
        row.txns.h6.map(|b| b.total()),
        row.txns.h24.map(|b| b.total()),
    ];
    let present: Vec<u64> = buckets.into_iter().flatten().collect();
    if present.len() >= 2 && !present.windows(2).all(|w| w[0] <= w[1]) {
        reasons.push("TXNS_NON_MONOTONIC");
    }

    reasons
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiChaseRejection {
    LowLiquidity,
    OverextendedSpike,
    WeakBuyFlow,
}

impl AntiChaseRejection {
    pub fn code(&self) -> &'static str {
        match self {
            AntiChaseRejection::LowLiquidity => "low_liquidity",
            AntiChaseRejection::OverextendedSpike => "overextended_spike",
            AntiChaseRejection::WeakBuyFlow => "weak_buy_flow",
        }
    }
}

/// §4.3.4. Reject if liquidity is too thin, price is overextended, or buy
/// flow is weak despite a recent pump.
pub fn pre_entry_anti_chase(row: &NormalizedRow, cfg: &Settings) -> Option<AntiChaseRejection> {
    let liq = row.liquidity_usd.unwrap_or(0.0);
    if liq < cfg.liq_min {
        return Some(AntiChaseRejection::LowLiquidity);
    }

    let p5 = row.price_change_pct.m5.unwrap_or(0.0);
    let p1 = row.price_change_pct.h1.unwrap_or(0.0);
    if p5.abs() > cfg.max_abs_m5 && p1 > 0.7 * cfg.max_abs_h1 {
        return Some(AntiChaseRejection::OverextendedSpike);
    }

    let flow = row
        .txns
        .h1
        .or(row.txns.h24)
        .map(|b| b.order_flow())
        .unwrap_or(0.5);
    if flow < 0.48 && p5 > 6.0 {
        return Some(AntiChaseRejection::WeakBuyFlow);
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Ok,
    RequiresManualIntervention,
}

/// A coarse, bucketed observation used to detect feed alternation. Two
/// observations with identical buckets hash to the same fingerprint even if
/// the underlying floats differ slightly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Fingerprint {
    price_bucket: i64,
    liq_bucket: i64,
    fdv_bucket: i64,
    mcap_bucket: i64,
    buy5_bucket: i64,
    sell5_bucket: i64,
}

fn log_bucket(v: f64) -> i64 {
    if !v.is_finite() || v <= 0.0 {
        return i64::MIN;
    }
    (v.ln() * 20.0).round() as i64
}

fn linear_bucket(v: u64) -> i64 {
    (v / 5).max(0) as i64
}

fn fingerprint_of(row: &NormalizedRow, price: f64) -> Fingerprint {
    Fingerprint {
        price_bucket: log_bucket(price),
        liq_bucket: log_bucket(row.liquidity_usd.unwrap_or(0.0)),
        fdv_bucket: log_bucket(row.fdv.unwrap_or(0.0)),
        mcap_bucket: log_bucket(row.market_cap.unwrap_or(0.0)),
        buy5_bucket: linear_bucket(row.txns.m5.map(|b| b.buys).unwrap_or(0)),
        sell5_bucket: linear_bucket(row.txns.m5.map(|b| b.sells).unwrap_or(0)),
    }
}

struct Observation {
    fingerprint: Fingerprint,
    price: f64,
    at: DateTime<Utc>,
}

/// Per-`(chain, pair)` bounded deque of fingerprints, owned exclusively by
/// the loop that created it (the price-polling loop).
pub struct ConsistencyGuard {
    window: usize,
    alt_cycles: usize,
    jump_factor: f64,
    staleness_horizon_secs: i64,
    history: VecDeque<Observation>,
}

impl ConsistencyGuard {
    pub fn new(cfg: &Settings) -> Self {
        Self {
            window: cfg.fingerprint_window,
            alt_cycles: cfg.alt_cycles,
            jump_factor: cfg.jump_factor,
            staleness_horizon_secs: cfg.staleness_horizon_secs,
            history: VecDeque::with_capacity(cfg.fingerprint_window),
        }
    }

    /// Observe a fresh row/price at `at`. Tripwires fire in order: immediate
    /// price-ratio jump, then ABAB pattern, then staleness (which always
    /// records and returns OK).
    pub fn observe(&mut self, row: &NormalizedRow, price: f64, at: DateTime<Utc>) -> GuardVerdict {
        let fp = fingerprint_of(row, price);

        if let Some(prev) = self.history.back() {
            let age = (at - prev.at).num_seconds();
            if age > self.staleness_horizon_secs {
                self.push(fp, price, at);
                return GuardVerdict::Ok;
            }
            if prev.price > 0.0 && price > 0.0 {
                let ratio = price / prev.price;
                if ratio > self.jump_factor || ratio < 1.0 / self.jump_factor {
                    self.push(fp, price, at);
                    return GuardVerdict::RequiresManualIntervention;
                }
            }
        }

        self.push(fp, price, at);

        if self.is_alternating() {
            return GuardVerdict::RequiresManualIntervention;
        }

        GuardVerdict::Ok
    }

    fn push(&mut self, fingerprint: Fingerprint, price: f64, at: DateTime<Utc>) {
        if self.history.len() >= self.window {
            self.history.pop_front();
        }
        self.history.push_back(Observation {
            fingerprint,
            price,
            at,
        });
    }

    fn is_alternating(&self) -> bool {
        let need = 2 * self.alt_cycles;
        if self.history.len() < need {
            return false;
        }
        let tail: Vec<&Fingerprint> = self
            .history
            .iter()
            .rev()
            .take(need)
            .map(|o| &o.fingerprint)
            .collect();

        let distinct: std::collections::HashSet<&Fingerprint> = tail.iter().copied().collect();
        if distinct.len() != 2 {
            return false;
        }

        let a = tail[0];
        let b = tail[1];
        if a == b {
            return false;
        }
        tail.chunks(2).all(|pair| pair.len() == 2 && pair[0] == a && pair[1] == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Windowed;

    fn row(price_hint: f64) -> NormalizedRow {
        NormalizedRow {
            chain: "eth".into(),
            address: "0xabc".into(),
            pair_address: "0xpair".into(),
            symbol: "TOK".into(),
            price_usd: Some(price_hint),
            price_native: None,
            volume: Windowed::default(),
            liquidity_usd: Some(50_000.0),
            price_change_pct: Windowed::default(),
            txns: Windowed::default(),
            pair_created_at_ms: None,
            fdv: Some(100_000.0),
            market_cap: Some(150_001.0),
        }
    }

    #[test]
    fn contradiction_fdv_lt_marketcap() {
        let r = row(1.0);
        let reasons = contradictions(&r);
        assert!(reasons.contains(&"FDV_LT_MARKETCAP"));
    }

    #[test]
    fn jump_factor_tripwire_fires_on_second_observation() {
        let cfg = Settings::from_env().unwrap();
        let mut guard = ConsistencyGuard::new(&cfg);
        let r = row(1.0);
        let t0 = Utc::now();
        assert_eq!(guard.observe(&r, 1.0, t0), GuardVerdict::Ok);
        let verdict = guard.observe(&r, 6.0, t0 + chrono::Duration::seconds(5));
        assert_eq!(verdict, GuardVerdict::RequiresManualIntervention);
    }
}
