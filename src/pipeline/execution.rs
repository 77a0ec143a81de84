//! Execution stage, §4.2.3: size, gate on cash, compute thresholds.

use std::collections::HashMap;

use crate::config::Settings;
use crate::models::Candidate;
use crate::scoring::risk_size_multiplier;

use super::{EligibleCandidate, SkipRecord};

/// Entry/TP1/TP2/stop computed from `entry_price`, §4.3.5.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub tp1: f64,
    pub tp2: f64,
    pub stop: f64,
}

pub fn compute_thresholds(entry_price: f64, vol: f64, cfg: &Settings) -> Thresholds {
    let stop_frac = (1.8 * vol).clamp(cfg.sl_floor, cfg.sl_cap);
    let tp1_frac = cfg.tp1_default.max(0.9 * stop_frac);
    let tp2_frac = cfg.tp2_default.max(1.8 * tp1_frac);
    Thresholds {
        tp1: entry_price * (1.0 + tp1_frac),
        tp2: entry_price * (1.0 + tp2_frac),
        stop: entry_price * (1.0 - stop_frac),
    }
}

#[derive(Debug, Clone)]
pub struct BuyIntent {
    pub candidate: Candidate,
    pub entry_score: f64,
    pub notional_usd: f64,
    pub cash_before: f64,
    pub cash_after: f64,
    pub thresholds: Thresholds,
}

pub struct ExecutionPlan {
    pub buys: Vec<BuyIntent>,
    pub skips: Vec<SkipRecord>,
}

/// `ai_deltas` carries the vision-AI overlay result per address, already
/// budgeted to `AI_TOP_K` candidates by the caller; candidates absent from
/// the map are scored on `statistics_score` alone.
pub fn run(
    eligible: Vec<EligibleCandidate>,
    ai_deltas: &HashMap<String, f64>,
    starting_free_cash: f64,
    cfg: &Settings,
) -> ExecutionPlan {
    let mut skips = Vec::new();
    let mut buys = Vec::new();
    let mut free_cash = starting_free_cash;

    for eligible_candidate in eligible {
        if buys.len() >= cfg.buys_per_run {
            break;
        }

        let mut candidate = eligible_candidate.candidate;
        candidate.statistics_score = eligible_candidate.statistics_score;

        let entry_score = match ai_deltas.get(&candidate.row.address) {
            Some(&delta) => {
                candidate.ai_quality_delta = Some(delta);
                let bounded = (delta * cfg.ai_mult).clamp(-cfg.ai_max_abs, cfg.ai_max_abs);
                (candidate.statistics_score + bounded).clamp(0.0, 100.0)
            }
            None => candidate.statistics_score,
        };
        candidate.entry_score = entry_score;

        if entry_score < cfg.entry_min {
            skips.push(SkipRecord::new(candidate.identity(), "ENTRY_SCORE_BELOW_MIN"));
            continue;
        }

        let multiplier = risk_size_multiplier(&candidate, cfg);
        let per_order = (free_cash * cfg.per_buy_fraction).max(1.0) * multiplier;

        if free_cash < per_order || free_cash - per_order < cfg.min_free_cash {
            skips.push(SkipRecord::new(candidate.identity(), "INSUFFICIENT_CASH"));
            continue;
        }

        let entry_price = candidate.row.price_usd.unwrap_or(0.0);
        if entry_price <= 0.0 {
            skips.push(SkipRecord::new(candidate.identity(), "NO_FRESH_PRICE"));
            continue;
        }

        let vol = crate::scoring::realized_vol_proxy(&candidate);
        let thresholds = compute_thresholds(entry_price, vol, cfg);

        let cash_before = free_cash;
        free_cash -= per_order;
        let cash_after = free_cash;

        buys.push(BuyIntent {
            candidate,
            entry_score,
            notional_usd: per_order,
            cash_before,
            cash_after,
            thresholds,
        });
    }

    ExecutionPlan { buys, skips }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormalizedRow, Windowed};

    fn candidate(address: &str, statistics_score: f64) -> EligibleCandidate {
        let row = NormalizedRow {
            chain: "eth".into(),
            address: address.into(),
            pair_address: format!("{address}-pair"),
            symbol: address.to_uppercase(),
            price_usd: Some(2.0),
            price_native: Some(2.0),
            volume: Windowed::default(),
            liquidity_usd: Some(40_000.0),
            price_change_pct: Windowed {
                m5: Some(3.0),
                h1: Some(4.0),
                h6: None,
                h24: None,
            },
            txns: Windowed::default(),
            pair_created_at_ms: None,
            fdv: None,
            market_cap: None,
        };
        EligibleCandidate {
            candidate: Candidate {
                row,
                token_age_hours: 5.0,
                quality_score: 70.0,
                statistics_score,
                entry_score: 0.0,
                score_final: 0.0,
                ai_quality_delta: None,
                ai_buy_probability: None,
            },
            statistics_score,
        }
    }

    #[test]
    fn buys_per_run_cap_is_enforced() {
        let mut cfg = Settings::from_env().unwrap();
        cfg.buys_per_run = 1;
        let eligible = vec![candidate("0xa", 90.0), candidate("0xb", 80.0)];
        let plan = run(eligible, &HashMap::new(), 10_000.0, &cfg);
        assert_eq!(plan.buys.len(), 1);
        assert_eq!(plan.buys[0].candidate.row.address, "0xa");
    }

    #[test]
    fn thresholds_respect_floor_and_cap() {
        let cfg = Settings::from_env().unwrap();
        let t = compute_thresholds(1.0, 10.0, &cfg);
        assert!((t.stop - (1.0 - cfg.sl_cap)).abs() < 1e-9);
    }
}
