//! Gates stage, §4.2.2: contradictions → statistics → risk/price.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::models::Candidate;
use crate::risk_gates::{contradictions, pre_entry_anti_chase};
use crate::scoring::StatisticsEngine;

use super::{EligibleCandidate, SkipRecord};

pub struct GateOutcome {
    pub eligible: Vec<EligibleCandidate>,
    pub skips: Vec<SkipRecord>,
}

/// `price_by_address` is the shared best-price map fetched once for the
/// cycle. `last_trade_at` maps token address to the timestamp of its most
/// recent trade, for the rebuy cooldown check.
pub fn run(
    candidates: Vec<Candidate>,
    price_by_address: &HashMap<String, f64>,
    last_trade_at: &HashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
    cfg: &Settings,
) -> GateOutcome {
    let mut skips = Vec::new();

    let mut survivors = Vec::new();
    for candidate in candidates {
        let reasons = contradictions(&candidate.row);
        if reasons.is_empty() {
            survivors.push(candidate);
        } else {
            skips.push(SkipRecord::new(candidate.identity(), reasons.join("|")));
        }
    }

    if survivors.is_empty() {
        return GateOutcome {
            eligible: Vec::new(),
            skips,
        };
    }

    let rows: Vec<_> = survivors.iter().map(|c| c.row.clone()).collect();
    let engine = StatisticsEngine::fit(&rows, cfg.score_weights.clone());

    let mut scored: Vec<Candidate> = survivors
        .into_iter()
        .filter_map(|mut c| {
            let score = engine.score(&c.row, c.token_age_hours);
            c.statistics_score = score;
            if score < cfg.stat_min {
                skips.push(SkipRecord::new(c.identity(), "STATISTICS_SCORE_BELOW_MIN"));
                None
            } else {
                Some(c)
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.statistics_score
            .partial_cmp(&a.statistics_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut eligible = Vec::new();
    for candidate in scored {
        if let Some(last) = last_trade_at.get(&candidate.row.address) {
            let elapsed_min = (now - *last).num_minutes();
            if elapsed_min < cfg.rebuy_cooldown_min {
                skips.push(SkipRecord::new(candidate.identity(), "REBUY_COOLDOWN"));
                continue;
            }
        }

        if let Some(rejection) = pre_entry_anti_chase(&candidate.row, cfg) {
            skips.push(SkipRecord::new(candidate.identity(), rejection.code()));
            continue;
        }

        let Some(&fresh_price) = price_by_address.get(&candidate.row.address) else {
            skips.push(SkipRecord::new(candidate.identity(), "NO_FRESH_PRICE"));
            continue;
        };

        let quoted = candidate.row.price_usd.unwrap_or(0.0);
        if quoted <= 0.0 || fresh_price <= 0.0 {
            skips.push(SkipRecord::new(candidate.identity(), "NO_FRESH_PRICE"));
            continue;
        }
        let ratio = (quoted / fresh_price).max(fresh_price / quoted);
        if ratio > cfg.max_deviation_multiplier {
            skips.push(SkipRecord::new(candidate.identity(), "PRICE_DEVIATION"));
            continue;
        }

        let statistics_score = candidate.statistics_score;
        eligible.push(EligibleCandidate {
            candidate,
            statistics_score,
        });
    }

    GateOutcome { eligible, skips }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormalizedRow, Windowed};

    fn row(address: &str) -> NormalizedRow {
        NormalizedRow {
            chain: "eth".into(),
            address: address.into(),
            pair_address: format!("{address}-pair"),
            symbol: address.to_uppercase(),
            price_usd: Some(1.0),
            price_native: Some(1.0),
            volume: Windowed {
                m5: Some(500.0),
                h1: Some(5_000.0),
                h6: Some(20_000.0),
                h24: Some(50_000.0),
            },
            liquidity_usd: Some(40_000.0),
            price_change_pct: Windowed {
                m5: Some(4.0),
                h1: Some(8.0),
                h6: Some(15.0),
                h24: Some(25.0),
            },
            txns: Windowed::default(),
            pair_created_at_ms: Some(
                (chrono::Utc::now() - chrono::Duration::hours(10)).timestamp_millis(),
            ),
            fdv: Some(1_000_000.0),
            market_cap: Some(500_000.0),
        }
    }

    fn candidate(address: &str) -> Candidate {
        Candidate {
            row: row(address),
            token_age_hours: 10.0,
            quality_score: 60.0,
            statistics_score: 0.0,
            entry_score: 0.0,
            score_final: 0.0,
            ai_quality_delta: None,
            ai_buy_probability: None,
        }
    }

    #[test]
    fn contradiction_drops_before_scoring() {
        let cfg = Settings::from_env().unwrap();
        let mut c = candidate("0xbad");
        c.row.market_cap = Some(10_000_000.0); // FDV_LT_MARKETCAP
        let prices = HashMap::from([("0xbad".to_string(), 1.0)]);
        let outcome = run(vec![c], &prices, &HashMap::new(), Utc::now(), &cfg);
        assert!(outcome.eligible.is_empty());
        assert_eq!(outcome.skips.len(), 1);
    }

    #[test]
    fn rebuy_cooldown_rejects_recent_address() {
        let cfg = Settings::from_env().unwrap();
        let c = candidate("0xfresh");
        let prices = HashMap::from([("0xfresh".to_string(), 1.0)]);
        let last_trade = HashMap::from([("0xfresh".to_string(), Utc::now())]);
        let outcome = run(vec![c], &prices, &last_trade, Utc::now(), &cfg);
        assert!(outcome.eligible.is_empty());
    }
}
