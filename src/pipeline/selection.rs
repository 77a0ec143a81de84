//! Selection stage, §4.2.1: raw rows → quality-gated, deduplicated
//! candidates.

use std::collections::HashSet;

use crate::config::{MomentumInterval, Settings, TrendSortKey};
use crate::models::{Candidate, NormalizedRow, Position};
use crate::scoring::quality_score;

fn sort_key(row: &NormalizedRow, key: TrendSortKey) -> f64 {
    match key {
        TrendSortKey::Volume24h => row.volume.h24.unwrap_or(0.0),
        TrendSortKey::LiquidityUsd => row.liquidity_usd.unwrap_or(0.0),
    }
}

fn meets_floors(row: &NormalizedRow, cfg: &Settings) -> bool {
    row.volume.h24.unwrap_or(0.0) >= cfg.v24_min && row.liquidity_usd.unwrap_or(0.0) >= cfg.liq_min
}

/// One branch selected by the configured momentum interval: `5m` passes on
/// `pct_5m ≥ T5 ∨ pct_24h ≥ T24`; `1h` on `pct_1h ≥ T1 ∨ pct_24h ≥ T24`;
/// otherwise on `pct_24h ≥ T24` alone.
fn meets_momentum_floor(row: &NormalizedRow, cfg: &Settings) -> bool {
    let p5 = row.price_change_pct.m5.unwrap_or(f64::NEG_INFINITY);
    let p1 = row.price_change_pct.h1.unwrap_or(f64::NEG_INFINITY);
    let p24 = row.price_change_pct.h24.unwrap_or(f64::NEG_INFINITY);
    match cfg.momentum_interval {
        MomentumInterval::FiveMin => p5 >= cfg.t5_pct || p24 >= cfg.t24_pct,
        MomentumInterval::OneHour => p1 >= cfg.t1_pct || p24 >= cfg.t24_pct,
        MomentumInterval::TwentyFourHour => p24 >= cfg.t24_pct,
    }
}

fn meets_soft_fill_floor(row: &NormalizedRow) -> bool {
    let p1 = row.price_change_pct.h1.unwrap_or(f64::NEG_INFINITY);
    let p24 = row.price_change_pct.h24.unwrap_or(f64::NEG_INFINITY);
    p1 >= 0.0 || p24 >= 0.0
}

fn row_matches_open_position(row: &NormalizedRow, open: &[Position]) -> bool {
    open.iter()
        .any(|p| p.is_open() && (p.symbol == row.symbol || p.token_address == row.address))
}

/// Runs the full selection stage over a freshly fetched universe.
pub fn select(universe: Vec<NormalizedRow>, open_positions: &[Position], cfg: &Settings) -> Vec<Candidate> {
    let mut hard_pass: Vec<NormalizedRow> = universe
        .iter()
        .filter(|r| meets_floors(r, cfg) && meets_momentum_floor(r, cfg))
        .cloned()
        .collect();
    hard_pass.sort_by(|a, b| {
        sort_key(b, cfg.trend_sort_key)
            .partial_cmp(&sort_key(a, cfg.trend_sort_key))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hard_pass.truncate(cfg.max_results);

    if hard_pass.len() < cfg.soft_min {
        let already: HashSet<String> = hard_pass.iter().map(|r| r.address.clone()).collect();
        let mut pool: Vec<NormalizedRow> = universe
            .into_iter()
            .filter(|r| !already.contains(&r.address) && meets_floors(r, cfg) && meets_soft_fill_floor(r))
            .collect();
        pool.sort_by(|a, b| {
            sort_key(b, cfg.trend_sort_key)
                .partial_cmp(&sort_key(a, cfg.trend_sort_key))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let need = cfg.soft_min - hard_pass.len();
        hard_pass.extend(pool.into_iter().take(need));
    }

    let now = chrono::Utc::now();
    let mut candidates: Vec<Candidate> = hard_pass
        .into_iter()
        .filter(|r| !row_matches_open_position(r, open_positions))
        .filter_map(|row| {
            let quality_score = quality_score(&row, cfg)?;
            let token_age_hours = row.token_age_hours(now).unwrap_or(0.0);
            if token_age_hours < cfg.age_min_hours || token_age_hours > cfg.age_max_hours {
                return None;
            }
            Some(Candidate {
                row,
                token_age_hours,
                quality_score,
                statistics_score: 0.0,
                entry_score: 0.0,
                score_final: 0.0,
                ai_quality_delta: None,
                ai_buy_probability: None,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        sort_key(&b.row, cfg.trend_sort_key)
            .partial_cmp(&sort_key(&a.row, cfg.trend_sort_key))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(cfg.max_results);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Windowed;

    fn row(address: &str, vol24: f64, liq: f64, p5: f64, p1: f64, p24: f64) -> NormalizedRow {
        NormalizedRow {
            chain: "eth".into(),
            address: address.into(),
            pair_address: format!("{address}-pair"),
            symbol: address.to_uppercase(),
            price_usd: Some(1.0),
            price_native: Some(1.0),
            volume: Windowed {
                m5: Some(vol24 / 100.0),
                h1: Some(vol24 / 10.0),
                h6: Some(vol24 / 2.0),
                h24: Some(vol24),
            },
            liquidity_usd: Some(liq),
            price_change_pct: Windowed {
                m5: Some(p5),
                h1: Some(p1),
                h6: Some(p1),
                h24: Some(p24),
            },
            txns: Windowed::default(),
            pair_created_at_ms: Some(
                (chrono::Utc::now() - chrono::Duration::hours(10)).timestamp_millis(),
            ),
            fdv: Some(1_000_000.0),
            market_cap: Some(500_000.0),
        }
    }

    #[test]
    fn hard_filter_drops_below_floors() {
        let cfg = Settings::from_env().unwrap();
        let universe = vec![row("0xlow", 100.0, 100.0, 10.0, 10.0, 10.0)];
        let out = select(universe, &[], &cfg);
        assert!(out.is_empty());
    }

    #[test]
    fn dedupes_against_open_positions_by_address() {
        let cfg = Settings::from_env().unwrap();
        let universe = vec![row("0xtok", 50_000.0, 50_000.0, 10.0, 10.0, 20.0)];
        let position = Position::new(
            "0XTOK".into(),
            "eth".into(),
            "0xtok".into(),
            "0xtok-pair".into(),
            10.0,
            1.0,
            1.1,
            1.2,
            0.9,
        );
        let out = select(universe, &[position], &cfg);
        assert!(out.is_empty());
    }
}
