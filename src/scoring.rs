//! Scoring engine: quality gate pre-score, cohort-relative statistics score,
//! and the robust min-max scaler both are built on.

use crate::config::{ScoreWeights, Settings};
use crate::models::{Candidate, NormalizedRow, TxnBucket};

/// Logistic squash used for every momentum term: `1 / (1 + e^(-x/5))`.
pub fn sigma(x: f64) -> f64 {
    1.0 / (1.0 + (-x / 5.0).exp())
}

pub fn momentum_score(p5: f64, p1: f64, p6: f64, p24: f64) -> f64 {
    0.6 * sigma(p5) + 0.4 * sigma(p1) + 0.25 * sigma(p6) + 0.1 * sigma(p24)
}

fn order_flow_from_row(row: &NormalizedRow) -> f64 {
    row.txns
        .h1
        .or(row.txns.h24)
        .map(|b| TxnBucket::order_flow(&b))
        .unwrap_or(0.5)
}

/// Robust min-max scaler fit to a cohort's 5th/95th percentile band.
/// `transform(v)` is in `[0,1]`, monotone in `v`, and never NaN — if the
/// bottom and top percentile coincide, `top` is nudged to `bottom + 1`.
#[derive(Debug, Clone, Copy)]
pub struct RobustScaler {
    bottom: f64,
    top: f64,
}

impl RobustScaler {
    pub fn fit(values: &[f64]) -> Self {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self {
                bottom: 0.0,
                top: 1.0,
            };
        }
        finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let bottom = percentile(&finite, 5.0);
        let mut top = percentile(&finite, 95.0);
        if top <= bottom {
            top = bottom + 1.0;
        }
        Self { bottom, top }
    }

    pub fn transform(&self, v: f64) -> f64 {
        if !v.is_finite() {
            return 0.0;
        }
        ((v - self.bottom) / (self.top - self.bottom)).clamp(0.0, 1.0)
    }
}

/// Linear-interpolated percentile over an already-sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Quality gate admissibility score in `[0,100]`, §4.3.1. Returns `None` if
/// the row fails a hard quality precondition and must be dropped.
pub fn quality_score(row: &NormalizedRow, cfg: &Settings) -> Option<f64> {
    let liq = row.liquidity_usd?;
    let v24 = row.volume.h24?;
    if liq < cfg.liq_min || v24 < cfg.v24_min {
        return None;
    }

    let p5 = row.price_change_pct.m5;
    let p1 = row.price_change_pct.h1;
    let (p5, p1) = match (p5, p1) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() => (a, b),
        _ => return None,
    };
    let p6 = row.price_change_pct.h6.unwrap_or(0.0);
    let p24 = row.price_change_pct.h24.unwrap_or(0.0);

    if p5.abs() > cfg.max_abs_m5
        || p1.abs() > cfg.max_abs_h1
        || p6.abs() > cfg.max_abs_h6
        || p24.abs() > cfg.max_abs_h24
    {
        return None;
    }

    let momentum = momentum_score(p5, p1, p6, p24);
    let liq_component = (liq / (4.0 * cfg.liq_min)).min(1.0);

    let v5 = row.volume.m5.unwrap_or(0.0);
    let v1 = row.volume.h1.unwrap_or(0.0);
    let v6 = row.volume.h6.unwrap_or(0.0);
    let vol_component = 0.4 * (v5 / (4.0 * cfg.v24_min)).min(1.0)
        + 0.3 * (v1 / (4.0 * cfg.v24_min)).min(1.0)
        + 0.2 * (v6 / (4.0 * cfg.v24_min)).min(1.0)
        + 0.1 * (v24 / (4.0 * cfg.v24_min)).min(1.0);

    let score = 100.0 * (0.45 * momentum + 0.25 * liq_component + 0.30 * vol_component);
    if score < cfg.quality_min {
        None
    } else {
        Some(score.clamp(0.0, 100.0))
    }
}

struct RawFeatures {
    liquidity_usd: f64,
    volume_24h_usd: f64,
    age_hours: f64,
    momentum: f64,
    order_flow: f64,
}

/// Fit once per cohort (gates stage), then score each candidate against the
/// same percentile band — a candidate never re-scales the cohort mid-cycle.
pub struct StatisticsEngine {
    weights: ScoreWeights,
    liquidity: RobustScaler,
    volume_24h: RobustScaler,
    age: RobustScaler,
    momentum: RobustScaler,
    order_flow: RobustScaler,
}

impl StatisticsEngine {
    pub fn fit(rows: &[NormalizedRow], weights: ScoreWeights) -> Self {
        let features: Vec<RawFeatures> = rows.iter().map(raw_features).collect();
        let liquidity = RobustScaler::fit(&collect(&features, |f| f.liquidity_usd));
        let volume_24h = RobustScaler::fit(&collect(&features, |f| f.volume_24h_usd));
        let age = RobustScaler::fit(&collect(&features, |f| f.age_hours));
        let momentum = RobustScaler::fit(&collect(&features, |f| f.momentum));
        let order_flow = RobustScaler::fit(&collect(&features, |f| f.order_flow));
        Self {
            weights,
            liquidity,
            volume_24h,
            age,
            momentum,
            order_flow,
        }
    }

    pub fn score(&self, row: &NormalizedRow, token_age_hours: f64) -> f64 {
        let f = RawFeatures {
            liquidity_usd: row.liquidity_usd.unwrap_or(0.0),
            volume_24h_usd: row.volume.h24.unwrap_or(0.0),
            age_hours: token_age_hours,
            momentum: momentum_score(
                row.price_change_pct.m5.unwrap_or(0.0),
                row.price_change_pct.h1.unwrap_or(0.0),
                row.price_change_pct.h6.unwrap_or(0.0),
                row.price_change_pct.h24.unwrap_or(0.0),
            ),
            order_flow: order_flow_from_row(row),
        };

        let n_liq = self.liquidity.transform(f.liquidity_usd);
        let n_vol = self.volume_24h.transform(f.volume_24h_usd);
        let n_age = 1.0 - self.age.transform(f.age_hours);
        let n_mom = self.momentum.transform(f.momentum);
        let n_flow = self.order_flow.transform(f.order_flow);

        let w = &self.weights;
        let weighted_sum = w.liquidity * n_liq
            + w.volume_24h * n_vol
            + w.age_inverted * n_age
            + w.momentum * n_mom
            + w.order_flow * n_flow;
        let total_weight = w.liquidity + w.volume_24h + w.age_inverted + w.momentum + w.order_flow;

        if total_weight <= 0.0 {
            return 0.0;
        }
        (100.0 * weighted_sum / total_weight).clamp(0.0, 100.0)
    }
}

fn raw_features(row: &NormalizedRow) -> RawFeatures {
    RawFeatures {
        liquidity_usd: row.liquidity_usd.unwrap_or(0.0),
        volume_24h_usd: row.volume.h24.unwrap_or(0.0),
        age_hours: row
            .token_age_hours(chrono::Utc::now())
            .unwrap_or(0.0),
        momentum: momentum_score(
            row.price_change_pct.m5.unwrap_or(0.0),
            row.price_change_pct.h1.unwrap_or(0.0),
            row.price_change_pct.h6.unwrap_or(0.0),
            row.price_change_pct.h24.unwrap_or(0.0),
        ),
        order_flow: order_flow_from_row(row),
    }
}

fn collect(features: &[RawFeatures], f: impl Fn(&RawFeatures) -> f64) -> Vec<f64> {
    features.iter().map(f).collect()
}

/// `realized_vol_proxy = clamp(mean(|pct_5m|/100, |pct_1h|/100), 0.01, 0.30)`.
pub fn realized_vol_proxy(candidate: &Candidate) -> f64 {
    let p5 = candidate.row.price_change_pct.m5.unwrap_or(0.0).abs() / 100.0;
    let p1 = candidate.row.price_change_pct.h1.unwrap_or(0.0).abs() / 100.0;
    ((p5 + p1) / 2.0).clamp(0.01, 0.30)
}

/// `risk_size_multiplier = clamp(TARGET_POS_VOL / realized_vol_proxy, 0.5, 1.0)`.
pub fn risk_size_multiplier(candidate: &Candidate, cfg: &Settings) -> f64 {
    let vol = realized_vol_proxy(candidate);
    (cfg.target_pos_vol / vol).clamp(0.5, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robust_scaler_constant_input_has_no_nan() {
        let scaler = RobustScaler::fit(&[5.0, 5.0, 5.0]);
        let v = scaler.transform(5.0);
        assert!(v.is_finite());
        assert!((0.0..=1.0).contains(&v));
    }

    #[test]
    fn robust_scaler_is_monotone() {
        let scaler = RobustScaler::fit(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let a = scaler.transform(2.0);
        let b = scaler.transform(8.0);
        assert!(b >= a);
    }

    #[test]
    fn robust_scaler_bounds() {
        let scaler = RobustScaler::fit(&[1.0, 2.0, 3.0, 100.0, 1000.0]);
        for v in [-100.0, 0.0, 50.0, 500.0, 1e9] {
            let t = scaler.transform(v);
            assert!((0.0..=1.0).contains(&t), "{v} -> {t}");
        }
    }

    #[test]
    fn sigma_is_centered_at_half() {
        assert!((sigma(0.0) - 0.5).abs() < 1e-9);
        assert!(sigma(10.0) > 0.5);
        assert!(sigma(-10.0) < 0.5);
    }
}
