//! Immutable settings record.
//!
//! Every threshold the pipeline depends on is parameterized by an
//! environment variable, read once at process start (`Settings::from_env`)
//! and threaded explicitly through constructors — never a global singleton.

use std::env;
use std::time::Duration;

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendSortKey {
    Volume24h,
    LiquidityUsd,
}

/// Which window the momentum hard filter is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumInterval {
    FiveMin,
    OneHour,
    TwentyFourHour,
}

#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub liquidity: f64,
    pub volume_24h: f64,
    pub age_inverted: f64,
    pub momentum: f64,
    pub order_flow: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            liquidity: 1.0,
            volume_24h: 1.0,
            age_inverted: 0.5,
            momentum: 1.5,
            order_flow: 0.75,
        }
    }
}

/// The full, immutable settings record. Loaded once in `main` via
/// `Settings::from_env()` and passed by `Arc` to every subsystem.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_host: String,
    pub api_port: u16,

    pub database_path: String,

    pub mode_live: bool,
    pub starting_cash_usd: f64,

    // Aggregator / market data
    pub aggregator_base_url: String,
    pub aggregator_chunk_size: usize,
    pub aggregator_max_addresses: usize,
    pub aggregator_min_batch_size: usize,
    pub http_timeout_secs: u64,

    // Selection stage
    pub v24_min: f64,
    pub liq_min: f64,
    pub t5_pct: f64,
    pub t1_pct: f64,
    pub t24_pct: f64,
    pub max_results: usize,
    pub soft_min: usize,
    pub trend_sort_key: TrendSortKey,
    pub momentum_interval: MomentumInterval,

    // Quality gate
    pub age_min_hours: f64,
    pub age_max_hours: f64,
    pub max_abs_m5: f64,
    pub max_abs_h1: f64,
    pub max_abs_h6: f64,
    pub max_abs_h24: f64,
    pub quality_min: f64,

    // Statistics gate
    pub stat_min: f64,
    pub score_weights: ScoreWeights,

    // Risk / price gates
    pub rebuy_cooldown_min: i64,
    pub max_deviation_multiplier: f64,

    // Execution stage
    pub buys_per_run: usize,
    pub ai_top_k: usize,
    pub ai_mult: f64,
    pub ai_max_abs: f64,
    pub entry_min: f64,
    pub per_buy_fraction: f64,
    pub target_pos_vol: f64,
    pub min_free_cash: f64,

    // Threshold computation
    pub sl_floor: f64,
    pub sl_cap: f64,
    pub tp1_default: f64,
    pub tp2_default: f64,
    pub tp1_take_fraction: f64,

    // Consistency guard
    pub jump_factor: f64,
    pub alt_cycles: usize,
    pub fingerprint_window: usize,
    pub staleness_horizon_secs: i64,

    // Orchestrator cadence
    pub trend_interval_secs: u64,
    pub price_interval_secs: u64,

    // Vision AI
    pub vision_enabled: bool,
    pub vision_requests_per_minute: u32,
    pub vision_cache_ttl_secs: u64,
    pub vision_api_base_url: String,
    pub chart_capture_base_url: String,

    // PnL engine
    pub realized_recent_cutoff_hours: i64,

    // Lending sentinel
    pub lending_enabled: bool,
    pub lending_pool_base_url: String,
    pub lending_reloop_hf: f64,
    pub lending_warning_hf: f64,
    pub lending_danger_hf: f64,
    pub lending_emergency_hf: f64,
    pub lending_significant_deviation_hf: f64,
    pub lending_significant_deviation_equity_pct: f64,
    pub lending_alert_cooldown_secs: u64,
    pub lending_rescue_min_usd: f64,
    pub lending_rescue_max_cap_usd: f64,
    pub lending_rescue_backoff_secs: u64,
    pub lending_poll_interval_secs: u64,

    // Telegram command bot
    pub telegram_poll_interval_secs: u64,

    // Meta-aggregator
    pub meta_aggregator_base_url: String,
    pub meta_aggregator_slippage_bps: u32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            api_host: env_string("API_HOST", "0.0.0.0"),
            api_port: env_u64("API_PORT", 8080) as u16,

            database_path: env_string("DATABASE_PATH", "./driftwatch.db"),

            mode_live: env_bool("MODE_LIVE", false),
            starting_cash_usd: env_f64("STARTING_CASH_USD", 10_000.0),

            aggregator_base_url: env_string(
                "AGGREGATOR_BASE_URL",
                "https://api.dexscreener.com",
            ),
            aggregator_chunk_size: env_usize("AGGREGATOR_CHUNK_SIZE", 30),
            aggregator_max_addresses: env_usize("AGGREGATOR_MAX_ADDRESSES", 300),
            aggregator_min_batch_size: env_usize("AGGREGATOR_MIN_BATCH_SIZE", 1),
            http_timeout_secs: env_u64("HTTP_TIMEOUT_SECS", 12),

            v24_min: env_f64("V24_MIN", 20_000.0),
            liq_min: env_f64("LIQ_MIN", 15_000.0),
            t5_pct: env_f64("T5_PCT", 3.0),
            t1_pct: env_f64("T1_PCT", 5.0),
            t24_pct: env_f64("T24_PCT", 10.0),
            max_results: env_usize("MAX_RESULTS", 40),
            soft_min: env_usize("SOFT_MIN", 10),
            trend_sort_key: match env_string("TREND_SORT_KEY", "vol24h").as_str() {
                "liqUsd" => TrendSortKey::LiquidityUsd,
                _ => TrendSortKey::Volume24h,
            },
            momentum_interval: match env_string("MOMENTUM_INTERVAL", "5m").as_str() {
                "1h" => MomentumInterval::OneHour,
                "24h" => MomentumInterval::TwentyFourHour,
                _ => MomentumInterval::FiveMin,
            },

            age_min_hours: env_f64("AGE_MIN_HOURS", 1.0),
            age_max_hours: env_f64("AGE_MAX_HOURS", 24.0 * 30.0),
            max_abs_m5: env_f64("MAX_ABS_M5", 60.0),
            max_abs_h1: env_f64("MAX_ABS_H1", 150.0),
            max_abs_h6: env_f64("MAX_ABS_H6", 400.0),
            max_abs_h24: env_f64("MAX_ABS_H24", 1000.0),
            quality_min: env_f64("QUALITY_MIN", 40.0),

            stat_min: env_f64("STAT_MIN", 45.0),
            score_weights: ScoreWeights::default(),

            rebuy_cooldown_min: env_u64("REBUY_COOLDOWN_MIN", 45) as i64,
            max_deviation_multiplier: env_f64("MAX_DEVIATION_MULTIPLIER", 1.03),

            buys_per_run: env_usize("BUYS_PER_RUN", 3),
            ai_top_k: env_usize("AI_TOP_K", 3),
            ai_mult: env_f64("AI_MULT", 0.4),
            ai_max_abs: env_f64("AI_MAX_ABS", 15.0),
            entry_min: env_f64("ENTRY_MIN", 55.0),
            per_buy_fraction: env_f64("PER_BUY_FRACTION", 0.05),
            target_pos_vol: env_f64("TARGET_POS_VOL", 0.06),
            min_free_cash: env_f64("MIN_FREE_CASH", 50.0),

            sl_floor: env_f64("SL_FLOOR", 0.06),
            sl_cap: env_f64("SL_CAP", 0.25),
            tp1_default: env_f64("TP1_DEFAULT", 0.15),
            tp2_default: env_f64("TP2_DEFAULT", 0.30),
            tp1_take_fraction: env_f64("TP1_TAKE_FRACTION", 0.35),

            jump_factor: env_f64("JUMP_FACTOR", 5.0),
            alt_cycles: env_usize("ALT_CYCLES", 3),
            fingerprint_window: env_usize("FINGERPRINT_WINDOW", 24),
            staleness_horizon_secs: env_u64("STALENESS_HORIZON_SECS", 900) as i64,

            trend_interval_secs: env_u64("TREND_INTERVAL_SEC", 60),
            price_interval_secs: env_u64("PRICE_INTERVAL_SEC", 20),

            vision_enabled: env_bool("VISION_ENABLED", false),
            vision_requests_per_minute: env_u64("VISION_REQUESTS_PER_MINUTE", 20) as u32,
            vision_cache_ttl_secs: env_u64("VISION_CACHE_TTL_SECS", 180),
            vision_api_base_url: env_string("VISION_API_BASE_URL", ""),
            chart_capture_base_url: env_string("CHART_CAPTURE_BASE_URL", ""),

            realized_recent_cutoff_hours: env_u64("REALIZED_RECENT_CUTOFF_HOURS", 24) as i64,

            lending_enabled: env_bool("LENDING_ENABLED", false),
            lending_pool_base_url: env_string("LENDING_POOL_BASE_URL", ""),
            lending_reloop_hf: env_f64("LENDING_RELOOP_HF", 2.0),
            lending_warning_hf: env_f64("LENDING_WARNING_HF", 1.5),
            lending_danger_hf: env_f64("LENDING_DANGER_HF", 1.2),
            lending_emergency_hf: env_f64("LENDING_EMERGENCY_HF", 1.05),
            lending_significant_deviation_hf: env_f64("LENDING_SIGNIFICANT_DEVIATION_HF", 0.05),
            lending_significant_deviation_equity_pct: env_f64(
                "LENDING_SIGNIFICANT_DEVIATION_EQUITY_PCT",
                0.03,
            ),
            lending_alert_cooldown_secs: env_u64("LENDING_ALERT_COOLDOWN_SECONDS", 1800),
            lending_rescue_min_usd: env_f64("LENDING_RESCUE_MIN", 25.0),
            lending_rescue_max_cap_usd: env_f64("LENDING_RESCUE_MAX_CAP", 5_000.0),
            lending_rescue_backoff_secs: env_u64("LENDING_RESCUE_BACKOFF_SECS", 600),
            lending_poll_interval_secs: env_u64("LENDING_POLL_INTERVAL_SECS", 30),

            telegram_poll_interval_secs: env_u64("TELEGRAM_POLL_INTERVAL_SECS", 3),

            meta_aggregator_base_url: env_string(
                "META_AGGREGATOR_BASE_URL",
                "https://li.quest",
            ),
            meta_aggregator_slippage_bps: env_u64("META_AGGREGATOR_SLIPPAGE_BPS", 100) as u32,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
