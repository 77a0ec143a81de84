//! Core record types. HTTP payloads are parsed once into these strongly-typed
//! structs at the boundary; nothing downstream ever touches a raw JSON map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// (chain, base-token address, pair address, symbol), content-addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub chain: String,
    pub address: String,
    pub pair_address: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxnBucket {
    pub buys: u64,
    pub sells: u64,
}

impl TxnBucket {
    pub fn total(&self) -> u64 {
        self.buys + self.sells
    }

    /// buys / (buys + sells); 0.5 with no activity.
    pub fn order_flow(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.5
        } else {
            self.buys as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Windowed<T> {
    pub m5: Option<T>,
    pub h1: Option<T>,
    pub h6: Option<T>,
    pub h24: Option<T>,
}

/// Flattened snapshot of a pair as returned by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub chain: String,
    pub address: String,
    pub pair_address: String,
    pub symbol: String,

    pub price_usd: Option<f64>,
    pub price_native: Option<f64>,

    pub volume: Windowed<f64>,
    pub liquidity_usd: Option<f64>,
    pub price_change_pct: Windowed<f64>,
    pub txns: Windowed<TxnBucket>,

    pub pair_created_at_ms: Option<i64>,
    pub fdv: Option<f64>,
    pub market_cap: Option<f64>,
}

impl NormalizedRow {
    pub fn token_age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        let created = self.pair_created_at_ms?;
        let created = DateTime::from_timestamp_millis(created)?;
        let hours = (now - created).num_seconds() as f64 / 3600.0;
        if hours.is_finite() {
            Some(hours.max(0.0))
        } else {
            None
        }
    }
}

/// An enriched `NormalizedRow`, owned by a single pipeline cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub row: NormalizedRow,
    pub token_age_hours: f64,
    pub quality_score: f64,
    pub statistics_score: f64,
    pub entry_score: f64,
    pub score_final: f64,
    pub ai_quality_delta: Option<f64>,
    pub ai_buy_probability: Option<f64>,
}

impl Candidate {
    pub fn identity(&self) -> TokenIdentity {
        TokenIdentity {
            chain: self.row.chain.clone(),
            address: self.row.address.clone(),
            pair_address: self.row.pair_address.clone(),
            symbol: self.row.symbol.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionPhase {
    Open,
    Partial,
    Closed,
    Staled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub chain: String,
    pub token_address: String,
    pub pair_address: String,
    pub qty: f64,
    pub entry: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub stop: f64,
    pub phase: PositionPhase,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(
        symbol: String,
        chain: String,
        token_address: String,
        pair_address: String,
        qty: f64,
        entry: f64,
        tp1: f64,
        tp2: f64,
        stop: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            symbol,
            chain,
            token_address,
            pair_address,
            qty,
            entry,
            tp1,
            tp2,
            stop,
            phase: PositionPhase::Open,
            opened_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, PositionPhase::Open | PositionPhase::Partial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub side: Side,
    pub symbol: String,
    pub chain: String,
    pub token_address: String,
    pub pair_address: String,
    pub price: f64,
    pub qty: f64,
    pub fee: f64,
    pub pnl: Option<f64>,
    pub status: TradeStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        side: Side,
        symbol: String,
        chain: String,
        token_address: String,
        pair_address: String,
        price: f64,
        qty: f64,
        fee: f64,
        status: TradeStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            side,
            symbol,
            chain,
            token_address,
            pair_address,
            price,
            qty,
            fee,
            pnl: None,
            status,
            tx_hash: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: String,
    pub equity: f64,
    pub cash: f64,
    pub holdings: f64,
    pub created_at: DateTime<Utc>,
}

/// A websocket-facing view of the portfolio, augmented with derived fields
/// that are never persisted verbatim (equity curve, realized PnL summary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioView {
    pub snapshot: PortfolioSnapshot,
    pub realized_total: f64,
    pub realized_recent: f64,
    pub unrealized: f64,
    pub equity_curve: Vec<PortfolioSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Buy,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsOutcome {
    pub trade_id: String,
    pub closed_at: DateTime<Utc>,
    pub holding_minutes: f64,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub was_profit: bool,
    pub exit_reason: String,
}

/// Per-evaluation audit row. One row per candidate per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub id: String,
    pub address: String,
    pub chain: String,
    pub pair_address: String,
    pub symbol: String,
    pub quality_score: f64,
    pub statistics_score: f64,
    pub entry_score: f64,
    pub ai_quality_delta: Option<f64>,
    pub ai_buy_probability: Option<f64>,
    pub decision: Decision,
    pub reason: Option<String>,
    pub notional_usd: Option<f64>,
    pub cash_before: f64,
    pub cash_after: f64,
    pub raw_payload: serde_json::Value,
    pub evaluated_at: DateTime<Utc>,
    /// Carried forward at BUY time so the outcome-attach step never has to
    /// guess which analytics row a closed trade belongs to.
    pub trade_id: Option<String>,
    pub outcome: Option<AnalyticsOutcome>,
}

impl Analytics {
    pub fn has_outcome(&self) -> bool {
        self.outcome.is_some()
    }
}
