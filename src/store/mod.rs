//! Transactional store: a single sqlite file behind `Arc<Mutex<Connection>>`,
//! exposing the tables named for positions, trades, portfolio snapshots, and
//! analytics. WAL journal mode with NORMAL synchronous, short-lived prepared
//! statements per call rather than a cached statement cache.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::models::{Analytics, AnalyticsOutcome, PortfolioSnapshot, Position, Trade};

mod rows;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: &str) -> EngineResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| EngineError::Fatal(format!("open store at {db_path}: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                chain TEXT NOT NULL,
                token_address TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                qty REAL NOT NULL,
                entry REAL NOT NULL,
                tp1 REAL NOT NULL,
                tp2 REAL NOT NULL,
                stop REAL NOT NULL,
                phase TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                closed_at TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_phase ON positions(phase)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_token ON positions(chain, token_address)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                side TEXT NOT NULL,
                symbol TEXT NOT NULL,
                chain TEXT NOT NULL,
                token_address TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                price REAL NOT NULL,
                qty REAL NOT NULL,
                fee REAL NOT NULL,
                pnl REAL,
                status TEXT NOT NULL,
                tx_hash TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_created_at ON trades(created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_token ON trades(chain, token_address, pair_address)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolio_snapshots (
                id TEXT PRIMARY KEY,
                equity REAL NOT NULL,
                cash REAL NOT NULL,
                holdings REAL NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_portfolio_snapshots_created_at ON portfolio_snapshots(created_at ASC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS analytics (
                id TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                chain TEXT NOT NULL,
                pair_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quality_score REAL NOT NULL,
                statistics_score REAL NOT NULL,
                entry_score REAL NOT NULL,
                ai_quality_delta REAL,
                ai_buy_probability REAL,
                decision TEXT NOT NULL,
                reason TEXT,
                notional_usd REAL,
                cash_before REAL NOT NULL,
                cash_after REAL NOT NULL,
                raw_payload TEXT NOT NULL,
                evaluated_at TEXT NOT NULL,
                trade_id TEXT,
                outcome_closed_at TEXT,
                outcome_holding_minutes REAL,
                outcome_pnl_pct REAL,
                outcome_pnl_usd REAL,
                outcome_was_profit INTEGER,
                outcome_exit_reason TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_analytics_evaluated_at ON analytics(evaluated_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_analytics_trade_id ON analytics(trade_id)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn insert_position(&self, position: &Position) -> EngineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO positions (id, symbol, chain, token_address, pair_address, qty, entry, tp1, tp2, stop, phase, opened_at, updated_at, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                position.id,
                position.symbol,
                position.chain,
                position.token_address,
                position.pair_address,
                position.qty,
                position.entry,
                position.tp1,
                position.tp2,
                position.stop,
                rows::phase_to_str(position.phase),
                position.opened_at.to_rfc3339(),
                position.updated_at.to_rfc3339(),
                position.closed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub async fn update_position(&self, position: &Position) -> EngineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE positions SET qty=?2, tp1=?3, tp2=?4, stop=?5, phase=?6, updated_at=?7, closed_at=?8 WHERE id=?1",
            params![
                position.id,
                position.qty,
                position.tp1,
                position.tp2,
                position.stop,
                rows::phase_to_str(position.phase),
                position.updated_at.to_rfc3339(),
                position.closed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub async fn open_positions(&self) -> EngineResult<Vec<Position>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, symbol, chain, token_address, pair_address, qty, entry, tp1, tp2, stop, phase, opened_at, updated_at, closed_at
             FROM positions WHERE phase IN ('OPEN','PARTIAL') ORDER BY opened_at ASC",
        )?;
        let out = stmt
            .query_map([], rows::position_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(out)
    }

    pub async fn insert_trade(&self, trade: &Trade) -> EngineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trades (id, side, symbol, chain, token_address, pair_address, price, qty, fee, pnl, status, tx_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                trade.id,
                rows::side_to_str(trade.side),
                trade.symbol,
                trade.chain,
                trade.token_address,
                trade.pair_address,
                trade.price,
                trade.qty,
                trade.fee,
                trade.pnl,
                rows::status_to_str(trade.status),
                trade.tx_hash,
                trade.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn all_trades(&self) -> EngineResult<Vec<Trade>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, side, symbol, chain, token_address, pair_address, price, qty, fee, pnl, status, tx_hash, created_at
             FROM trades ORDER BY created_at ASC",
        )?;
        let out = stmt
            .query_map([], rows::trade_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(out)
    }

    pub async fn last_trade_at_by_address(&self) -> EngineResult<std::collections::HashMap<String, chrono::DateTime<Utc>>> {
        let trades = self.all_trades().await?;
        let mut out = std::collections::HashMap::new();
        for trade in trades {
            out.entry(trade.token_address.clone())
                .and_modify(|existing: &mut chrono::DateTime<Utc>| {
                    if trade.created_at > *existing {
                        *existing = trade.created_at;
                    }
                })
                .or_insert(trade.created_at);
        }
        Ok(out)
    }

    pub async fn insert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> EngineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO portfolio_snapshots (id, equity, cash, holdings, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.id,
                snapshot.equity,
                snapshot.cash,
                snapshot.holdings,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn recent_portfolio_snapshots(&self, limit: usize) -> EngineResult<Vec<PortfolioSnapshot>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, equity, cash, holdings, created_at FROM portfolio_snapshots ORDER BY created_at DESC LIMIT ?1",
        )?;
        let mut out: Vec<PortfolioSnapshot> = stmt
            .query_map(params![limit as i64], rows::snapshot_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        out.reverse();
        Ok(out)
    }

    pub async fn insert_analytics(&self, analytics: &Analytics) -> EngineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO analytics (id, address, chain, pair_address, symbol, quality_score, statistics_score, entry_score, ai_quality_delta, ai_buy_probability, decision, reason, notional_usd, cash_before, cash_after, raw_payload, evaluated_at, trade_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                analytics.id,
                analytics.address,
                analytics.chain,
                analytics.pair_address,
                analytics.symbol,
                analytics.quality_score,
                analytics.statistics_score,
                analytics.entry_score,
                analytics.ai_quality_delta,
                analytics.ai_buy_probability,
                rows::decision_to_str(analytics.decision),
                analytics.reason,
                analytics.notional_usd,
                analytics.cash_before,
                analytics.cash_after,
                analytics.raw_payload.to_string(),
                analytics.evaluated_at.to_rfc3339(),
                analytics.trade_id,
            ],
        )?;
        Ok(())
    }

    pub async fn recent_analytics(&self, limit: usize) -> EngineResult<Vec<Analytics>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, address, chain, pair_address, symbol, quality_score, statistics_score, entry_score, ai_quality_delta, ai_buy_probability, decision, reason, notional_usd, cash_before, cash_after, raw_payload, evaluated_at, trade_id, outcome_closed_at, outcome_holding_minutes, outcome_pnl_pct, outcome_pnl_usd, outcome_was_profit, outcome_exit_reason
             FROM analytics ORDER BY evaluated_at DESC LIMIT ?1",
        )?;
        let mut out: Vec<Analytics> = stmt
            .query_map(params![limit as i64], rows::analytics_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        out.reverse();
        Ok(out)
    }

    /// Attaches the realized outcome to the analytics row that carries
    /// `trade_id`. A no-op if the row already has an outcome (attaches at
    /// most once, per the invariant).
    pub async fn attach_outcome(&self, trade_id: &str, outcome: &AnalyticsOutcome) -> EngineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE analytics SET
                outcome_closed_at=?2, outcome_holding_minutes=?3, outcome_pnl_pct=?4,
                outcome_pnl_usd=?5, outcome_was_profit=?6, outcome_exit_reason=?7
             WHERE trade_id=?1 AND outcome_closed_at IS NULL",
            params![
                trade_id,
                outcome.closed_at.to_rfc3339(),
                outcome.holding_minutes,
                outcome.pnl_pct,
                outcome.pnl_usd,
                outcome.was_profit as i64,
                outcome.exit_reason,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    #[tokio::test]
    async fn round_trips_a_position_through_a_real_sqlite_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("store.db");
        let store = Store::open(db_path.to_str().unwrap()).expect("open store");

        let position = Position::new(
            "TOK".into(),
            "eth".into(),
            "0xtok".into(),
            "0xtok-pair".into(),
            10.0,
            1.0,
            1.1,
            1.2,
            0.9,
        );
        store.insert_position(&position).await.expect("insert position");

        let open = store.open_positions().await.expect("open positions");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, position.id);
        assert_eq!(open[0].token_address, "0xtok");
    }

    #[tokio::test]
    async fn recent_analytics_orders_oldest_to_newest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("store.db");
        let store = Store::open(db_path.to_str().unwrap()).expect("open store");

        for i in 0..3 {
            let analytics = Analytics {
                id: format!("a{i}"),
                address: "0xabc".into(),
                chain: "eth".into(),
                pair_address: "0xabc-pair".into(),
                symbol: "ABC".into(),
                quality_score: 50.0,
                statistics_score: 50.0,
                entry_score: 50.0,
                ai_quality_delta: None,
                ai_buy_probability: None,
                decision: crate::models::Decision::Skip,
                reason: Some("TEST".into()),
                notional_usd: None,
                cash_before: 100.0,
                cash_after: 100.0,
                raw_payload: serde_json::Value::Null,
                evaluated_at: Utc::now() + chrono::Duration::seconds(i),
                trade_id: None,
                outcome: None,
            };
            store.insert_analytics(&analytics).await.expect("insert analytics");
        }

        let recent = store.recent_analytics(10).await.expect("recent analytics");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, "a0");
        assert_eq!(recent[2].id, "a2");
    }
}
