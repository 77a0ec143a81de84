//! sqlite row <-> domain type mapping.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::models::{
    Analytics, AnalyticsOutcome, Decision, Position, PositionPhase, PortfolioSnapshot, Side, Trade,
    TradeStatus,
};

pub fn phase_to_str(phase: PositionPhase) -> &'static str {
    match phase {
        PositionPhase::Open => "OPEN",
        PositionPhase::Partial => "PARTIAL",
        PositionPhase::Closed => "CLOSED",
        PositionPhase::Staled => "STALED",
    }
}

fn phase_from_str(s: &str) -> PositionPhase {
    match s {
        "PARTIAL" => PositionPhase::Partial,
        "CLOSED" => PositionPhase::Closed,
        "STALED" => PositionPhase::Staled,
        _ => PositionPhase::Open,
    }
}

pub fn side_to_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn side_from_str(s: &str) -> Side {
    if s == "SELL" {
        Side::Sell
    } else {
        Side::Buy
    }
}

pub fn status_to_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Paper => "PAPER",
        TradeStatus::Live => "LIVE",
    }
}

fn status_from_str(s: &str) -> TradeStatus {
    if s == "LIVE" {
        TradeStatus::Live
    } else {
        TradeStatus::Paper
    }
}

pub fn decision_to_str(decision: Decision) -> &'static str {
    match decision {
        Decision::Buy => "buy",
        Decision::Skip => "skip",
    }
}

fn decision_from_str(s: &str) -> Decision {
    if s == "buy" {
        Decision::Buy
    } else {
        Decision::Skip
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_rfc3339_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_rfc3339(&s))
}

pub fn position_from_row(row: &Row) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        symbol: row.get(1)?,
        chain: row.get(2)?,
        token_address: row.get(3)?,
        pair_address: row.get(4)?,
        qty: row.get(5)?,
        entry: row.get(6)?,
        tp1: row.get(7)?,
        tp2: row.get(8)?,
        stop: row.get(9)?,
        phase: phase_from_str(&row.get::<_, String>(10)?),
        opened_at: parse_rfc3339(&row.get::<_, String>(11)?),
        updated_at: parse_rfc3339(&row.get::<_, String>(12)?),
        closed_at: parse_rfc3339_opt(row.get(13)?),
    })
}

pub fn trade_from_row(row: &Row) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        side: side_from_str(&row.get::<_, String>(1)?),
        symbol: row.get(2)?,
        chain: row.get(3)?,
        token_address: row.get(4)?,
        pair_address: row.get(5)?,
        price: row.get(6)?,
        qty: row.get(7)?,
        fee: row.get(8)?,
        pnl: row.get(9)?,
        status: status_from_str(&row.get::<_, String>(10)?),
        tx_hash: row.get(11)?,
        created_at: parse_rfc3339(&row.get::<_, String>(12)?),
    })
}

pub fn snapshot_from_row(row: &Row) -> rusqlite::Result<PortfolioSnapshot> {
    Ok(PortfolioSnapshot {
        id: row.get(0)?,
        equity: row.get(1)?,
        cash: row.get(2)?,
        holdings: row.get(3)?,
        created_at: parse_rfc3339(&row.get::<_, String>(4)?),
    })
}

pub fn analytics_from_row(row: &Row) -> rusqlite::Result<Analytics> {
    let raw_payload_str: String = row.get(15)?;
    let raw_payload = serde_json::from_str(&raw_payload_str).unwrap_or(serde_json::Value::Null);

    let outcome_closed_at: Option<String> = row.get(18)?;
    let trade_id: Option<String> = row.get(17)?;
    let outcome = match outcome_closed_at {
        Some(closed_at) => Some(AnalyticsOutcome {
            trade_id: trade_id.clone().unwrap_or_default(),
            closed_at: parse_rfc3339(&closed_at),
            holding_minutes: row.get(19)?,
            pnl_pct: row.get(20)?,
            pnl_usd: row.get(21)?,
            was_profit: row.get::<_, i64>(22)? != 0,
            exit_reason: row.get(23)?,
        }),
        None => None,
    };

    Ok(Analytics {
        id: row.get(0)?,
        address: row.get(1)?,
        chain: row.get(2)?,
        pair_address: row.get(3)?,
        symbol: row.get(4)?,
        quality_score: row.get(5)?,
        statistics_score: row.get(6)?,
        entry_score: row.get(7)?,
        ai_quality_delta: row.get(8)?,
        ai_buy_probability: row.get(9)?,
        decision: decision_from_str(&row.get::<_, String>(10)?),
        reason: row.get(11)?,
        notional_usd: row.get(12)?,
        cash_before: row.get(13)?,
        cash_after: row.get(14)?,
        raw_payload,
        evaluated_at: parse_rfc3339(&row.get::<_, String>(16)?),
        trade_id,
        outcome,
    })
}
