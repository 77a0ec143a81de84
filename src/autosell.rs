//! Per-position threshold machine: SL → TP2 → TP1, at most one action per
//! invocation. §4.4.

use crate::config::Settings;
use crate::models::{Position, PositionPhase, Side, Trade, TradeStatus};

const CLOSE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosellAction {
    Stop,
    Tp2,
    Tp1,
}

/// Evaluate `position` against `last_price_usd`. Mutates `position` in place
/// (qty, phase, updated_at, threshold reset) and returns the SELL trade it
/// produced, if any. Never produces more than one trade.
pub fn evaluate(
    position: &mut Position,
    last_price_usd: f64,
    cfg: &Settings,
) -> Option<(AutosellAction, Trade)> {
    if !position.is_open() || position.qty <= 0.0 || last_price_usd <= 0.0 {
        return None;
    }

    if position.stop > 0.0 && last_price_usd <= position.stop {
        return Some(close_full(position, last_price_usd, AutosellAction::Stop));
    }

    if position.tp2 > 0.0 && last_price_usd >= position.tp2 {
        return Some(close_full(position, last_price_usd, AutosellAction::Tp2));
    }

    if position.phase == PositionPhase::Open && position.tp1 > 0.0 && last_price_usd >= position.tp1 {
        return Some(take_partial(position, last_price_usd, cfg));
    }

    None
}

fn close_full(
    position: &mut Position,
    price: f64,
    action: AutosellAction,
) -> (AutosellAction, Trade) {
    let qty = position.qty;
    let mut trade = Trade::new(
        Side::Sell,
        position.symbol.clone(),
        position.chain.clone(),
        position.token_address.clone(),
        position.pair_address.clone(),
        price,
        qty,
        0.0,
        TradeStatus::Paper,
    );
    trade.pnl = Some(round2((price - position.entry) * qty));

    position.qty = 0.0;
    position.phase = PositionPhase::Closed;
    position.tp1 = 0.0;
    position.tp2 = 0.0;
    position.stop = 0.0;
    position.closed_at = Some(trade.created_at);
    position.updated_at = trade.created_at;

    (action, trade)
}

fn take_partial(position: &mut Position, price: f64, cfg: &Settings) -> (AutosellAction, Trade) {
    let sell_qty = position.qty * cfg.tp1_take_fraction;
    let mut trade = Trade::new(
        Side::Sell,
        position.symbol.clone(),
        position.chain.clone(),
        position.token_address.clone(),
        position.pair_address.clone(),
        price,
        sell_qty,
        0.0,
        TradeStatus::Paper,
    );
    trade.pnl = Some(round2((price - position.entry) * sell_qty));

    position.qty -= sell_qty;
    position.updated_at = trade.created_at;

    if position.qty <= CLOSE_EPSILON {
        position.qty = 0.0;
        position.phase = PositionPhase::Closed;
        position.tp1 = 0.0;
        position.tp2 = 0.0;
        position.stop = 0.0;
        position.closed_at = Some(trade.created_at);
    } else {
        position.phase = PositionPhase::Partial;
    }

    (AutosellAction::Tp1, trade)
}

/// Post-TP1 stop ratchet for the live (non-paper) execution path.
pub fn tighten_stop_after_tp1(current_stop: f64, entry: f64, tp1: f64) -> f64 {
    let ratcheted = entry * 1.002 + 0.35 * (tp1 - entry);
    current_stop.max(ratcheted)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Settings {
        Settings::from_env().unwrap()
    }

    fn pos() -> Position {
        Position::new(
            "TOK".into(),
            "eth".into(),
            "0xtoken".into(),
            "0xpair".into(),
            500.0,
            1.0,
            1.15,
            1.30,
            0.892,
        )
    }

    #[test]
    fn stop_precedence_closes_regardless_of_tp_range() {
        let cfg = cfg();
        let mut p = pos();
        // price is simultaneously >= tp1 in absolute terms is impossible here,
        // but verify stop wins when both stop and tp2 conditions could apply
        // by manufacturing an inverted (but internally consistent) position.
        p.stop = 1.0;
        p.tp1 = 0.5;
        p.tp2 = 0.5;
        let (action, trade) = evaluate(&mut p, 0.9, &cfg).expect("should produce a trade");
        assert_eq!(action, AutosellAction::Stop);
        assert_eq!(p.phase, PositionPhase::Closed);
        assert_eq!(trade.qty, 500.0);
    }

    #[test]
    fn tp2_instant_close() {
        let cfg = cfg();
        let mut p = pos();
        let (action, trade) = evaluate(&mut p, 1.31, &cfg).unwrap();
        assert_eq!(action, AutosellAction::Tp2);
        assert_eq!(p.phase, PositionPhase::Closed);
        assert_eq!(p.qty, 0.0);
        assert!((trade.pnl.unwrap() - 155.0).abs() < 1e-6);
    }

    #[test]
    fn tp1_partial_then_stop_closes() {
        let cfg = cfg();
        let mut p = pos();
        let (action1, trade1) = evaluate(&mut p, 1.16, &cfg).unwrap();
        assert_eq!(action1, AutosellAction::Tp1);
        assert_eq!(p.phase, PositionPhase::Partial);
        assert!((trade1.qty - 175.0).abs() < 1e-6);

        let (action2, trade2) = evaluate(&mut p, 0.88, &cfg).unwrap();
        assert_eq!(action2, AutosellAction::Stop);
        assert_eq!(p.phase, PositionPhase::Closed);
        assert!((trade2.qty - 325.0).abs() < 1e-6);

        let net = trade1.pnl.unwrap() + trade2.pnl.unwrap();
        assert!((net - (-11.0)).abs() < 1e-6);
    }

    #[test]
    fn tp1_fires_at_most_once() {
        let cfg = cfg();
        let mut p = pos();
        evaluate(&mut p, 1.16, &cfg).unwrap();
        assert_eq!(p.phase, PositionPhase::Partial);
        // tp1 stays at its original value but phase != Open so tp1 branch is
        // guarded; only stop/tp2 remain armed.
        let action = evaluate(&mut p, 1.20, &cfg);
        assert!(action.is_none());
    }

    #[test]
    fn closed_position_yields_no_trades() {
        let cfg = cfg();
        let mut p = pos();
        p.phase = PositionPhase::Closed;
        p.qty = 0.0;
        assert!(evaluate(&mut p, 0.5, &cfg).is_none());
        assert!(evaluate(&mut p, 5.0, &cfg).is_none());
    }

    #[test]
    fn at_most_one_action_per_invocation() {
        let cfg = cfg();
        let mut p = pos();
        // Price blows through both tp1 and tp2 at once: only one action fires.
        let result = evaluate(&mut p, 2.0, &cfg);
        assert!(result.is_some());
        assert_eq!(result.unwrap().0, AutosellAction::Tp2);
    }
}
