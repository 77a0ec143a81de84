//! Scanner loop (thread B, a dedicated single-thread runtime), price-polling
//! loop (thread A), and the shared portfolio-view computation both the price
//! loop and the hub's `init` frame use. §4.7, §5.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::autosell;
use crate::broadcast::{BroadcastSink, HubEvent};
use crate::chart::CachingChartCapture;
use crate::config::Settings;
use crate::market_data::AggregatorClient;
use crate::models::{
    Analytics, AnalyticsOutcome, Decision, PortfolioSnapshot, PortfolioView, Position,
};
use crate::pipeline::{execution, gates, selection, EligibleCandidate};
use crate::pnl::{cash_from_trades, compute_realized, holdings_value, round2, unrealized_value};
use crate::signer::ChainSigner;
use crate::store::Store;
use crate::trader::{BuyRequest, Trader};
use crate::vision::{RateLimitedVisionClient, VisionKey};

const VISION_PROMPT: &str = "Assess this chart for trend continuation: trend state, momentum bias, \
    and the probability of reaching TP1 before the stop, plus any recognizable chart patterns.";

pub struct Orchestrator {
    settings: Arc<Settings>,
    store: Store,
    broadcast: BroadcastSink,
    aggregator: AggregatorClient,
    trader: Trader,
    chart: Option<Arc<CachingChartCapture>>,
    vision: Option<Arc<RateLimitedVisionClient>>,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<Settings>,
        store: Store,
        broadcast: BroadcastSink,
        evm_signer: Option<Arc<dyn ChainSigner>>,
        spl_signer: Option<Arc<dyn ChainSigner>>,
    ) -> Self {
        Self::with_vision_pipeline(settings, store, broadcast, evm_signer, spl_signer, None, None)
    }

    /// Same as `new`, additionally wiring the vision-AI overlay when the
    /// caller has constructed concrete chart/vision clients (gated on
    /// `VISION_ENABLED` and both base URLs being configured).
    pub fn with_vision_pipeline(
        settings: Arc<Settings>,
        store: Store,
        broadcast: BroadcastSink,
        evm_signer: Option<Arc<dyn ChainSigner>>,
        spl_signer: Option<Arc<dyn ChainSigner>>,
        chart: Option<Arc<CachingChartCapture>>,
        vision: Option<Arc<RateLimitedVisionClient>>,
    ) -> Self {
        let aggregator = AggregatorClient::new(&settings);
        let trader = Trader::new(store.clone(), broadcast.clone(), evm_signer, spl_signer);
        Self {
            settings,
            store,
            broadcast,
            aggregator,
            trader,
            chart,
            vision,
        }
    }

    /// Builds the vision-AI quality-score-delta overlay for the top
    /// `ai_top_k` eligible candidates by statistics score. Candidates beyond
    /// that budget, and any candidate whose capture/assessment fails or is
    /// rate-limited, are simply absent from the returned map.
    async fn compute_ai_deltas(&self, eligible: &[EligibleCandidate]) -> HashMap<String, f64> {
        let mut deltas = HashMap::new();
        let (Some(chart), Some(vision)) = (&self.chart, &self.vision) else {
            return deltas;
        };

        let mut ranked: Vec<&EligibleCandidate> = eligible.iter().collect();
        ranked.sort_by(|a, b| {
            b.statistics_score
                .partial_cmp(&a.statistics_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for candidate in ranked.into_iter().take(self.settings.ai_top_k) {
            let row = &candidate.candidate.row;
            let png = match chart
                .capture_cached(&row.chain, &row.pair_address, candidate.candidate.token_age_hours)
                .await
            {
                Ok(png) => png,
                Err(e) => {
                    warn!(error = %e, address = %row.address, "chart capture failed");
                    continue;
                }
            };

            let key = VisionKey {
                symbol_or_chain: row.chain.clone(),
                pair_address: row.pair_address.clone(),
                timeframe: crate::chart::interval_for_age(candidate.candidate.token_age_hours)
                    .as_str()
                    .to_string(),
                lookback: row.address.clone(),
            };

            match vision.assess_cached(key, &png, VISION_PROMPT).await {
                Ok(Some(assessment)) => {
                    deltas.insert(row.address.clone(), assessment.quality_score_delta);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, address = %row.address, "vision assessment failed"),
            }
        }

        deltas
    }

    /// One scanner cycle: selection → gates → execution → dispatch each
    /// sized buy through the trader → persisted analytics. A route is only
    /// required in LIVE mode; the meta-aggregator quote client is an
    /// external collaborator this core doesn't fetch from directly, so
    /// LIVE buys here always fail fast until a deployment wires one in.
    pub async fn run_scanner_cycle(&self) -> anyhow::Result<Vec<execution::BuyIntent>> {
        let cfg = &self.settings;
        let open_positions = self.store.open_positions().await?;

        let universe = self
            .aggregator
            .fetch_trending_candidates(cfg.max_results * 4, cfg.trend_sort_key)
            .await;

        let candidates = selection::select(universe, &open_positions, cfg);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let addresses: Vec<String> = candidates.iter().map(|c| c.row.address.clone()).collect();
        let price_by_address = self.aggregator.fetch_prices_by_addresses(&addresses).await;
        let last_trade_at = self.store.last_trade_at_by_address().await?;

        let gate_outcome = gates::run(candidates, &price_by_address, &last_trade_at, chrono::Utc::now(), cfg);
        for skip in &gate_outcome.skips {
            self.persist_skip(skip, 0.0, 0.0).await;
        }

        let trades = self.store.all_trades().await?;
        let free_cash = cash_from_trades(cfg.starting_cash_usd, &trades)
            - holdings_value(&open_positions, &price_by_address);

        let ai_deltas = self.compute_ai_deltas(&gate_outcome.eligible).await;
        let plan = execution::run(gate_outcome.eligible, &ai_deltas, free_cash, cfg);
        for skip in &plan.skips {
            self.persist_skip(skip, free_cash, free_cash).await;
        }

        let mut executed = Vec::new();
        for buy in plan.buys {
            let request = BuyRequest {
                chain: buy.candidate.row.chain.clone(),
                symbol: buy.candidate.row.symbol.clone(),
                token_address: buy.candidate.row.address.clone(),
                pair_address: buy.candidate.row.pair_address.clone(),
                external_price: buy.candidate.row.price_usd.unwrap_or(0.0),
                aggregator_price: buy.candidate.row.price_usd.unwrap_or(0.0),
                notional_usd: buy.notional_usd,
                thresholds: buy.thresholds,
            };
            match self.trader.buy(request, cfg.mode_live, None, cfg).await {
                Ok(outcome) => {
                    self.persist_buy_analytics(&buy, Some(outcome.trade.id.clone())).await;
                    executed.push(buy);
                }
                Err(e) => {
                    warn!(error = %e, symbol = %buy.candidate.row.symbol, "buy dispatch failed");
                    self.persist_skip(
                        &crate::pipeline::SkipRecord::new(buy.candidate.identity(), "BUY_EXECUTION_FAILED"),
                        buy.cash_before,
                        buy.cash_before,
                    )
                    .await;
                }
            }
        }

        Ok(executed)
    }

    async fn persist_skip(&self, skip: &crate::pipeline::SkipRecord, cash_before: f64, cash_after: f64) {
        let analytics = Analytics {
            id: Uuid::new_v4().to_string(),
            address: skip.identity.address.clone(),
            chain: skip.identity.chain.clone(),
            pair_address: skip.identity.pair_address.clone(),
            symbol: skip.identity.symbol.clone(),
            quality_score: 0.0,
            statistics_score: 0.0,
            entry_score: 0.0,
            ai_quality_delta: None,
            ai_buy_probability: None,
            decision: Decision::Skip,
            reason: Some(skip.reason.clone()),
            notional_usd: None,
            cash_before,
            cash_after,
            raw_payload: serde_json::Value::Null,
            evaluated_at: chrono::Utc::now(),
            trade_id: None,
            outcome: None,
        };
        match self.store.insert_analytics(&analytics).await {
            Ok(()) => self.broadcast.broadcast_from_any_thread(HubEvent::Analytics(analytics)),
            Err(e) => warn!(error = %e, "failed to persist skip analytics"),
        }
    }

    async fn persist_buy_analytics(&self, buy: &execution::BuyIntent, trade_id: Option<String>) {
        let analytics = Analytics {
            id: Uuid::new_v4().to_string(),
            address: buy.candidate.row.address.clone(),
            chain: buy.candidate.row.chain.clone(),
            pair_address: buy.candidate.row.pair_address.clone(),
            symbol: buy.candidate.row.symbol.clone(),
            quality_score: buy.candidate.quality_score,
            statistics_score: buy.candidate.statistics_score,
            entry_score: buy.entry_score,
            ai_quality_delta: buy.candidate.ai_quality_delta,
            ai_buy_probability: buy.candidate.ai_buy_probability,
            decision: Decision::Buy,
            reason: None,
            notional_usd: Some(buy.notional_usd),
            cash_before: buy.cash_before,
            cash_after: buy.cash_after,
            raw_payload: serde_json::to_value(&buy.candidate.row).unwrap_or(serde_json::Value::Null),
            evaluated_at: chrono::Utc::now(),
            trade_id,
            outcome: None,
        };
        match self.store.insert_analytics(&analytics).await {
            Ok(()) => self.broadcast.broadcast_from_any_thread(HubEvent::Analytics(analytics)),
            Err(e) => warn!(error = %e, "failed to persist buy analytics"),
        }
    }

    /// Marks a closed position's analytics row with its realized outcome.
    /// Looked up by `trade_id`, carried forward at BUY-analytics-insert
    /// time; attaches at most once (enforced in the store's UPDATE guard).
    pub async fn attach_trade_outcome(
        &self,
        trade_id: &str,
        position: &Position,
        pnl_usd: f64,
        exit_reason: &str,
    ) -> anyhow::Result<()> {
        let holding_minutes = (chrono::Utc::now() - position.opened_at).num_seconds() as f64 / 60.0;
        let pnl_pct = if position.entry > 0.0 {
            100.0 * pnl_usd / (position.entry * position.qty.max(f64::MIN_POSITIVE))
        } else {
            0.0
        };
        let outcome = AnalyticsOutcome {
            trade_id: trade_id.to_string(),
            closed_at: chrono::Utc::now(),
            holding_minutes,
            pnl_pct,
            pnl_usd,
            was_profit: pnl_usd > 0.0,
            exit_reason: exit_reason.to_string(),
        };
        self.store
            .attach_outcome(trade_id, &outcome)
            .await
            .map_err(anyhow::Error::from)
    }

    /// One price-polling tick: fetch live prices for open addresses, run
    /// autosell, recompute the full view from the trade journal, snapshot,
    /// and broadcast.
    pub async fn run_price_tick(&self) -> anyhow::Result<()> {
        let mut open_positions = self.store.open_positions().await?;
        if open_positions.is_empty() {
            return Ok(());
        }

        let addresses: Vec<String> = open_positions.iter().map(|p| p.token_address.clone()).collect();
        let prices = self.aggregator.fetch_prices_by_addresses(&addresses).await;

        for position in open_positions.iter_mut() {
            let Some(&price) = prices.get(&position.token_address) else {
                continue;
            };
            if let Some((action, trade)) = autosell::evaluate(position, price, &self.settings) {
                self.store.insert_trade(&trade).await?;
                self.store.update_position(position).await?;
                self.broadcast.broadcast(HubEvent::Trade(trade.clone()));

                if let Some(pnl) = trade.pnl {
                    let reason = match action {
                        autosell::AutosellAction::Stop => "stop_loss",
                        autosell::AutosellAction::Tp2 => "take_profit_2",
                        autosell::AutosellAction::Tp1 => "take_profit_1",
                    };
                    if position.phase == crate::models::PositionPhase::Closed {
                        if let Err(e) = self.attach_trade_outcome(&trade.id, position, pnl, reason).await {
                            warn!(error = %e, "failed to attach trade outcome");
                        }
                    }
                }
            }
        }

        let view = self.compute_view().await?;
        self.store.insert_portfolio_snapshot(&view.snapshot).await?;
        let open_positions = self.store.open_positions().await?;
        self.broadcast.broadcast(HubEvent::Positions(open_positions));
        self.broadcast.broadcast(HubEvent::Portfolio(view));

        Ok(())
    }

    /// Full, consistent `{portfolio, positions, trades, analytics}` view
    /// computed in one pass over the trade journal, used by both the price
    /// loop and the hub's `init` frame.
    pub async fn compute_view(&self) -> anyhow::Result<PortfolioView> {
        let cfg = &self.settings;
        let trades = self.store.all_trades().await?;
        let open_positions = self.store.open_positions().await?;

        let addresses: Vec<String> = open_positions.iter().map(|p| p.token_address.clone()).collect();
        let prices = self.aggregator.fetch_prices_by_addresses(&addresses).await;

        let cash = cash_from_trades(cfg.starting_cash_usd, &trades);
        let holdings = holdings_value(&open_positions, &prices);
        let unrealized = unrealized_value(&open_positions, &prices);
        let realized = compute_realized(&trades, chrono::Utc::now(), cfg.realized_recent_cutoff_hours);

        let snapshot = PortfolioSnapshot {
            id: Uuid::new_v4().to_string(),
            equity: round2(cash + holdings),
            cash,
            holdings,
            created_at: chrono::Utc::now(),
        };

        let equity_curve = self.store.recent_portfolio_snapshots(200).await?;

        Ok(PortfolioView {
            snapshot,
            realized_total: realized.realized_total,
            realized_recent: realized.realized_recent,
            unrealized,
            equity_curve,
        })
    }

    pub fn broadcast_sink(&self) -> BroadcastSink {
        self.broadcast.clone()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Runs the scanner loop forever on whatever runtime this future is polled
/// on. The caller is responsible for parking that runtime on its own
/// worker thread (thread B) per the mixed scheduling model.
pub async fn scanner_loop(orchestrator: Arc<Orchestrator>) {
    let mut ticker = interval(Duration::from_secs(orchestrator.settings.trend_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match orchestrator.run_scanner_cycle().await {
            Ok(buys) if !buys.is_empty() => info!(count = buys.len(), "scanner cycle produced buys"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "scanner cycle failed, continuing on schedule"),
        }
    }
}

/// Runs the price-polling loop forever (thread A). Also wakes on an
/// out-of-cycle recompute request from the trader or the HTTP reset
/// endpoint.
pub async fn price_loop(orchestrator: Arc<Orchestrator>) {
    let mut ticker = interval(Duration::from_secs(orchestrator.settings.price_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let sink = orchestrator.broadcast_sink();
        tokio::select! {
            _ = ticker.tick() => {}
            _ = sink.recompute_requested() => {}
        }
        if let Err(e) = orchestrator.run_price_tick().await {
            error!(error = %e, "price tick failed, continuing on schedule");
        }
    }
}
