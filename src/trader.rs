//! Trade execution: PAPER and LIVE dispatch for a single BUY request. §4.6.
//! A dry-run gate on the configured mode, a `Result`-returning execution
//! path, and structured `info!`/`warn!` logging around each outcome.

use std::sync::Arc;

use tracing::{info, warn};

use crate::autosell;
use crate::broadcast::{BroadcastSink, HubEvent};
use crate::config::Settings;
use crate::meta_aggregator::Route;
use crate::models::{Position, Side, Trade, TradeStatus};
use crate::pipeline::execution::Thresholds;
use crate::signer::ChainSigner;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct BuyRequest {
    pub chain: String,
    pub symbol: String,
    pub token_address: String,
    pub pair_address: String,
    pub external_price: f64,
    pub aggregator_price: f64,
    pub notional_usd: f64,
    pub thresholds: Thresholds,
}

#[derive(Debug)]
pub struct BuyOutcome {
    pub position: Position,
    pub trade: Trade,
    pub autosell_trade: Option<Trade>,
}

pub struct Trader {
    store: Store,
    broadcast: BroadcastSink,
    evm_signer: Option<Arc<dyn ChainSigner>>,
    spl_signer: Option<Arc<dyn ChainSigner>>,
}

impl Trader {
    pub fn new(
        store: Store,
        broadcast: BroadcastSink,
        evm_signer: Option<Arc<dyn ChainSigner>>,
        spl_signer: Option<Arc<dyn ChainSigner>>,
    ) -> Self {
        Self {
            store,
            broadcast,
            evm_signer,
            spl_signer,
        }
    }

    /// Executes a BUY. `route` is required in LIVE mode (the trader aborts
    /// if live trading is requested without one); ignored in PAPER mode.
    pub async fn buy(
        &self,
        request: BuyRequest,
        mode_live: bool,
        route: Option<Route>,
        cfg: &Settings,
    ) -> anyhow::Result<BuyOutcome> {
        if request.chain.trim().is_empty() || request.pair_address.trim().is_empty() {
            anyhow::bail!("buy request requires a non-empty chain and pair");
        }

        if request.external_price > 0.0 && request.aggregator_price > 0.0 {
            let ratio = (request.external_price / request.aggregator_price)
                .max(request.aggregator_price / request.external_price);
            if ratio > cfg.max_deviation_multiplier {
                anyhow::bail!("external/aggregator price deviation {ratio:.3} exceeds cap");
            }
        }

        let price = if request.aggregator_price > 0.0 {
            request.aggregator_price
        } else {
            request.external_price
        };
        if price <= 0.0 {
            anyhow::bail!("no usable price to size the buy");
        }
        let qty = request.notional_usd / price;

        let (status, tx_hash) = if mode_live {
            let route = route.ok_or_else(|| anyhow::anyhow!("live buy requires an attached route"))?;
            let signer = self.pick_signer(&route)?;
            let result = signer.send_raw(&route_payload(&route)).await?;
            info!(tx_hash = %result.tx_hash, symbol = %request.symbol, "live buy broadcast");
            (TradeStatus::Live, Some(result.tx_hash))
        } else {
            (TradeStatus::Paper, None)
        };

        let mut trade = Trade::new(
            Side::Buy,
            request.symbol.clone(),
            request.chain.clone(),
            request.token_address.clone(),
            request.pair_address.clone(),
            price,
            qty,
            0.0,
            status,
        );
        trade.tx_hash = tx_hash;

        let mut position = Position::new(
            request.symbol,
            request.chain,
            request.token_address,
            request.pair_address,
            qty,
            price,
            request.thresholds.tp1,
            request.thresholds.tp2,
            request.thresholds.stop,
        );

        self.store.insert_trade(&trade).await?;
        self.store.insert_position(&position).await?;
        self.broadcast.broadcast_from_any_thread(HubEvent::Trade(trade.clone()));

        let autosell_trade = if !mode_live {
            match autosell::evaluate(&mut position, price, cfg) {
                Some((_action, sell_trade)) => {
                    self.store.insert_trade(&sell_trade).await?;
                    self.store.update_position(&position).await?;
                    self.broadcast.broadcast_from_any_thread(HubEvent::Trade(sell_trade.clone()));
                    Some(sell_trade)
                }
                None => None,
            }
        } else {
            None
        };

        self.broadcast.request_recompute();

        Ok(BuyOutcome {
            position,
            trade,
            autosell_trade,
        })
    }

    fn pick_signer(&self, route: &Route) -> anyhow::Result<Arc<dyn ChainSigner>> {
        let signer = if route.is_spl() {
            self.spl_signer.clone()
        } else {
            self.evm_signer.clone()
        };
        signer.ok_or_else(|| {
            warn!(chain = %route.from_chain_code, "no signer configured for route");
            anyhow::anyhow!("no signer configured for route chain {}", route.from_chain_code)
        })
    }
}

fn route_payload(route: &Route) -> String {
    route
        .serialized_transaction_base64
        .clone()
        .or_else(|| route.to_calldata.clone())
        .unwrap_or_default()
}
