//! Narrow contract for the meta-aggregator quote/route client (e.g. a
//! LiFi-shaped `GET /v1/quote`). The core only needs a route it can
//! introspect to pick a signer; the concrete HTTP client is an external
//! collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A swap/bridge route as returned by the meta-aggregator. `from_chain_code`
/// and `to_transaction_base64` are the two introspection points the trader
/// uses to pick EVM vs SPL dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub from_chain_code: String,
    pub to_chain_code: String,
    pub tool: String,
    pub estimated_out_amount: f64,
    pub slippage_bps: u32,
    /// Present when the route already carries a serialized (e.g. Solana)
    /// transaction rather than calldata the core must build itself.
    pub serialized_transaction_base64: Option<String>,
    pub to_contract_address: Option<String>,
    pub to_calldata: Option<String>,
}

impl Route {
    /// SPL dispatch is chosen when the source chain is Solana or the route
    /// already carries a serialized transaction; otherwise EVM.
    pub fn is_spl(&self) -> bool {
        self.from_chain_code.eq_ignore_ascii_case("SOL") || self.serialized_transaction_base64.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub chain: String,
    pub from_token: String,
    pub to_token: String,
    pub amount_usd: f64,
    pub slippage_bps: u32,
}

#[async_trait]
pub trait MetaAggregatorClient: Send + Sync {
    async fn quote(&self, request: QuoteRequest) -> anyhow::Result<Option<Route>>;
}
