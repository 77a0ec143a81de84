//! On-chain signer capability abstraction. Both chains expose the same
//! narrow `{address, send_raw}` contract so the trader can dispatch without
//! knowing which signer backs a given route.

pub mod evm;
pub mod spl;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct BroadcastResult {
    pub tx_hash: String,
}

#[async_trait]
pub trait ChainSigner: Send + Sync {
    fn address(&self) -> &str;
    async fn send_raw(&self, route_payload: &str) -> anyhow::Result<BroadcastResult>;
}
