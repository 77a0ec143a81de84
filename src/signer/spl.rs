//! SPL (Solana) signer contract, dispatched when a route carries a
//! serialized transaction or originates on chain code `SOL`.

use async_trait::async_trait;

use super::{BroadcastResult, ChainSigner};

pub struct SplSigner {
    address: String,
}

impl SplSigner {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl ChainSigner for SplSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send_raw(&self, _route_payload: &str) -> anyhow::Result<BroadcastResult> {
        anyhow::bail!("SPL broadcast is an external collaborator; not implemented in this core")
    }
}
