//! EVM signer contract. A real implementation wraps a wallet/provider pair;
//! this crate only needs the `ChainSigner` surface.

use async_trait::async_trait;

use super::{BroadcastResult, ChainSigner};

pub struct EvmSigner {
    address: String,
}

impl EvmSigner {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl ChainSigner for EvmSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send_raw(&self, _route_payload: &str) -> anyhow::Result<BroadcastResult> {
        anyhow::bail!("EVM broadcast is an external collaborator; not implemented in this core")
    }
}
