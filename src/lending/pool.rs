//! Narrow contract for the lending pool plus an HTTP-backed client fronting
//! it. Account-derived strategy/liquidation math lives here regardless of
//! which concrete client produced the account snapshot.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Long,
    Short,
    Neutral,
}

#[derive(Debug, Clone)]
pub struct AssetPosition {
    pub symbol: String,
    pub supply_usd: f64,
    pub debt_usd: f64,
    pub wallet_balance: f64,
    pub supply_apy: f64,
    pub debt_apy: f64,
}

#[derive(Debug, Clone)]
pub struct LendingAccount {
    pub total_collateral_usd: f64,
    pub total_debt_usd: f64,
    pub health_factor: f64,
    pub wallet_usdc_balance: f64,
    pub assets: Vec<AssetPosition>,
    pub main_asset_price_usd: f64,
    pub strategy: Strategy,
    pub liquidation_price: f64,
    pub net_apy: f64,
    pub net_equity: f64,
}

impl LendingAccount {
    /// USDC needed to push the health factor up to `target_hf`, assuming
    /// the injection is supplied as pure collateral against the existing
    /// debt. Non-negative; zero once already at or above target.
    pub fn required_collateral_for_target_hf(&self, target_hf: f64) -> f64 {
        if self.total_debt_usd <= 0.0 {
            return 0.0;
        }
        let needed_collateral = target_hf * self.total_debt_usd;
        (needed_collateral - self.total_collateral_usd).max(0.0)
    }
}

pub fn derive_strategy(assets: &[AssetPosition]) -> Strategy {
    let net: f64 = assets.iter().map(|a| a.supply_usd - a.debt_usd).sum();
    if net > 0.0 {
        Strategy::Long
    } else if net < 0.0 {
        Strategy::Short
    } else {
        Strategy::Neutral
    }
}

pub fn weighted_net_apy(assets: &[AssetPosition]) -> f64 {
    let gross: f64 = assets.iter().map(|a| a.supply_usd * a.supply_apy - a.debt_usd * a.debt_apy).sum();
    let base: f64 = assets.iter().map(|a| a.supply_usd.max(a.debt_usd)).sum();
    if base <= 0.0 {
        0.0
    } else {
        gross / base
    }
}

#[async_trait]
pub trait LendingPoolClient: Send + Sync {
    async fn fetch_account(&self) -> anyhow::Result<LendingAccount>;
    async fn approve_and_supply(&self, amount_usdc: f64) -> anyhow::Result<()>;
}

#[derive(Deserialize)]
struct AccountWire {
    total_collateral_usd: f64,
    total_debt_usd: f64,
    health_factor: f64,
    wallet_usdc_balance: f64,
    assets: Vec<AssetWire>,
    main_asset_price_usd: f64,
}

#[derive(Deserialize)]
struct AssetWire {
    symbol: String,
    supply_usd: f64,
    debt_usd: f64,
    wallet_balance: f64,
    supply_apy: f64,
    debt_apy: f64,
}

/// Fronts a REST endpoint (`{base_url}/account`, `{base_url}/supply`) that
/// itself wraps the on-chain position; strategy, net APY, and liquidation
/// price are derived here from the raw wire snapshot rather than trusted
/// from the endpoint directly.
pub struct HttpLendingPoolClient {
    client: Client,
    base_url: String,
}

impl HttpLendingPoolClient {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build lending pool http client");
        Self { client, base_url }
    }
}

#[async_trait]
impl LendingPoolClient for HttpLendingPoolClient {
    async fn fetch_account(&self) -> anyhow::Result<LendingAccount> {
        let url = format!("{}/account", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(EngineError::from)?;
        if !resp.status().is_success() {
            anyhow::bail!("lending pool account endpoint returned {}", resp.status());
        }
        let wire: AccountWire = resp.json().await.map_err(EngineError::from)?;

        let assets: Vec<AssetPosition> = wire
            .assets
            .into_iter()
            .map(|a| AssetPosition {
                symbol: a.symbol,
                supply_usd: a.supply_usd,
                debt_usd: a.debt_usd,
                wallet_balance: a.wallet_balance,
                supply_apy: a.supply_apy,
                debt_apy: a.debt_apy,
            })
            .collect();

        let strategy = derive_strategy(&assets);
        let net_apy = weighted_net_apy(&assets);
        let net_equity = wire.total_collateral_usd - wire.total_debt_usd;
        let liquidation_price = if wire.total_debt_usd > 0.0 && wire.total_collateral_usd > 0.0 {
            wire.main_asset_price_usd * wire.total_debt_usd / wire.total_collateral_usd
        } else {
            0.0
        };

        Ok(LendingAccount {
            total_collateral_usd: wire.total_collateral_usd,
            total_debt_usd: wire.total_debt_usd,
            health_factor: wire.health_factor,
            wallet_usdc_balance: wire.wallet_usdc_balance,
            assets,
            main_asset_price_usd: wire.main_asset_price_usd,
            strategy,
            liquidation_price,
            net_apy,
            net_equity,
        })
    }

    async fn approve_and_supply(&self, amount_usdc: f64) -> anyhow::Result<()> {
        let url = format!("{}/supply", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "amount_usdc": amount_usdc }))
            .send()
            .await
            .map_err(EngineError::from)?;
        if !resp.status().is_success() {
            anyhow::bail!("lending pool supply endpoint returned {}", resp.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, supply: f64, debt: f64) -> AssetPosition {
        AssetPosition {
            symbol: symbol.into(),
            supply_usd: supply,
            debt_usd: debt,
            wallet_balance: 0.0,
            supply_apy: 0.04,
            debt_apy: 0.06,
        }
    }

    #[test]
    fn strategy_follows_net_exposure() {
        assert_eq!(derive_strategy(&[asset("ETH", 1000.0, 400.0)]), Strategy::Long);
        assert_eq!(derive_strategy(&[asset("ETH", 400.0, 1000.0)]), Strategy::Short);
    }

    #[test]
    fn required_collateral_is_zero_above_target() {
        let account = LendingAccount {
            total_collateral_usd: 3000.0,
            total_debt_usd: 1000.0,
            health_factor: 3.0,
            wallet_usdc_balance: 500.0,
            assets: vec![],
            main_asset_price_usd: 2000.0,
            strategy: Strategy::Long,
            liquidation_price: 0.0,
            net_apy: 0.0,
            net_equity: 2000.0,
        };
        assert_eq!(account.required_collateral_for_target_hf(2.0), 0.0);
        assert!(account.required_collateral_for_target_hf(4.0) > 0.0);
    }
}
