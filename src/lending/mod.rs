//! Lending position sentinel: health-factor polling, a status state machine,
//! and rescue-supply logic. §4.9. Shared mutable state held behind a
//! `Mutex`, with `Result`-typed async operations for each tick.

mod pool;

pub use pool::{AssetPosition, HttpLendingPoolClient, LendingAccount, LendingPoolClient, Strategy};

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::telegram::TelegramNotifier;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Optimal,
    Neutral,
    Warning,
    Danger,
    Critical,
}

fn status_for(health_factor: f64, cfg: &Settings) -> Status {
    if health_factor < cfg.lending_emergency_hf {
        Status::Critical
    } else if health_factor < cfg.lending_danger_hf {
        Status::Danger
    } else if health_factor < cfg.lending_warning_hf {
        Status::Warning
    } else if health_factor < cfg.lending_reloop_hf {
        Status::Neutral
    } else {
        Status::Optimal
    }
}

struct SentinelState {
    last_status: Option<Status>,
    last_health_factor: Option<f64>,
    last_equity: Option<f64>,
    last_alert_at: Option<chrono::DateTime<chrono::Utc>>,
    rescue_backoff_until: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for SentinelState {
    fn default() -> Self {
        Self {
            last_status: None,
            last_health_factor: None,
            last_equity: None,
            last_alert_at: None,
            rescue_backoff_until: None,
        }
    }
}

pub struct Sentinel {
    settings: Arc<Settings>,
    pool: Arc<dyn LendingPoolClient>,
    notifier: Arc<dyn TelegramNotifier>,
    state: Mutex<SentinelState>,
}

impl Sentinel {
    pub fn new(
        settings: Arc<Settings>,
        pool: Arc<dyn LendingPoolClient>,
        notifier: Arc<dyn TelegramNotifier>,
    ) -> Self {
        Self {
            settings,
            pool,
            notifier,
            state: Mutex::new(SentinelState::default()),
        }
    }

    pub async fn run(self: Arc<Self>) {
        self.notifier.register_commands().await.ok();
        tokio::spawn(self.clone().run_command_loop());

        let mut ticker = interval(Duration::from_secs(self.settings.lending_poll_interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "lending sentinel tick failed, continuing on schedule");
            }
        }
    }

    /// Polls for inbound bot commands and dispatches `/snapshot`. Runs
    /// concurrently with the health-factor tick loop on its own interval.
    async fn run_command_loop(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.settings.telegram_poll_interval_secs));
        loop {
            ticker.tick().await;
            match self.notifier.poll_commands().await {
                Ok(commands) => {
                    for text in commands {
                        if text.trim().eq_ignore_ascii_case("/snapshot") {
                            if let Err(e) = self.send_snapshot().await {
                                warn!(error = %e, "failed to build lending snapshot");
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "telegram command poll failed"),
            }
        }
    }

    async fn send_snapshot(&self) -> anyhow::Result<()> {
        let account = self.pool.fetch_account().await?;
        self.notifier.notify(&format_snapshot(&account)).await
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let account = self.pool.fetch_account().await?;
        let cfg = &self.settings;
        let status = status_for(account.health_factor, cfg);
        let now = chrono::Utc::now();

        let mut state = self.state.lock().await;

        let status_changed = state.last_status != Some(status);
        let hf_dropped = matches!(status, Status::Danger | Status::Warning | Status::Critical | Status::Neutral)
            && state
                .last_health_factor
                .map(|prev| prev - account.health_factor >= cfg.lending_significant_deviation_hf)
                .unwrap_or(false);
        let equity_dropped = state
            .last_equity
            .map(|prev| prev > 0.0 && (prev - account.net_equity) / prev >= cfg.lending_significant_deviation_equity_pct)
            .unwrap_or(false);
        let heartbeat_due = status != Status::Optimal
            && state
                .last_alert_at
                .map(|last| (now - last).num_seconds() as u64 >= cfg.lending_alert_cooldown_secs)
                .unwrap_or(true);

        if status_changed || hf_dropped || equity_dropped || heartbeat_due {
            self.notifier
                .notify(&format_alert(status, &account))
                .await
                .ok();
            state.last_alert_at = Some(now);
        }

        state.last_status = Some(status);
        state.last_health_factor = Some(account.health_factor);
        state.last_equity = Some(account.net_equity);

        let backing_off = state.rescue_backoff_until.map(|until| now < until).unwrap_or(false);
        drop(state);

        if account.health_factor < cfg.lending_emergency_hf && !backing_off {
            self.rescue(&account).await?;
        }

        Ok(())
    }

    async fn rescue(&self, account: &LendingAccount) -> anyhow::Result<()> {
        let cfg = &self.settings;
        let required = account.required_collateral_for_target_hf(cfg.lending_reloop_hf);
        let inject = required.min(account.wallet_usdc_balance).min(cfg.lending_rescue_max_cap_usd);

        if inject < cfg.lending_rescue_min_usd {
            warn!(inject, min = cfg.lending_rescue_min_usd, "rescue amount below minimum, skipping");
            return Ok(());
        }

        if cfg.mode_live {
            self.pool.approve_and_supply(inject).await?;
            info!(inject_usdc = inject, "live rescue supply executed");
        } else {
            self.notifier
                .notify(&format!("[PAPER] would inject {inject:.2} USDC to restore health factor"))
                .await
                .ok();
        }

        let mut state = self.state.lock().await;
        state.rescue_backoff_until = Some(chrono::Utc::now() + chrono::Duration::seconds(cfg.lending_rescue_backoff_secs as i64));
        Ok(())
    }
}

fn format_alert(status: Status, account: &LendingAccount) -> String {
    format!(
        "lending status={status:?} hf={:.3} strategy={:?} net_equity={:.2} liq_price={:.6}",
        account.health_factor, account.strategy, account.net_equity, account.liquidation_price
    )
}

/// `/snapshot` reply body: full position detail rather than the terse
/// alert line `format_alert` uses for automatic notifications.
fn format_snapshot(account: &LendingAccount) -> String {
    let mut lines = vec![format!(
        "lending snapshot\nstrategy={:?} hf={:.3} net_equity={:.2} liq_price={:.6} net_apy={:.2}%",
        account.strategy,
        account.health_factor,
        account.net_equity,
        account.liquidation_price,
        account.net_apy * 100.0
    )];
    for asset in &account.assets {
        lines.push(format!(
            "  {} supply={:.2} debt={:.2} wallet={:.2} supply_apy={:.2}% debt_apy={:.2}%",
            asset.symbol,
            asset.supply_usd,
            asset.debt_usd,
            asset.wallet_balance,
            asset.supply_apy * 100.0,
            asset.debt_apy * 100.0
        ));
    }
    lines.join("\n")
}

impl std::fmt::Debug for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Optimal => "OPTIMAL",
            Status::Neutral => "NEUTRAL",
            Status::Warning => "WARNING",
            Status::Danger => "DANGER",
            Status::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Settings {
        Settings::from_env().unwrap()
    }

    #[test]
    fn status_escalates_with_falling_health_factor() {
        let cfg = cfg();
        assert_eq!(status_for(3.0, &cfg), Status::Optimal);
        assert_eq!(status_for(1.8, &cfg), Status::Neutral);
        assert_eq!(status_for(1.3, &cfg), Status::Warning);
        assert_eq!(status_for(1.1, &cfg), Status::Danger);
        assert_eq!(status_for(1.0, &cfg), Status::Critical);
    }
}
