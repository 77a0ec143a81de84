//! Narrow contract for the lending sentinel's message bot. Command
//! registration and the actual Telegram Bot API calls (`setMyCommands`,
//! `getUpdates`, `sendMessage`) are an external collaborator; only the
//! command contract and the `/snapshot` dispatch logic live here. Grounded
//! on the pack's notifier-trait pattern (`NotifierRegistry`-style
//! registration + per-event async send).

use async_trait::async_trait;

#[async_trait]
pub trait TelegramNotifier: Send + Sync {
    /// Registers the bot's command list once at start. A no-op for
    /// implementations that don't poll for inbound commands.
    async fn register_commands(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn notify(&self, message: &str) -> anyhow::Result<()>;

    /// Long-polls for inbound bot commands received since the last call
    /// (e.g. via `getUpdates` with an internally tracked update offset).
    /// Returns the raw command text for each update (`"/snapshot"`). A
    /// no-op for implementations that don't support polling.
    async fn poll_commands(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Falls back to structured logging when no bot token is configured.
pub struct LoggingNotifier;

#[async_trait]
impl TelegramNotifier for LoggingNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        tracing::info!(target: "telegram", "{message}");
        Ok(())
    }
}
