//! Error taxonomy for the engine.
//!
//! Background loops catch broadly at their top and log with a loop identifier;
//! only startup (`init_db`, config load) may abort the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP timeouts, 5xx, malformed/null payloads. Caller logs-and-skips at the
    /// narrowest scope and continues with partial results.
    #[error("transient external failure: {0}")]
    Transient(String),

    /// Gate rejection, cash shortfall, price deviation, cooldown. Persisted as an
    /// analytics SKIP row with a stable machine code; never surfaced as a crash.
    #[error("logical skip: {0}")]
    LogicalSkip(&'static str),

    /// Missing RPC URL / signer key / API key. The affected operation fails with a
    /// precise message; the process keeps running.
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// Nonpositive qty/price, unknown side, schema mismatch. Caller skips the
    /// trade/row and logs full context.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Only raised during startup (DB unreachable). Surfaced through normal
    /// process exit.
    #[error("fatal startup failure: {0}")]
    Fatal(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transient(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::InvariantViolation(format!("store: {e}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvariantViolation(format!("json: {e}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
