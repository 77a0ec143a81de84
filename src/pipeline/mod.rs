//! Trending pipeline: selection → gates → execution, §4.2. Each stage is a
//! pure function over its inputs; the orchestrator owns fetching the
//! universe, persisting analytics rows, and handing accepted buys to the
//! trader.

pub mod execution;
pub mod gates;
pub mod selection;

use crate::models::{Candidate, TokenIdentity};

/// A rejected or skipped candidate, destined for an analytics SKIP row.
#[derive(Debug, Clone)]
pub struct SkipRecord {
    pub identity: TokenIdentity,
    pub reason: String,
}

impl SkipRecord {
    pub fn new(identity: TokenIdentity, reason: impl Into<String>) -> Self {
        Self {
            identity,
            reason: reason.into(),
        }
    }
}

/// A candidate cleared for the execution stage to size and (maybe) buy.
#[derive(Debug, Clone)]
pub struct EligibleCandidate {
    pub candidate: Candidate,
    pub statistics_score: f64,
}
