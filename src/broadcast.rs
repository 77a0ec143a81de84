//! Thread-safe broadcast sink. `broadcast` runs the send on the hub's loop;
//! `broadcast_from_any_thread` does the same from arbitrary thread/runtime
//! contexts, silently doing nothing if no hub loop has attached yet. Wraps
//! a `tokio::sync::broadcast::channel` of hub events plus a `Notify` for
//! off-cycle recompute requests.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Notify};

use crate::models::{Analytics, PortfolioView, Position, Trade};

/// All payloads are plain JSON primitives by construction (enums already
/// serialize to their string value via `serde(rename_all)`, floats stay
/// floats, timestamps are RFC3339 strings via `chrono`'s serde feature).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    Init {
        status: String,
        portfolio: PortfolioView,
        positions: Vec<Position>,
        trades: Vec<Trade>,
        analytics: Vec<Analytics>,
    },
    Trade(Trade),
    Positions(Vec<Position>),
    Portfolio(PortfolioView),
    Analytics(Analytics),
    Pong {
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

const CHANNEL_CAPACITY: usize = 1000;

/// Wraps a `tokio::sync::broadcast::Sender`. Cloning shares the same
/// underlying channel; every clone can publish from any thread since
/// `Sender::send` is synchronous and non-blocking by design.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<HubEvent>,
    recompute: Arc<Notify>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            recompute: Arc::new(Notify::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }

    /// Intended to be called from the hub's own loop (thread A).
    pub fn broadcast(&self, event: HubEvent) {
        // No subscribers is not an error: the next connecting client gets an
        // `init` replay instead.
        let _ = self.tx.send(event);
    }

    /// Intended to be called from any context, including the scanner's
    /// worker thread (thread B) or a synchronous trader entry point. A
    /// no-op (not a panic) when the hub hasn't attached any subscriber yet.
    pub fn broadcast_from_any_thread(&self, event: HubEvent) {
        let _ = self.tx.send(event);
    }

    /// §4.7 recompute scheduler: callers outside the hub's loop (the HTTP
    /// reset endpoint, the trader) call this instead of computing and
    /// broadcasting a `Portfolio`/`Positions` pair themselves. A silent
    /// no-op when no loop is awaiting `recompute_requested` — the next
    /// scanner tick catches up regardless.
    pub fn request_recompute(&self) {
        self.recompute.notify_one();
    }

    /// Awaited by the price-polling loop (thread A) to learn when an
    /// off-loop mutation (e.g. a live trader buy on thread B) wants an
    /// out-of-cycle portfolio recompute.
    pub async fn recompute_requested(&self) {
        self.recompute.notified().await;
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_broadcast_event() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();
        sink.broadcast(HubEvent::Pong { timestamp: 42 });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HubEvent::Pong { timestamp: 42 }));
    }

    #[test]
    fn broadcast_with_no_subscribers_does_not_panic() {
        let sink = BroadcastSink::new();
        sink.broadcast_from_any_thread(HubEvent::Error {
            message: "x".into(),
        });
    }
}
