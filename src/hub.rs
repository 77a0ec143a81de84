//! WebSocket hub: one `init` frame on connect, then a straight relay of the
//! broadcast channel plus inbound ping/refresh handling.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::warn;

use crate::broadcast::HubEvent;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(orchestrator): State<Arc<Orchestrator>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator))
}

async fn handle_socket(mut socket: WebSocket, orchestrator: Arc<Orchestrator>) {
    let mut rx = orchestrator.broadcast_sink().subscribe();

    if let Some(init) = build_init_frame(&orchestrator).await {
        let msg = serde_json::to_string(&init).unwrap_or_else(|_| "{}".to_string());
        if socket.send(Message::Text(msg)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Ok(event) = event else { break };
                let msg = serde_json::to_string(&event).unwrap_or_else(|e| {
                    warn!(error = %e, "failed to serialize hub event");
                    "{}".to_string()
                });
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_inbound(&text, &orchestrator).await {
                            if socket.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_inbound(text: &str, orchestrator: &Arc<Orchestrator>) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    match json.get("type").and_then(|t| t.as_str())? {
        "ping" => {
            let timestamp = json
                .get("data")
                .and_then(|d| d.get("timestamp"))
                .and_then(|t| t.as_i64())
                .unwrap_or(0);
            let event = HubEvent::Pong { timestamp };
            Some(serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string()))
        }
        "refresh" => {
            let init = build_init_frame(orchestrator).await?;
            Some(serde_json::to_string(&init).unwrap_or_else(|_| "{}".to_string()))
        }
        _ => None,
    }
}

async fn build_init_frame(orchestrator: &Arc<Orchestrator>) -> Option<HubEvent> {
    let portfolio = orchestrator.compute_view().await.ok()?;
    let positions = orchestrator.store().open_positions().await.ok()?;
    let trades = orchestrator.store().all_trades().await.ok()?;
    let analytics = orchestrator.store().recent_analytics(100).await.ok()?;
    Some(HubEvent::Init {
        status: "ready".to_string(),
        portfolio,
        positions,
        trades,
        analytics,
    })
}
