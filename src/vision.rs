//! Vision-AI overlay contract: schema-validated response type, a retry-once
//! relaxed-mode policy, and a per-minute-capped TTL cache. §4.8. The LLM
//! call itself is an external collaborator; only the contract and the rate
//! limiter/cache live here, following the keyed-cache-with-freshness-check
//! pattern used for other rate-limited third-party API clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendState {
    Uptrend,
    Downtrend,
    Range,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    pub direction: Bias,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionAssessment {
    pub tp1_probability: f64,
    pub sl_before_tp_probability: f64,
    pub trend_state: TrendState,
    pub momentum_bias: Bias,
    pub quality_score_delta: f64,
    pub patterns: Vec<PatternMatch>,
}

impl VisionAssessment {
    /// Rejects a response that violates the schema's numeric ranges or
    /// exceeds the 3-pattern cap, even if it deserialized successfully.
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.tp1_probability)
            && (0.0..=1.0).contains(&self.sl_before_tp_probability)
            && (-20.0..=20.0).contains(&self.quality_score_delta)
            && self.patterns.len() <= 3
            && self.patterns.iter().all(|p| (0.0..=1.0).contains(&p.confidence))
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct VisionKey {
    pub symbol_or_chain: String,
    pub pair_address: String,
    pub timeframe: String,
    pub lookback: String,
}

/// Narrow contract for the underlying multimodal call. Implementations
/// enforce the JSON schema on the first attempt, then retry once in a
/// relaxed JSON-object mode before giving up.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn assess(&self, png: &[u8], prompt: &str) -> anyhow::Result<Option<VisionAssessment>>;
}

struct CacheEntry {
    assessment: VisionAssessment,
    cached_at: Instant,
}

/// Wraps a concrete `VisionClient` with a per-minute request cap and a
/// short TTL cache keyed by `(symbol|chain, pair, tf, lookback)`.
pub struct RateLimitedVisionClient {
    inner: Arc<dyn VisionClient>,
    requests_per_minute: u32,
    ttl: Duration,
    cache: Mutex<HashMap<VisionKey, CacheEntry>>,
    window: Mutex<(Instant, u32)>,
}

impl RateLimitedVisionClient {
    pub fn new(inner: Arc<dyn VisionClient>, requests_per_minute: u32, ttl: Duration) -> Self {
        Self {
            inner,
            requests_per_minute,
            ttl,
            cache: Mutex::new(HashMap::new()),
            window: Mutex::new((Instant::now(), 0)),
        }
    }

    pub async fn assess_cached(
        &self,
        key: VisionKey,
        png: &[u8],
        prompt: &str,
    ) -> anyhow::Result<Option<VisionAssessment>> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.cached_at.elapsed() < self.ttl {
                    return Ok(Some(entry.assessment.clone()));
                }
            }
        }

        if !self.take_budget().await {
            return Ok(None);
        }

        let assessment = match self.inner.assess(png, prompt).await? {
            Some(a) if a.is_valid() => a,
            _ => return Ok(None),
        };

        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                assessment: assessment.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(Some(assessment))
    }

    async fn take_budget(&self) -> bool {
        let mut window = self.window.lock().await;
        if window.0.elapsed() >= Duration::from_secs(60) {
            *window = (Instant::now(), 0);
        }
        if window.1 >= self.requests_per_minute {
            return false;
        }
        window.1 += 1;
        true
    }
}

/// Posts the chart PNG and prompt to a configured multimodal endpoint and
/// parses the response directly against the strict schema. Retries once
/// with `relaxed=true` (the endpoint's looser JSON-object mode) if the
/// first response fails to deserialize, then gives up.
pub struct HttpVisionClient {
    client: Client,
    base_url: String,
}

impl HttpVisionClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build vision http client");
        Self { client, base_url }
    }

    async fn request(&self, png: &[u8], prompt: &str, relaxed: bool) -> anyhow::Result<Option<VisionAssessment>> {
        let part = Part::bytes(png.to_vec())
            .file_name("chart.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("prompt", prompt.to_string())
            .text("relaxed", relaxed.to_string())
            .part("image", part);

        let resp = self
            .client
            .post(format!("{}/assess", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(EngineError::from)?;

        if !resp.status().is_success() {
            return Ok(None);
        }
        Ok(resp.json::<VisionAssessment>().await.ok())
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn assess(&self, png: &[u8], prompt: &str) -> anyhow::Result<Option<VisionAssessment>> {
        if let Some(assessment) = self.request(png, prompt, false).await? {
            return Ok(Some(assessment));
        }
        Ok(self.request(png, prompt, true).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(tp1: f64, delta: f64, patterns: usize) -> VisionAssessment {
        VisionAssessment {
            tp1_probability: tp1,
            sl_before_tp_probability: 0.3,
            trend_state: TrendState::Uptrend,
            momentum_bias: Bias::Bullish,
            quality_score_delta: delta,
            patterns: (0..patterns)
                .map(|i| PatternMatch {
                    name: format!("pattern-{i}"),
                    direction: Bias::Bullish,
                    confidence: 0.5,
                })
                .collect(),
        }
    }

    #[test]
    fn rejects_out_of_range_or_overfull_response() {
        assert!(assessment(0.5, 10.0, 2).is_valid());
        assert!(!assessment(1.5, 10.0, 2).is_valid());
        assert!(!assessment(0.5, 25.0, 2).is_valid());
        assert!(!assessment(0.5, 10.0, 4).is_valid());
    }
}
