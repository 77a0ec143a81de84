//! Chart interval heuristic and the short-lived screenshot cache. §4.8. The
//! interval-selection rule and the cache contract (an `Arc<Mutex<HashMap<K,
//! V>>>` keyed by pair/interval with a timestamp for freshness) apply to any
//! `ChartCapture`; `HttpChartCapture` is the concrete REST-backed client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    OneHour,
    FourHour,
    OneDay,
    OneWeek,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMin => "1m",
            Interval::ThreeMin => "3m",
            Interval::FiveMin => "5m",
            Interval::FifteenMin => "15m",
            Interval::OneHour => "1h",
            Interval::FourHour => "4h",
            Interval::OneDay => "1D",
            Interval::OneWeek => "1W",
        }
    }
}

/// Fixed heuristic table from token age: ≤90min→1m; ≤6h→3m; ≤24h→5m;
/// ≤3d→15m; ≤10d→1h; ≤30d→4h; ≤180d→1D; else 1W.
pub fn interval_for_age(token_age_hours: f64) -> Interval {
    if token_age_hours <= 1.5 {
        Interval::OneMin
    } else if token_age_hours <= 6.0 {
        Interval::ThreeMin
    } else if token_age_hours <= 24.0 {
        Interval::FiveMin
    } else if token_age_hours <= 24.0 * 3.0 {
        Interval::FifteenMin
    } else if token_age_hours <= 24.0 * 10.0 {
        Interval::OneHour
    } else if token_age_hours <= 24.0 * 30.0 {
        Interval::FourHour
    } else if token_age_hours <= 24.0 * 180.0 {
        Interval::OneDay
    } else {
        Interval::OneWeek
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ChartKey {
    pub chain: String,
    pub pair_address: String,
    pub interval: &'static str,
    pub lookback: String,
}

#[async_trait]
pub trait ChartCapture: Send + Sync {
    async fn capture(&self, chain: &str, pair_address: &str, interval: Interval) -> anyhow::Result<Vec<u8>>;
}

struct CacheEntry {
    png: Vec<u8>,
    captured_at: Instant,
}

/// Wraps a concrete `ChartCapture` with a short-lived cache so repeated
/// requests for the same pair within the TTL don't re-drive the browser.
pub struct CachingChartCapture {
    inner: Arc<dyn ChartCapture>,
    ttl: Duration,
    cache: Mutex<HashMap<ChartKey, CacheEntry>>,
}

impl CachingChartCapture {
    pub fn new(inner: Arc<dyn ChartCapture>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn capture_cached(
        &self,
        chain: &str,
        pair_address: &str,
        token_age_hours: f64,
    ) -> anyhow::Result<Vec<u8>> {
        let interval = interval_for_age(token_age_hours);
        let key = ChartKey {
            chain: chain.to_string(),
            pair_address: pair_address.to_string(),
            interval: interval.as_str(),
            lookback: interval.as_str().to_string(),
        };

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.captured_at.elapsed() < self.ttl {
                    return Ok(entry.png.clone());
                }
            }
        }

        let png = self.inner.capture(chain, pair_address, interval).await?;
        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                png: png.clone(),
                captured_at: Instant::now(),
            },
        );
        Ok(png)
    }
}

/// GETs a rendered PNG from a configured chart-rendering endpoint
/// (`{base_url}/chart/{chain}/{pair_address}?interval=...`). The endpoint
/// owns the actual rendering (headless browser or otherwise); this client
/// only knows the wire contract.
pub struct HttpChartCapture {
    client: Client,
    base_url: String,
}

impl HttpChartCapture {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build chart capture http client");
        Self { client, base_url }
    }
}

#[async_trait]
impl ChartCapture for HttpChartCapture {
    async fn capture(&self, chain: &str, pair_address: &str, interval: Interval) -> anyhow::Result<Vec<u8>> {
        let url = format!(
            "{}/chart/{chain}/{pair_address}?interval={}",
            self.base_url,
            interval.as_str(),
        );
        let resp = self.client.get(&url).send().await.map_err(EngineError::from)?;
        if !resp.status().is_success() {
            anyhow::bail!("chart capture endpoint returned {}", resp.status());
        }
        let bytes = resp.bytes().await.map_err(EngineError::from)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_heuristic_follows_age_table() {
        assert_eq!(interval_for_age(0.5), Interval::OneMin);
        assert_eq!(interval_for_age(4.0), Interval::ThreeMin);
        assert_eq!(interval_for_age(12.0), Interval::FiveMin);
        assert_eq!(interval_for_age(48.0), Interval::FifteenMin);
        assert_eq!(interval_for_age(24.0 * 8.0), Interval::OneHour);
        assert_eq!(interval_for_age(24.0 * 20.0), Interval::FourHour);
        assert_eq!(interval_for_age(24.0 * 90.0), Interval::OneDay);
        assert_eq!(interval_for_age(24.0 * 365.0), Interval::OneWeek);
    }
}
