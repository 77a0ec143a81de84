//! Market data client: fetch pairs/prices by address, and the aggregator's
//! trending universe. §4.1.

mod numeric;
mod wire;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::{Settings, TrendSortKey};
use crate::models::NormalizedRow;

pub use numeric::tolerant_f64;
pub use wire::Pair;

/// `GET {base}/latest/dex/tokens/{a1,a2,...}` response shape.
#[derive(Debug, serde::Deserialize)]
struct PairsResponse {
    pairs: Option<Vec<Pair>>,
}

pub struct AggregatorClient {
    client: Client,
    base_url: String,
    chunk_size: usize,
    min_batch_size: usize,
    max_addresses: usize,
}

impl AggregatorClient {
    pub fn new(cfg: &Settings) -> Self {
        let client = Client::builder()
            .timeout(cfg.http_timeout())
            .build()
            .expect("failed to build aggregator http client");
        Self {
            client,
            base_url: cfg.aggregator_base_url.clone(),
            chunk_size: cfg.aggregator_chunk_size.max(1),
            min_batch_size: cfg.aggregator_min_batch_size.max(1),
            max_addresses: cfg.aggregator_max_addresses,
        }
    }

    /// Dedup preserving first-seen order, cap the universe, split into
    /// chunks, and merge. Per-chunk failures log-and-skip; the rest of the
    /// universe proceeds.
    pub async fn fetch_pairs_by_addresses(
        &self,
        addresses: &[String],
    ) -> HashMap<String, Vec<Pair>> {
        let deduped = dedup_preserve_order(addresses, self.max_addresses);
        let mut out: HashMap<String, Vec<Pair>> = HashMap::new();

        for chunk in deduped.chunks(self.chunk_size) {
            match self.fetch_chunk(chunk).await {
                Ok(map) => merge_into(&mut out, map),
                Err(e) => {
                    warn!(chunk_len = chunk.len(), error = %e, "pairs chunk failed, skipping");
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        out
    }

    /// Fetch a single chunk; on HTTP 400/413/414 or a null `pairs` payload for
    /// a multi-address batch, recursively bisect and merge. A null response
    /// for a single address returns empty for that address, not an error.
    fn fetch_chunk<'a>(
        &'a self,
        addresses: &'a [String],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<HashMap<String, Vec<Pair>>>> + Send + 'a>>
    {
        Box::pin(async move {
            if addresses.is_empty() {
                return Ok(HashMap::new());
            }

            let joined = addresses.join(",");
            let url = format!("{}/latest/dex/tokens/{}", self.base_url, joined);
            let resp = self.client.get(&url).send().await?;
            let status = resp.status();

            if is_bisectable_status(status) {
                return self.bisect(addresses).await;
            }
            if !status.is_success() {
                anyhow::bail!("aggregator returned {status}");
            }

            let body: PairsResponse = resp.json().await?;
            match body.pairs {
                Some(pairs) => Ok(group_by_address(addresses, pairs)),
                None if addresses.len() == 1 => {
                    let mut map = HashMap::new();
                    map.insert(addresses[0].clone(), Vec::new());
                    Ok(map)
                }
                None => self.bisect(addresses).await,
            }
        })
    }

    async fn bisect(&self, addresses: &[String]) -> anyhow::Result<HashMap<String, Vec<Pair>>> {
        if addresses.len() <= self.min_batch_size {
            debug!(len = addresses.len(), "bisection floor reached, giving up on batch");
            return Ok(HashMap::new());
        }
        let mid = addresses.len() / 2;
        let (left, right) = addresses.split_at(mid);

        let mut merged = HashMap::new();
        match self.fetch_chunk(left).await {
            Ok(m) => merge_into(&mut merged, m),
            Err(e) => warn!(error = %e, "left bisection half failed"),
        }
        match self.fetch_chunk(right).await {
            Ok(m) => merge_into(&mut merged, m),
            Err(e) => warn!(error = %e, "right bisection half failed"),
        }
        Ok(merged)
    }

    /// Selects the best pair per address by `(liquidity_usd, volume_24h)`
    /// descending, then emits the price only if positive.
    pub async fn fetch_prices_by_addresses(&self, addresses: &[String]) -> HashMap<String, f64> {
        let pairs = self.fetch_pairs_by_addresses(addresses).await;
        let mut out = HashMap::new();
        for (address, list) in pairs {
            if let Some(best) = best_pair(&list) {
                if let Some(price) = best.price_usd {
                    if price > 0.0 {
                        out.insert(address, price);
                    }
                }
            }
        }
        out
    }

    /// Collects candidate addresses from the trending endpoints, fetches
    /// their pairs, normalizes, and truncates.
    pub async fn fetch_trending_candidates(
        &self,
        page_size: usize,
        sort_key: TrendSortKey,
    ) -> Vec<NormalizedRow> {
        let mut addresses = Vec::new();
        for path in [
            "/token-profiles/latest/v1",
            "/token-boosts/latest/v1",
            "/token-boosts/top/v1",
        ] {
            match self.fetch_trending_addresses(path).await {
                Ok(found) => addresses.extend(found),
                Err(e) => warn!(path, error = %e, "trending endpoint failed, skipping"),
            }
        }

        let pairs = self.fetch_pairs_by_addresses(&addresses).await;
        let mut rows: Vec<NormalizedRow> = pairs
            .into_iter()
            .filter_map(|(address, list)| best_pair(&list).map(|p| wire::to_normalized_row(&address, p)))
            .collect();

        rows.sort_by(|a, b| {
            let key = |r: &NormalizedRow| match sort_key {
                TrendSortKey::Volume24h => r.volume.h24.unwrap_or(0.0),
                TrendSortKey::LiquidityUsd => r.liquidity_usd.unwrap_or(0.0),
            };
            key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(page_size);
        rows
    }

    async fn fetch_trending_addresses(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("trending endpoint returned {}", resp.status());
        }
        let body: Vec<wire::TrendingEntry> = resp.json().await.unwrap_or_default();
        Ok(body.into_iter().filter_map(|e| e.token_address).collect())
    }
}

fn is_bisectable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::URI_TOO_LONG
    )
}

fn dedup_preserve_order(addresses: &[String], cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for addr in addresses {
        if seen.insert(addr.clone()) {
            out.push(addr.clone());
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

fn group_by_address(requested: &[String], pairs: Vec<Pair>) -> HashMap<String, Vec<Pair>> {
    let mut out: HashMap<String, Vec<Pair>> = requested.iter().map(|a| (a.clone(), Vec::new())).collect();
    for pair in pairs {
        if let Some(slot) = out.get_mut(&pair.base_token.address) {
            slot.push(pair);
        }
    }
    out
}

fn merge_into(dest: &mut HashMap<String, Vec<Pair>>, src: HashMap<String, Vec<Pair>>) {
    for (k, v) in src {
        dest.entry(k).or_default().extend(v);
    }
}

fn best_pair(pairs: &[Pair]) -> Option<&Pair> {
    pairs.iter().max_by(|a, b| {
        let a_key = (a.liquidity_usd().unwrap_or(0.0), a.volume_24h().unwrap_or(0.0));
        let b_key = (b.liquidity_usd().unwrap_or(0.0), b.volume_24h().unwrap_or(0.0));
        a_key.partial_cmp(&b_key).unwrap_or(std::cmp::Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_first_seen_order_and_caps() {
        let addrs = vec!["a".into(), "b".into(), "a".into(), "c".into()];
        let out = dedup_preserve_order(&addrs, 2);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }
}
