use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::now_ms;

const CACHE_TTL: Duration = Duration::from_secs(300);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct OffsetCache {
    offset_ms: i64,
    synced_at: Option<Instant>,
}

/// Estimates the offset between the local clock and the mirror store's
/// authoritative clock, cached for [`CACHE_TTL`]. Fetch failures fall back
/// to the last known good offset (zero if never synced), so callers are
/// never blocked beyond the request timeout and never see an error.
#[derive(Clone)]
pub struct TimeSync {
    mirror_url: String,
    // Held across the fetch so concurrent refreshes collapse into one
    // in-flight request.
    cache: Arc<Mutex<OffsetCache>>,
}

impl TimeSync {
    pub fn new(mirror_url: impl Into<String>) -> Self {
        Self {
            mirror_url: mirror_url.into(),
            cache: Arc::new(Mutex::new(OffsetCache::default())),
        }
    }

    /// Remote-minus-local clock offset in milliseconds.
    pub async fn offset_ms(&self) -> i64 {
        let mut cache = self.cache.lock().await;

        if let Some(at) = cache.synced_at {
            if at.elapsed() < CACHE_TTL {
                return cache.offset_ms;
            }
        }
        if self.mirror_url.is_empty() {
            return cache.offset_ms;
        }

        let url = format!(
            "{}/.info/serverTimeOffset.json",
            self.mirror_url.trim_end_matches('/')
        );
        match tokio::task::spawn_blocking(move || fetch_offset(&url)).await {
            Ok(Ok(offset_ms)) => {
                cache.offset_ms = offset_ms;
                cache.synced_at = Some(Instant::now());
                info!("clock offset synced: {offset_ms} ms");
            }
            Ok(Err(err)) => {
                warn!(
                    "clock offset fetch failed ({err:#}); keeping {} ms",
                    cache.offset_ms
                );
            }
            Err(err) => warn!("clock offset worker join failed: {err}"),
        }
        cache.offset_ms
    }

    /// Local now shifted by the cached offset. The local clock is read
    /// after any refresh completes, so a slow mirror cannot skew the
    /// result by its response time.
    pub async fn server_time_ms(&self) -> i64 {
        let offset = self.offset_ms().await;
        now_ms() + offset
    }
}

fn fetch_offset(url: &str) -> Result<i64> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(FETCH_TIMEOUT))
        .build()
        .into();

    let body = agent
        .get(url)
        .call()
        .context("offset request failed")?
        .into_body()
        .read_to_string()
        .context("offset body read failed")?;

    body.trim()
        .parse::<i64>()
        .with_context(|| format!("offset body was not an integer: {body:?}"))
}
