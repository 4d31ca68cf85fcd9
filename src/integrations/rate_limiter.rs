//! Client for the remote leaky-bucket admission service.
//!
//! `POST /tokens/consume` with `{tokens, bucket_id, timeout}`: 2xx admits,
//! 429 signals exhaustion. `POST /buckets/init` with
//! `{bucket_id, capacity, refill_rate}` (re)initialises a bucket.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::{Error, Result};

/// Grace added on top of the limiter's own wait before the HTTP call times out.
const REQUEST_GRACE: Duration = Duration::from_secs(5);

/// Admission decision for one consume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStatus {
    Admitted,
    Exhausted,
}

/// Token-rate admission control.
///
/// Transport failures must surface as [`Error::LimiterUnavailable`] so the
/// gateway can tell them apart from an explicit denial.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn consume(&self, tokens: u64, bucket_id: &str, timeout: f64) -> Result<AdmissionStatus>;

    /// Idempotent: re-initialising an existing bucket is not an error.
    async fn init_bucket(&self, bucket_id: &str, capacity: u64, refill_rate: f64) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ConsumeRequest<'a> {
    tokens: u64,
    bucket_id: &'a str,
    timeout: f64,
}

#[derive(Debug, Serialize)]
struct InitBucketRequest<'a> {
    bucket_id: &'a str,
    capacity: u64,
    refill_rate: f64,
}

/// HTTP rate limiter client.
#[derive(Debug, Clone)]
pub struct HttpRateLimiter {
    http: Client,
    base_url: String,
}

impl HttpRateLimiter {
    pub fn new(base_url: &str, timeout_secs: f64) -> Result<Self> {
        let wait = Duration::try_from_secs_f64(timeout_secs.max(0.0))
            .map_err(|e| Error::Config(format!("RATE_LIMIT_TIMEOUT is invalid: {}", e)))?;
        let http = Client::builder()
            .user_agent("graphrag_pipeline/0.1.0")
            .timeout(wait + REQUEST_GRACE)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Self::new(&config.url, config.timeout_secs)
    }
}

#[async_trait]
impl RateLimiter for HttpRateLimiter {
    async fn consume(&self, tokens: u64, bucket_id: &str, timeout: f64) -> Result<AdmissionStatus> {
        let response = self
            .http
            .post(format!("{}/tokens/consume", self.base_url))
            .json(&ConsumeRequest {
                tokens,
                bucket_id,
                timeout,
            })
            .send()
            .await
            .map_err(|e| Error::LimiterUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(AdmissionStatus::Exhausted);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "Rate limiter error {}: {}",
                status, text
            )));
        }

        debug!(tokens, bucket_id, "Tokens admitted");
        Ok(AdmissionStatus::Admitted)
    }

    async fn init_bucket(&self, bucket_id: &str, capacity: u64, refill_rate: f64) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/buckets/init", self.base_url))
            .json(&InitBucketRequest {
                bucket_id,
                capacity,
                refill_rate,
            })
            .send()
            .await
            .map_err(|e| Error::LimiterUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "Bucket init error {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}
