//! Rate-limited gateway in front of the inference backend.
//!
//! Every call: estimate tokens, ask the limiter for admission, then call the
//! backend. Exhaustion fails the call with a retryable error. An unreachable
//! limiter is logged and the call proceeds without admission.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{AdmissionStatus, ChatMessage, InferenceBackend, RateLimiter};
use crate::config::RateLimitConfig;
use crate::metrics;
use crate::{Error, Result};

/// Per-message overhead added to the text estimate.
const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Rough token count: four characters per token, at least one.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64 / 4).max(1)
}

pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|m| {
            estimate_tokens(m.content.as_deref().unwrap_or(""))
                + estimate_tokens(&m.role)
                + MESSAGE_OVERHEAD_TOKENS
        })
        .sum()
}

pub struct RateLimitedGateway {
    backend: Arc<dyn InferenceBackend>,
    limiter: Arc<dyn RateLimiter>,
    bucket_id: String,
    capacity: u64,
    refill_rate: f64,
    timeout_secs: f64,
}

impl RateLimitedGateway {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        limiter: Arc<dyn RateLimiter>,
        config: &RateLimitConfig,
    ) -> Self {
        Self {
            backend,
            limiter,
            bucket_id: config.bucket_id.clone(),
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    /// Initialise the shared bucket. Failures are logged, never returned.
    pub async fn init_bucket(&self) {
        match self
            .limiter
            .init_bucket(&self.bucket_id, self.capacity, self.refill_rate)
            .await
        {
            Ok(()) => info!(
                bucket_id = %self.bucket_id,
                capacity = self.capacity,
                refill_rate = self.refill_rate,
                "Rate limit bucket initialized"
            ),
            Err(err) => warn!(bucket_id = %self.bucket_id, error = %err, "Failed to initialize rate limit bucket"),
        }
    }

    async fn admit(&self, tokens: u64, kind: &str) -> Result<()> {
        match self
            .limiter
            .consume(tokens, &self.bucket_id, self.timeout_secs)
            .await
        {
            Ok(AdmissionStatus::Admitted) => Ok(()),
            Ok(AdmissionStatus::Exhausted) => Err(Error::RateLimited(self.bucket_id.clone())),
            Err(Error::LimiterUnavailable(reason)) => {
                metrics::record_limiter_bypass();
                warn!(
                    kind,
                    %reason,
                    "Rate limiter unavailable, proceeding without rate limiting"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Admission-controlled inference call. `kind` labels logs and metrics.
    pub async fn call(&self, kind: &str, messages: Vec<ChatMessage>) -> Result<String> {
        let tokens = estimate_messages_tokens(&messages);
        debug!(kind, tokens, "Inference request");

        self.admit(tokens, kind).await?;

        let started = Instant::now();
        let result = self.backend.complete(messages, None, None).await;
        metrics::record_inference(kind, started.elapsed(), result.is_ok());

        match &result {
            Ok(_) => debug!(kind, "Inference response received"),
            Err(err) => warn!(kind, error = %err, "Inference request failed"),
        }
        result
    }

    /// Convenience for the system + user message shape every pipeline call uses.
    pub async fn ask(&self, kind: &str, system: &str, user: String) -> Result<String> {
        self.call(kind, vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct EchoBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for EchoBackend {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _temperature: Option<f32>,
            _max_tokens: Option<u32>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(messages
                .last()
                .and_then(|m| m.content.clone())
                .unwrap_or_default())
        }
    }

    struct ScriptedLimiter {
        outcome: fn() -> Result<AdmissionStatus>,
        consumed: Mutex<Vec<u64>>,
        init_fails: bool,
    }

    #[async_trait]
    impl RateLimiter for ScriptedLimiter {
        async fn consume(&self, tokens: u64, _bucket_id: &str, _timeout: f64) -> Result<AdmissionStatus> {
            self.consumed.lock().unwrap().push(tokens);
            (self.outcome)()
        }

        async fn init_bucket(&self, _bucket_id: &str, _capacity: u64, _refill_rate: f64) -> Result<()> {
            if self.init_fails {
                Err(Error::LimiterUnavailable("down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            url: "http://limiter".into(),
            bucket_id: "graphrag".into(),
            capacity: 1000,
            refill_rate: 100.0,
            timeout_secs: 1.0,
        }
    }

    fn gateway(outcome: fn() -> Result<AdmissionStatus>) -> (Arc<EchoBackend>, Arc<ScriptedLimiter>, RateLimitedGateway) {
        let backend = Arc::new(EchoBackend {
            calls: AtomicUsize::new(0),
        });
        let limiter = Arc::new(ScriptedLimiter {
            outcome,
            consumed: Mutex::new(Vec::new()),
            init_fails: true,
        });
        let gateway = RateLimitedGateway::new(backend.clone(), limiter.clone(), &config());
        (backend, limiter, gateway)
    }

    #[test]
    fn estimate_tokens_has_floor_of_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn estimate_messages_adds_role_and_overhead() {
        let messages = vec![
            ChatMessage::system("x".repeat(40)),
            ChatMessage::user("y".repeat(8)),
        ];
        // system: 10 + 1 + 4, user: 2 + 1 + 4
        assert_eq!(estimate_messages_tokens(&messages), 22);
    }

    #[tokio::test]
    async fn admitted_call_reaches_backend_with_estimate() {
        let (backend, limiter, gateway) = gateway(|| Ok(AdmissionStatus::Admitted));

        let reply = gateway.ask("extract", "sys", "hello".into()).await.unwrap();

        assert_eq!(reply, "hello");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.consumed.lock().unwrap().as_slice(), &[12]);
    }

    #[tokio::test]
    async fn exhausted_bucket_fails_with_retryable_error() {
        let (backend, _limiter, gateway) = gateway(|| Ok(AdmissionStatus::Exhausted));

        let err = gateway.ask("extract", "sys", "hello".into()).await.unwrap_err();

        assert!(matches!(err, Error::RateLimited(ref bucket) if bucket == "graphrag"));
        assert!(err.is_retryable());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_limiter_is_bypassed() {
        let (backend, _limiter, gateway) =
            gateway(|| Err(Error::LimiterUnavailable("connection refused".into())));

        let reply = gateway.ask("extract", "sys", "still works".into()).await.unwrap();

        assert_eq!(reply, "still works");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn limiter_http_error_propagates() {
        let (backend, _limiter, gateway) = gateway(|| Err(Error::Http("500".into())));

        let err = gateway.ask("extract", "sys", "x".into()).await.unwrap_err();

        assert!(matches!(err, Error::Http(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn init_bucket_failure_does_not_panic() {
        let (_backend, _limiter, gateway) = gateway(|| Ok(AdmissionStatus::Admitted));
        gateway.init_bucket().await;
        assert_eq!(gateway.bucket_id(), "graphrag");
    }
}
