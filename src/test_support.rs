//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{GraphConfig, PipelineConfig, RateLimitConfig};
use crate::graphrag::partition::LouvainPartitioner;
use crate::graphrag::pipeline::PipelineController;
use crate::integrations::{
    AdmissionStatus, ChatMessage, InferenceBackend, RateLimitedGateway, RateLimiter,
};
use crate::prompts::PromptSet;
use crate::store::Store;
use crate::Result;

/// Replies with the last user message and counts calls.
#[derive(Default)]
pub struct EchoBackend {
    pub calls: AtomicUsize,
}

impl EchoBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
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

/// Admits everything.
pub struct OpenLimiter;

#[async_trait]
impl RateLimiter for OpenLimiter {
    async fn consume(&self, _tokens: u64, _bucket_id: &str, _timeout: f64) -> Result<AdmissionStatus> {
        Ok(AdmissionStatus::Admitted)
    }

    async fn init_bucket(&self, _bucket_id: &str, _capacity: u64, _refill_rate: f64) -> Result<()> {
        Ok(())
    }
}

pub fn rate_limit_config() -> RateLimitConfig {
    RateLimitConfig {
        url: "http://limiter".into(),
        bucket_id: "unit-test".into(),
        capacity: 1000,
        refill_rate: 100.0,
        timeout_secs: 1.0,
    }
}

pub fn controller(store: Arc<dyn Store>, backend: Arc<dyn InferenceBackend>) -> Arc<PipelineController> {
    let gateway = RateLimitedGateway::new(backend, Arc::new(OpenLimiter), &rate_limit_config());
    Arc::new(PipelineController::new(
        store,
        Arc::new(gateway),
        Arc::new(LouvainPartitioner::new()),
        &PipelineConfig {
            chunk_size: 50,
            chunk_overlap: 10,
        },
        GraphConfig::default(),
        PromptSet::default(),
    ))
}
