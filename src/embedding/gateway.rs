//! Embedding gateway: chunked, bounded-concurrency batch embedding.
//!
//! ```text
//! texts ──▶ chunks of `chunk_size` ──▶ per chunk: ≤ `workers` concurrent
//!                                      embed_one calls, order preserved
//! ```
//!
//! Chunks run one after another. Any item failure fails its chunk and the
//! whole batch. Every vector is checked against the provider's configured
//! dimension before it is returned.

use std::sync::Arc;

use issue_harness_core::embedding::EmbeddingProvider;
use issue_harness_core::error::Result;
use issue_harness_core::pool::WorkerPool;
use issue_harness_core::Error;

use crate::config::EmbeddingConfig;

#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    workers: usize,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, chunk_size: usize, workers: usize) -> Self {
        Self {
            provider,
            chunk_size: chunk_size.max(1),
            workers: workers.max(1),
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(provider, config.chunk_size, config.workers)
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed one text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let v = self
            .provider
            .embed_one(text)
            .await
            .map_err(Error::Embedding)?;
        self.check(&v)?;
        Ok(v)
    }

    /// Embed `texts`, returning one vector per input in the same order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());

        for (i, chunk) in texts.chunks(self.chunk_size).enumerate() {
            let pool = WorkerPool::new(self.workers.min(chunk.len()));
            let results = pool
                .map_ordered(chunk.iter().cloned(), |text| {
                    let gateway = self.clone();
                    async move { gateway.embed_one(&text).await }
                })
                .await;

            for r in results {
                out.push(r.map_err(|e| {
                    tracing::warn!(chunk = i, error = %e, "embedding chunk failed");
                    e
                })?);
            }
        }

        Ok(out)
    }

    fn check(&self, v: &[f32]) -> Result<()> {
        let expected = self.provider.dims();
        if expected > 0 && v.len() != expected {
            return Err(Error::Embedding(anyhow::anyhow!(
                "provider '{}' returned a {}-dimensional vector, expected {}",
                self.provider.model_name(),
                v.len(),
                expected
            )));
        }
        Ok(())
    }
}
