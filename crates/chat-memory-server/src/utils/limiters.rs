use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::LimitsConfig;

/// One semaphore per external collaborator so a slow completion server can
/// not starve embedding or store traffic.
#[derive(Clone)]
pub struct Limiters {
    pub embedding: Arc<Semaphore>,
    pub store_search: Arc<Semaphore>,
    pub completion: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(cfg: &LimitsConfig) -> Self {
        Self {
            embedding: Arc::new(Semaphore::new(cfg.embedding_concurrency.max(1))),
            store_search: Arc::new(Semaphore::new(cfg.store_search_concurrency.max(1))),
            completion: Arc::new(Semaphore::new(cfg.completion_concurrency.max(1))),
            acquire_timeout: Duration::from_millis(cfg.acquire_timeout_ms.max(1)),
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
        op: &'static str,
    ) -> Result<(OwnedSemaphorePermit, Duration)> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| anyhow::anyhow!("Limiter acquire timeout for op={}", op))??;

        let waited = start.elapsed();
        debug!(op, waited_ms = waited.as_millis() as u64, "limiter permit acquired");

        Ok((permit, waited))
    }

    pub async fn embedding_permit(&self) -> Result<OwnedSemaphorePermit> {
        Self::acquire_timed(self.embedding.clone(), self.acquire_timeout, "embedding")
            .await
            .map(|(permit, _)| permit)
    }

    pub async fn store_search_permit(&self) -> Result<OwnedSemaphorePermit> {
        Self::acquire_timed(self.store_search.clone(), self.acquire_timeout, "store_search")
            .await
            .map(|(permit, _)| permit)
    }

    pub async fn completion_permit(&self) -> Result<OwnedSemaphorePermit> {
        Self::acquire_timed(self.completion.clone(), self.acquire_timeout, "completion")
            .await
            .map(|(permit, _)| permit)
    }
}

impl Default for Limiters {
    fn default() -> Self {
        Self::new(&LimitsConfig::default())
    }
}
