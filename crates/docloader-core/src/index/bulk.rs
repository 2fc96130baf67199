//! Bulk submission with retries
//!
//! One network exchange per batch. Transport failures retry the whole batch
//! with exponential backoff; per-document rejections are recorded as is.

use super::batch::Batch;
use crate::engine::{BulkItemStatus, BulkResponse, EngineError, SearchEngine};
use crate::{FailureReason, IndexResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff and attempt limits for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per batch, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Retries shared by every batch of a run
    pub retry_budget: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            retry_budget: 32,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1 = first retry)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Result of submitting one batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch: Batch,
    /// One result per document, in batch order
    pub results: Vec<IndexResult>,
    pub attempts: u32,
    pub took_ms: u64,
    /// Transport failures outlasted the retries
    pub transport_exhausted: bool,
}

/// Submits batches to the engine
pub struct BulkIndexer<E> {
    engine: Arc<E>,
    index_name: String,
    policy: RetryPolicy,
    retries_left: AtomicUsize,
    retries_used: AtomicUsize,
}

impl<E: SearchEngine> BulkIndexer<E> {
    pub fn new(engine: Arc<E>, index_name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            index_name: index_name.into(),
            retries_left: AtomicUsize::new(policy.retry_budget),
            retries_used: AtomicUsize::new(0),
            policy,
        }
    }

    /// Retries spent across all batches so far
    pub fn retries_used(&self) -> usize {
        self.retries_used.load(Ordering::Relaxed)
    }

    fn take_retry(&self) -> bool {
        let taken = self
            .retries_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok();
        if taken {
            self.retries_used.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    /// Submit a batch and return one result per document
    pub async fn submit(&self, batch: Batch) -> BatchOutcome {
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(
                "Submitting batch {} ({} documents, attempt {})",
                batch.sequence,
                batch.len(),
                attempts
            );

            let error = match self
                .engine
                .bulk_submit(&self.index_name, &batch.documents)
                .await
            {
                Ok(response) => {
                    let took_ms = response.took_ms;
                    let results = map_response(&batch, response);
                    return BatchOutcome {
                        batch,
                        results,
                        attempts,
                        took_ms,
                        transport_exhausted: false,
                    };
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!("Batch {} refused by engine: {}", batch.sequence, error);
                let reason = FailureReason::EngineError {
                    message: error.to_string(),
                };
                return fail_all(batch, reason, attempts, false);
            }

            if attempts >= self.policy.max_attempts || !self.take_retry() {
                warn!(
                    "Batch {} failed after {} attempts: {}",
                    batch.sequence, attempts, error
                );
                let reason = FailureReason::TransportExhausted {
                    attempts,
                    last_error: error.to_string(),
                };
                return fail_all(batch, reason, attempts, true);
            }

            let delay = self.policy.backoff(attempts);
            warn!(
                "Batch {} transport failure ({}), retrying in {:?}",
                batch.sequence, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn fail_all(batch: Batch, reason: FailureReason, attempts: u32, transport_exhausted: bool) -> BatchOutcome {
    let results = vec![IndexResult::Failed(reason); batch.len()];
    BatchOutcome {
        batch,
        results,
        attempts,
        took_ms: 0,
        transport_exhausted,
    }
}

/// Pair engine statuses with the batch documents.
///
/// Without one status per document the outcome falls back to whole-batch
/// pass/fail on the response error flag.
fn map_response(batch: &Batch, response: BulkResponse) -> Vec<IndexResult> {
    if response.items.len() != batch.len() {
        warn!(
            "Batch {}: engine returned {} statuses for {} documents",
            batch.sequence,
            response.items.len(),
            batch.len()
        );
        let result = if response.errors {
            IndexResult::Failed(FailureReason::EngineError {
                message: EngineError::InvalidResponse(
                    "bulk response lacks per-document detail".to_string(),
                )
                .to_string(),
            })
        } else {
            IndexResult::Indexed
        };
        return vec![result; batch.len()];
    }

    response
        .items
        .into_iter()
        .zip(&batch.documents)
        .map(|(status, doc)| match status {
            BulkItemStatus::Indexed => IndexResult::Indexed,
            BulkItemStatus::Rejected { reason, detail } => {
                warn!("Document {} ({}) rejected: {}", doc.display_id(), doc.location, reason);
                IndexResult::Failed(FailureReason::EngineRejection { reason, detail })
            }
        })
        .collect()
}
