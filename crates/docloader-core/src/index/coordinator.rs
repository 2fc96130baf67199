//! Indexing run orchestration
//!
//! Prepares the index, streams documents through the batch assembler into
//! the bulk indexer with a bounded number of batches in flight, and folds
//! every outcome into a [`Report`].

use super::batch::{BatchAssembler, BatchError, BatchLimits};
use super::bulk::{BatchOutcome, BulkIndexer, RetryPolicy};
use super::manager::IndexManager;
use super::report::{AbortReason, FailureRecord, Report, RunState, SkipRecord, UnsubmittedRecord};
use crate::engine::SearchEngine;
use crate::source::{DocumentSource, SourceItem};
use crate::{Document, FailureReason, IndexResult};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How documents are submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Bounded batches, several in flight
    #[default]
    Bulk,
    /// One document per submission, one at a time
    Stream,
}

impl std::str::FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bulk" => Ok(IngestMode::Bulk),
            "stream" | "normal" => Ok(IngestMode::Stream),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestMode::Bulk => write!(f, "bulk"),
            IngestMode::Stream => write!(f, "stream"),
        }
    }
}

/// What to do with the target index before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preparation {
    /// Delete the index if present and create it fresh
    #[default]
    Recreate,
    /// Keep existing documents; create the index only if missing
    Append,
}

/// Configuration for an indexing run
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Target index
    pub index_name: String,
    pub mode: IngestMode,
    pub preparation: Preparation,
    /// Batch bounds (bulk mode only)
    pub limits: BatchLimits,
    /// Maximum batches in flight (bulk mode only)
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Refresh the index once all documents are in
    pub refresh: bool,
    /// Documents buffered between the reader thread and the coordinator
    pub read_ahead: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            index_name: "recettes".to_string(),
            mode: IngestMode::Bulk,
            preparation: Preparation::Recreate,
            limits: BatchLimits::default(),
            concurrency: 4,
            retry: RetryPolicy::default(),
            refresh: true,
            read_ahead: 256,
        }
    }
}

/// Drives a full indexing run against one engine
pub struct IndexingCoordinator<E> {
    config: CoordinatorConfig,
    engine: Arc<E>,
    manager: IndexManager<E>,
}

impl<E: SearchEngine> IndexingCoordinator<E> {
    pub fn new(engine: Arc<E>, config: CoordinatorConfig) -> Self {
        Self {
            manager: IndexManager::new(engine.clone()),
            engine,
            config,
        }
    }

    /// Run to completion. A report is returned even when the run aborts.
    pub async fn run<S>(&self, source: S, cancel: CancellationToken) -> Report
    where
        S: DocumentSource + 'static,
    {
        let start = Instant::now();
        let name = self.config.index_name.as_str();
        let mut report = Report::new(name);

        info!("Indexing into {} ({} mode)", name, self.config.mode);
        advance(&mut report, RunState::PreparingIndex);

        // Recreate is destructive, so a run cancelled up front leaves the index alone
        if cancel.is_cancelled() {
            info!("Cancelled before preparing index {}", name);
            report.aborted = true;
            report.abort_reason = Some(AbortReason::Cancelled);
            advance(&mut report, RunState::Aborted);
            report.duration = start.elapsed();
            return report;
        }

        let prepared = match self.config.preparation {
            Preparation::Recreate => self.manager.recreate(name).await,
            Preparation::Append => self.manager.ensure(name).await,
        };
        if let Err(e) = prepared {
            warn!("Could not prepare index {}: {}", name, e);
            report.aborted = true;
            report.abort_reason = Some(AbortReason::PreparationFailed(e.to_string()));
            advance(&mut report, RunState::Aborted);
            report.duration = start.elapsed();
            return report;
        }

        advance(&mut report, RunState::Ingesting);
        let indexer = BulkIndexer::new(self.engine.clone(), name, self.config.retry);
        let abort = self.ingest(source, &indexer, &cancel, &mut report).await;
        report.retries = indexer.retries_used();

        advance(&mut report, RunState::Finalizing);
        report.sort();

        match abort {
            Some(reason) => {
                warn!("Indexing into {} aborted: {}", name, reason);
                report.aborted = true;
                report.abort_reason = Some(reason);
                advance(&mut report, RunState::Aborted);
            }
            None => {
                if self.config.refresh {
                    if let Err(e) = self.engine.refresh_index(name).await {
                        warn!("Failed to refresh index {}: {}", name, e);
                    }
                }
                advance(&mut report, RunState::Completed);
            }
        }

        report.duration = start.elapsed();
        info!(
            "Indexing into {} {}: {} indexed, {} failed, {} skipped in {:.2?}",
            name, report.state, report.indexed, report.failed, report.skipped, report.duration
        );
        report
    }

    fn effective_limits(&self) -> (BatchLimits, usize) {
        match self.config.mode {
            IngestMode::Bulk => (self.config.limits, self.config.concurrency.max(1)),
            IngestMode::Stream => (
                BatchLimits {
                    max_documents: 1,
                    ..self.config.limits
                },
                1,
            ),
        }
    }

    /// Pump documents into batches until the source runs dry or the run
    /// stops. Returns why the run stopped early, if it did.
    async fn ingest<S>(
        &self,
        source: S,
        indexer: &BulkIndexer<E>,
        cancel: &CancellationToken,
        report: &mut Report,
    ) -> Option<AbortReason>
    where
        S: DocumentSource + 'static,
    {
        let (limits, concurrency) = self.effective_limits();

        // File reads block, so the source runs on its own thread
        let (tx, mut rx) = mpsc::channel::<SourceItem>(self.config.read_ahead.max(1));
        let reader = tokio::task::spawn_blocking(move || {
            for item in source.produce() {
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        let mut assembler = BatchAssembler::new(limits);
        let mut in_flight: FuturesUnordered<BoxFuture<'_, BatchOutcome>> = FuturesUnordered::new();
        let mut position = 0usize;
        let mut source_done = false;
        let mut abort: Option<AbortReason> = None;

        loop {
            let stopping = abort.is_some();
            if in_flight.is_empty() && (stopping || source_done) {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !stopping => {
                    info!("Cancellation requested, waiting for {} in-flight batches", in_flight.len());
                    abort = Some(AbortReason::Cancelled);
                }

                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    if outcome.transport_exhausted && abort.is_none() {
                        let message = outcome
                            .results
                            .first()
                            .map(|r| match r {
                                IndexResult::Failed(reason) => reason.to_string(),
                                _ => String::new(),
                            })
                            .unwrap_or_default();
                        abort = Some(AbortReason::ConnectivityLost(message));
                    }
                    record_outcome(report, outcome);
                }

                item = rx.recv(), if !stopping && !source_done && in_flight.len() < concurrency => {
                    match item {
                        None => {
                            source_done = true;
                            if let Some(batch) = assembler.finish() {
                                report.batches += 1;
                                in_flight.push(indexer.submit(batch).boxed());
                            }
                        }
                        Some(item) => {
                            let current = position;
                            position += 1;
                            match item {
                                Ok(document) => match assembler.push(current, document) {
                                    Ok(Some(batch)) => {
                                        report.batches += 1;
                                        in_flight.push(indexer.submit(batch).boxed());
                                    }
                                    Ok(None) => {}
                                    Err(BatchError::Oversized { position: at, document, size, limit }) => {
                                        warn!("Document {} ({}) too large: {} bytes", document.display_id(), document.location, size);
                                        report.record_failure(FailureRecord {
                                            position: at,
                                            id: document.id,
                                            location: document.location,
                                            reason: FailureReason::DocumentTooLarge { size, limit },
                                        });
                                    }
                                },
                                Err(e) => {
                                    warn!("Skipping {}", e);
                                    report.record_skip(SkipRecord {
                                        position: current,
                                        location: e.location().clone(),
                                        reason: e.to_string(),
                                    });
                                }
                            }
                        }
                    }
                }

                else => break,
            }
        }

        // List everything read but not sent so the run can be resumed
        if let Some(batch) = assembler.finish() {
            for (document, at) in batch.documents.into_iter().zip(batch.positions) {
                report.record_unsubmitted(unsubmitted(at, document));
            }
        }
        rx.close();
        while let Some(item) = rx.recv().await {
            let current = position;
            position += 1;
            match item {
                Ok(document) => report.record_unsubmitted(unsubmitted(current, document)),
                Err(e) => report.record_skip(SkipRecord {
                    position: current,
                    location: e.location().clone(),
                    reason: e.to_string(),
                }),
            }
        }
        if report.not_submitted > 0 {
            info!("{} documents read but not submitted", report.not_submitted);
        }

        if let Err(e) = reader.await {
            warn!("Document reader stopped: {}", e);
        }

        abort
    }
}

fn advance(report: &mut Report, next: RunState) {
    debug_assert!(
        report.state.can_advance_to(next),
        "invalid transition {} -> {}",
        report.state,
        next
    );
    debug!("Run state: {} -> {}", report.state, next);
    report.state = next;
}

fn unsubmitted(position: usize, document: Document) -> UnsubmittedRecord {
    UnsubmittedRecord {
        position,
        id: document.id,
        location: document.location,
    }
}

fn record_outcome(report: &mut Report, outcome: BatchOutcome) {
    debug!(
        "Batch {} finished after {} attempt(s)",
        outcome.batch.sequence, outcome.attempts
    );
    report.engine_took_ms += outcome.took_ms;

    let batch = outcome.batch;
    for ((result, document), position) in outcome
        .results
        .into_iter()
        .zip(batch.documents)
        .zip(batch.positions)
    {
        match result {
            IndexResult::Indexed => report.record_indexed(),
            IndexResult::Failed(reason) => report.record_failure(FailureRecord {
                position,
                id: document.id,
                location: document.location,
                reason,
            }),
            IndexResult::Skipped { reason } => report.record_skip(SkipRecord {
                position,
                location: document.location,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BulkResponse, EngineCall, EngineResult, MemoryEngine};
    use crate::source::ReadError;
    use crate::{Document, SourceLocation};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn doc(id: &str) -> SourceItem {
        Document::from_json(
            &format!("{{\"id\": \"{}\", \"title\": \"Recipe {}\"}}", id, id),
            SourceLocation::file(format!("data/{}.json", id)),
            Some("id"),
        )
    }

    fn docs(count: usize) -> Vec<SourceItem> {
        (1..=count).map(|n| doc(&n.to_string())).collect()
    }

    fn config(max_documents: usize, concurrency: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            index_name: "recipes".to_string(),
            limits: BatchLimits {
                max_documents,
                max_bytes: 1024 * 1024,
            },
            concurrency,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                retry_budget: 10,
            },
            ..Default::default()
        }
    }

    fn bulk_sizes(calls: &[EngineCall]) -> Vec<usize> {
        calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Bulk { documents, .. } => Some(*documents),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_five_documents_in_batches_of_two() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 1));

        let report = coordinator.run(docs(5), CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.indexed, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(bulk_sizes(&engine.calls().await), vec![2, 2, 1]);
        assert_eq!(engine.document_count("recipes").await, 5);
    }

    #[tokio::test]
    async fn test_missing_index_is_created_without_delete() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(engine.clone(), config(10, 1));

        coordinator.run(docs(1), CancellationToken::new()).await;

        let calls = engine.calls().await;
        assert_eq!(calls[0], EngineCall::Exists("recipes".into()));
        assert_eq!(calls[1], EngineCall::Create("recipes".into()));
        assert!(!calls.iter().any(|c| matches!(c, EngineCall::Delete(_))));
        let exists_calls = calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Exists(_)))
            .count();
        assert_eq!(exists_calls, 1);
    }

    #[tokio::test]
    async fn test_existing_index_is_replaced() {
        let engine = Arc::new(MemoryEngine::new().with_index("recipes").await);
        engine
            .bulk_submit("recipes", &[doc("old").unwrap()])
            .await
            .unwrap();
        let coordinator = IndexingCoordinator::new(engine.clone(), config(10, 1));

        let report = coordinator.run(docs(2), CancellationToken::new()).await;

        assert!(report.is_completed());
        assert_eq!(engine.document_count("recipes").await, 2);
        assert!(engine.document("recipes", "old").await.is_none());
    }

    #[tokio::test]
    async fn test_append_mode_keeps_existing_documents() {
        let engine = Arc::new(MemoryEngine::new().with_index("recipes").await);
        engine
            .bulk_submit("recipes", &[doc("old").unwrap()])
            .await
            .unwrap();
        let coordinator = IndexingCoordinator::new(
            engine.clone(),
            CoordinatorConfig {
                preparation: Preparation::Append,
                ..config(10, 1)
            },
        );

        let report = coordinator.run(docs(2), CancellationToken::new()).await;

        assert!(report.is_completed());
        assert_eq!(engine.document_count("recipes").await, 3);
    }

    #[tokio::test]
    async fn test_rejected_document_still_completes() {
        let engine = Arc::new(MemoryEngine::new());
        engine.reject("2", "mapping_mismatch").await;
        let coordinator = IndexingCoordinator::new(engine.clone(), config(3, 1));

        let report = coordinator.run(docs(3), CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Completed);
        assert!(!report.aborted);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.attempted, 3);
        let failure = &report.failures[0];
        assert_eq!(failure.id.as_deref(), Some("2"));
        assert_eq!(failure.position, 1);
        assert_eq!(failure.location, SourceLocation::file("data/2.json"));
        assert_eq!(
            failure.reason,
            FailureReason::EngineRejection {
                reason: "mapping_mismatch".to_string(),
                detail: None,
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failures_recover() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_next_bulk(2).await;
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 1));

        let report = coordinator.run(docs(4), CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.indexed, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retries, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_with_partial_report() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_next_bulk(100).await;
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 1));

        let report = coordinator.run(docs(6), CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Aborted);
        assert!(report.aborted);
        assert!(matches!(
            report.abort_reason,
            Some(AbortReason::ConnectivityLost(_))
        ));
        assert_eq!(report.indexed, 0);
        assert_eq!(report.failed, 2);
        assert!(report.failures.iter().all(|f| matches!(
            f.reason,
            FailureReason::TransportExhausted { .. }
        )));
        // Only the first batch was ever submitted
        assert_eq!(report.batches, 1);
    }

    #[tokio::test]
    async fn test_abort_lists_documents_never_submitted() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail_next_bulk(100).await;
        let coordinator = IndexingCoordinator::new(
            engine.clone(),
            CoordinatorConfig {
                retry: RetryPolicy {
                    max_attempts: 3,
                    initial_backoff: Duration::from_millis(20),
                    max_backoff: Duration::from_millis(40),
                    retry_budget: 10,
                },
                ..config(2, 1)
            },
        );

        let report = coordinator.run(docs(10), CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.not_submitted, 8);
        assert_eq!(report.attempted + report.skipped + report.not_submitted, 10);
        let positions: Vec<usize> = report.unsubmitted.iter().map(|u| u.position).collect();
        assert_eq!(positions, (2..10).collect::<Vec<_>>());
        assert_eq!(report.unsubmitted[0].id.as_deref(), Some("3"));
        assert_eq!(report.unsubmitted[0].location, SourceLocation::file("data/3.json"));
    }

    #[tokio::test]
    async fn test_repeated_id_is_not_lost_in_one_request() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(engine.clone(), config(10, 1));

        let report = coordinator
            .run(vec![doc("a"), doc("a"), doc("b")], CancellationToken::new())
            .await;

        assert!(report.is_completed());
        assert_eq!(report.indexed, 3);
        assert_eq!(bulk_sizes(&engine.calls().await), vec![1, 2]);
        assert_eq!(engine.document_count("recipes").await, 2);
    }

    #[tokio::test]
    async fn test_unreachable_engine_aborts_during_preparation() {
        let engine = Arc::new(MemoryEngine::new());
        engine.set_unreachable(true).await;
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 1));

        let report = coordinator.run(docs(3), CancellationToken::new()).await;

        assert_eq!(report.state, RunState::Aborted);
        assert!(matches!(
            report.abort_reason,
            Some(AbortReason::PreparationFailed(_))
        ));
        assert_eq!(report.attempted, 0);
        assert_eq!(engine.calls().await, vec![EngineCall::Exists("recipes".into())]);
    }

    #[tokio::test]
    async fn test_read_errors_are_skipped() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(engine.clone(), config(10, 1));
        let items = vec![
            doc("1"),
            Err(ReadError::NotAnObject {
                location: SourceLocation::file("data/list.json"),
            }),
            doc("3"),
        ];

        let report = coordinator.run(items, CancellationToken::new()).await;

        assert!(report.is_completed());
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.skips[0].position, 1);
        assert_eq!(report.skips[0].location, SourceLocation::file("data/list.json"));
    }

    #[tokio::test]
    async fn test_oversized_document_fails_alone() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(
            engine.clone(),
            CoordinatorConfig {
                limits: BatchLimits {
                    max_documents: 10,
                    max_bytes: 64,
                },
                ..config(10, 1)
            },
        );
        let big = Document::from_json(
            &format!("{{\"id\": \"big\", \"body\": \"{}\"}}", "x".repeat(200)),
            SourceLocation::file("data/big.json"),
            Some("id"),
        );

        let report = coordinator
            .run(vec![doc("1"), big, doc("3")], CancellationToken::new())
            .await;

        assert!(report.is_completed());
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.failures[0].reason,
            FailureReason::DocumentTooLarge { limit: 64, .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_mode_submits_one_document_at_a_time() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(
            engine.clone(),
            CoordinatorConfig {
                mode: IngestMode::Stream,
                ..config(100, 8)
            },
        );

        let report = coordinator.run(docs(3), CancellationToken::new()).await;

        assert!(report.is_completed());
        assert_eq!(bulk_sizes(&engine.calls().await), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_stream_mode_honours_byte_limit() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(
            engine.clone(),
            CoordinatorConfig {
                mode: IngestMode::Stream,
                limits: BatchLimits {
                    max_documents: 500,
                    max_bytes: 64 * 1024 * 1024,
                },
                ..config(100, 1)
            },
        );
        let large = Document::from_json(
            &format!("{{\"id\": \"large\", \"body\": \"{}\"}}", "x".repeat(6 * 1024 * 1024)),
            SourceLocation::file("data/large.json"),
            Some("id"),
        );

        let report = coordinator.run(vec![large, doc("2")], CancellationToken::new()).await;

        assert!(report.is_completed());
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(bulk_sizes(&engine.calls().await), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_refresh_runs_on_completion() {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = IndexingCoordinator::new(engine.clone(), config(10, 1));

        coordinator.run(docs(2), CancellationToken::new()).await;

        let calls = engine.calls().await;
        assert_eq!(calls.last(), Some(&EngineCall::Refresh("recipes".into())));
    }

    #[tokio::test]
    async fn test_cancel_before_start_submits_nothing() {
        let engine = Arc::new(MemoryEngine::new().with_index("recipes").await);
        engine
            .bulk_submit("recipes", &[doc("old").unwrap()])
            .await
            .unwrap();
        let before = engine.calls().await.len();
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator.run(docs(4), cancel).await;

        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.abort_reason, Some(AbortReason::Cancelled));
        assert_eq!(report.attempted, 0);
        // The existing index is left untouched
        assert_eq!(engine.calls().await.len(), before);
        assert_eq!(engine.document_count("recipes").await, 1);
    }

    /// Engine that counts concurrent bulk calls and can cancel the run
    #[derive(Default)]
    struct SlowEngine {
        active: AtomicUsize,
        peak: AtomicUsize,
        bulks: AtomicUsize,
        cancel_on_first_bulk: Option<CancellationToken>,
    }

    #[async_trait]
    impl SearchEngine for SlowEngine {
        async fn index_exists(&self, _name: &str) -> EngineResult<bool> {
            Ok(false)
        }
        async fn delete_index(&self, _name: &str) -> EngineResult<()> {
            Ok(())
        }
        async fn create_index(&self, _name: &str) -> EngineResult<()> {
            Ok(())
        }
        async fn bulk_submit(&self, _index: &str, documents: &[Document]) -> EngineResult<BulkResponse> {
            if self.bulks.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(cancel) = &self.cancel_on_first_bulk {
                    cancel.cancel();
                }
            }
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(BulkResponse {
                took_ms: 1,
                errors: false,
                items: vec![crate::engine::BulkItemStatus::Indexed; documents.len()],
            })
        }
    }

    #[tokio::test]
    async fn test_in_flight_batches_are_bounded() {
        let engine = Arc::new(SlowEngine::default());
        let coordinator = IndexingCoordinator::new(engine.clone(), config(1, 2));

        let report = coordinator.run(docs(8), CancellationToken::new()).await;

        assert!(report.is_completed());
        assert_eq!(report.indexed, 8);
        assert_eq!(report.engine_took_ms, 8);
        assert!(engine.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_batch_finish() {
        let cancel = CancellationToken::new();
        let engine = Arc::new(SlowEngine {
            cancel_on_first_bulk: Some(cancel.clone()),
            ..Default::default()
        });
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 1));

        let report = coordinator.run(docs(6), cancel).await;

        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.abort_reason, Some(AbortReason::Cancelled));
        assert_eq!(report.indexed, 2);
        assert_eq!(report.not_submitted, 4);
        assert_eq!(engine.bulks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_keep_source_order_across_batches() {
        let engine = Arc::new(MemoryEngine::new());
        for id in ["7", "2", "5"] {
            engine.reject(id, "mapping_mismatch").await;
        }
        let coordinator = IndexingCoordinator::new(engine.clone(), config(2, 4));

        let report = coordinator.run(docs(8), CancellationToken::new()).await;

        assert!(report.is_completed());
        let positions: Vec<usize> = report.failures.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![1, 4, 6]);
        assert_eq!(report.indexed + report.failed, 8);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("bulk".parse::<IngestMode>().unwrap(), IngestMode::Bulk);
        assert_eq!("Stream".parse::<IngestMode>().unwrap(), IngestMode::Stream);
        assert!("batch".parse::<IngestMode>().is_err());
    }
}
