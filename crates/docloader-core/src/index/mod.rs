//! Indexing orchestration
//!
//! Coordinates index preparation, batch assembly and bulk submission.

pub mod batch;
pub mod bulk;
pub mod coordinator;
pub mod manager;
pub mod report;

pub use batch::{Batch, BatchAssembler, BatchError, BatchLimits};
pub use bulk::{BatchOutcome, BulkIndexer, RetryPolicy};
pub use coordinator::{CoordinatorConfig, IndexingCoordinator, IngestMode, Preparation};
pub use manager::{IndexDescriptor, IndexManager};
pub use report::{AbortReason, FailureRecord, Report, RunState, SkipRecord, UnsubmittedRecord};
