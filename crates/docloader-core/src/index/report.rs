//! Run report

use crate::{FailureReason, SourceLocation};
use serde::Serialize;
use std::time::Duration;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    PreparingIndex,
    Ingesting,
    Finalizing,
    Completed,
    Aborted,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, PreparingIndex)
                | (PreparingIndex, Ingesting)
                | (PreparingIndex, Aborted)
                | (Ingesting, Finalizing)
                | (Finalizing, Completed)
                | (Finalizing, Aborted)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::PreparingIndex => "preparing index",
            RunState::Ingesting => "ingesting",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Why a run ended early
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AbortReason {
    /// The index could not be prepared
    PreparationFailed(String),
    /// Engine unreachable beyond the retry budget
    ConnectivityLost(String),
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::PreparationFailed(e) => write!(f, "index preparation failed: {}", e),
            AbortReason::ConnectivityLost(e) => write!(f, "engine connectivity lost: {}", e),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A document that reached the engine (or the assembler) and was not indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Position in the source sequence
    pub position: usize,
    pub id: Option<String>,
    pub location: SourceLocation,
    pub reason: FailureReason,
}

/// A source item that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRecord {
    pub position: usize,
    pub location: SourceLocation,
    pub reason: String,
}

/// A document that was read but never reached the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsubmittedRecord {
    pub position: usize,
    pub id: Option<String>,
    pub location: SourceLocation,
}

/// Outcome of an indexing run, returned even when the run aborts
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub index_name: String,
    pub state: RunState,
    pub aborted: bool,
    pub abort_reason: Option<AbortReason>,
    /// Documents that were submitted or refused before submission
    pub attempted: usize,
    pub indexed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Documents read but never submitted because the run stopped
    pub not_submitted: usize,
    pub batches: usize,
    pub retries: usize,
    /// Sum of engine-reported processing time
    pub engine_took_ms: u64,
    pub duration: Duration,
    /// Ordered by source position
    pub failures: Vec<FailureRecord>,
    /// Ordered by source position
    pub skips: Vec<SkipRecord>,
    /// Ordered by source position
    pub unsubmitted: Vec<UnsubmittedRecord>,
}

impl Report {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            state: RunState::Idle,
            aborted: false,
            abort_reason: None,
            attempted: 0,
            indexed: 0,
            failed: 0,
            skipped: 0,
            not_submitted: 0,
            batches: 0,
            retries: 0,
            engine_took_ms: 0,
            duration: Duration::ZERO,
            failures: Vec::new(),
            skips: Vec::new(),
            unsubmitted: Vec::new(),
        }
    }

    pub fn record_indexed(&mut self) {
        self.attempted += 1;
        self.indexed += 1;
    }

    pub fn record_failure(&mut self, record: FailureRecord) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(record);
    }

    pub fn record_skip(&mut self, record: SkipRecord) {
        self.skipped += 1;
        self.skips.push(record);
    }

    pub fn record_unsubmitted(&mut self, record: UnsubmittedRecord) {
        self.not_submitted += 1;
        self.unsubmitted.push(record);
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Restore source order after out-of-order batch completion
    pub fn sort(&mut self) {
        self.failures.sort_by_key(|f| f.position);
        self.skips.sort_by_key(|s| s.position);
        self.unsubmitted.sort_by_key(|u| u.position);
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Indexing Report for '{}':", self.index_name)?;
        writeln!(f, "  State:          {}", self.state)?;
        if let Some(reason) = &self.abort_reason {
            writeln!(f, "  Abort reason:   {}", reason)?;
        }
        writeln!(f, "  Attempted:      {}", self.attempted)?;
        writeln!(f, "  Indexed:        {}", self.indexed)?;
        writeln!(f, "  Failed:         {}", self.failed)?;
        writeln!(f, "  Skipped:        {}", self.skipped)?;
        if self.not_submitted > 0 {
            writeln!(f, "  Not submitted:  {}", self.not_submitted)?;
        }
        writeln!(f, "  Batches:        {}", self.batches)?;
        writeln!(f, "  Retries:        {}", self.retries)?;
        writeln!(f, "  Engine time:    {}ms", self.engine_took_ms)?;
        writeln!(f, "  Duration:       {:.2?}", self.duration)?;

        for failure in &self.failures {
            writeln!(
                f,
                "  FAILED  #{} {} ({}): {}",
                failure.position,
                failure.id.as_deref().unwrap_or("-"),
                failure.location,
                failure.reason
            )?;
        }
        for skip in &self.skips {
            writeln!(f, "  SKIPPED #{} {}: {}", skip.position, skip.location, skip.reason)?;
        }
        Ok(())
    }
}
