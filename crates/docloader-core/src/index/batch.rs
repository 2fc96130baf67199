//! Batch assembly
//!
//! Groups documents into batches bounded by count and byte size, in input
//! order.

use crate::Document;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Document of {size} bytes exceeds the batch limit of {limit} bytes")]
    Oversized {
        position: usize,
        document: Box<Document>,
        size: usize,
        limit: usize,
    },
}

/// Upper bounds for a single batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_documents: usize,
    pub max_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_documents: 500,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Documents grouped for one bulk submission
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Emission order of this batch within the run
    pub sequence: usize,
    pub documents: Vec<Document>,
    /// Source-sequence position of each document
    pub positions: Vec<usize>,
    pub bytes: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Accumulates documents and emits full batches.
///
/// An identifier appears at most once per batch: the engine keeps only the
/// last write for an id within one bulk request.
#[derive(Debug)]
pub struct BatchAssembler {
    limits: BatchLimits,
    current: Batch,
    ids: HashSet<String>,
    emitted: usize,
}

impl BatchAssembler {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits: BatchLimits {
                max_documents: limits.max_documents.max(1),
                max_bytes: limits.max_bytes.max(1),
            },
            current: Batch::default(),
            ids: HashSet::new(),
            emitted: 0,
        }
    }

    /// Add a document.
    ///
    /// Returns the previous batch when the document did not fit in it, or
    /// when it already holds a document with the same id. The document then
    /// starts the next batch.
    pub fn push(&mut self, position: usize, document: Document) -> Result<Option<Batch>, BatchError> {
        if document.size_bytes > self.limits.max_bytes {
            return Err(BatchError::Oversized {
                position,
                size: document.size_bytes,
                limit: self.limits.max_bytes,
                document: Box::new(document),
            });
        }

        let duplicate = document
            .id
            .as_ref()
            .is_some_and(|id| self.ids.contains(id));
        let would_overflow = !self.current.is_empty()
            && (duplicate
                || self.current.len() + 1 > self.limits.max_documents
                || self.current.bytes + document.size_bytes > self.limits.max_bytes);

        let flushed = if would_overflow { self.take() } else { None };

        if let Some(id) = &document.id {
            self.ids.insert(id.clone());
        }
        self.current.bytes += document.size_bytes;
        self.current.documents.push(document);
        self.current.positions.push(position);

        Ok(flushed)
    }

    /// Emit the last partial batch, if any
    pub fn finish(&mut self) -> Option<Batch> {
        self.take()
    }

    /// Documents held but not yet emitted
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    fn take(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }
        self.ids.clear();
        let mut batch = std::mem::take(&mut self.current);
        batch.sequence = self.emitted;
        self.emitted += 1;
        Some(batch)
    }
}
