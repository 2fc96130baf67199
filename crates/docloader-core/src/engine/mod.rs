//! Search engine client interface
//!
//! The indexing core only talks to the engine through [`SearchEngine`].
//! [`ElasticClient`] speaks the Elasticsearch REST API; [`MemoryEngine`]
//! keeps everything in process.

pub mod elastic;
pub mod memory;

pub use elastic::ElasticClient;
pub use memory::{EngineCall, MemoryEngine};

use crate::Document;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine unreachable or temporarily unavailable; worth retrying
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    /// Engine refused the request; retrying will not help
    #[error("Request rejected ({status}): {message}")]
    Request { status: u16, message: String },
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Transient failures are retried, everything else is permanent
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Connectivity(_))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Status of one document inside a bulk response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkItemStatus {
    Indexed,
    Rejected {
        reason: String,
        detail: Option<String>,
    },
}

/// Engine answer to a bulk submission
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    /// Engine-side processing time in milliseconds
    pub took_ms: u64,
    /// Whether any item failed
    pub errors: bool,
    /// Per-document statuses, in submission order
    pub items: Vec<BulkItemStatus>,
}

/// Operations the indexing core needs from a search engine
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn index_exists(&self, name: &str) -> EngineResult<bool>;

    async fn delete_index(&self, name: &str) -> EngineResult<()>;

    async fn create_index(&self, name: &str) -> EngineResult<()>;

    /// Submit all documents in one exchange
    async fn bulk_submit(&self, index: &str, documents: &[Document]) -> EngineResult<BulkResponse>;

    /// Make indexed documents visible to search
    async fn refresh_index(&self, _name: &str) -> EngineResult<()> {
        Ok(())
    }
}
