//! Docloader Core Library
//!
//! Core functionality for the docloader indexing tool.
//! Reads JSON documents from local storage and loads them into a search index
//! through bounded, retrying bulk submissions.

pub mod engine;
pub mod index;
pub mod source;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub use source::ReadError;

/// Where a document was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File the document came from
    pub path: PathBuf,
    /// 1-indexed line for line-oriented sources
    pub line: Option<usize>,
}

impl SourceLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            line: None,
        }
    }

    pub fn line(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line: Some(line),
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path.display(), line),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// A document read from a source, ready to be indexed
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Document identifier (None = assigned by the engine)
    pub id: Option<String>,
    /// JSON object payload
    pub payload: Map<String, Value>,
    /// Where the document was read from
    pub location: SourceLocation,
    /// Size of the payload as sent to the engine (compact JSON)
    pub size_bytes: usize,
}

impl Document {
    /// Parse a raw JSON record into a document.
    ///
    /// The record must be a JSON object. When `id_field` is set and the
    /// payload carries that field as a string or an integer, it becomes the
    /// document identifier.
    pub fn from_json(
        raw: &str,
        location: SourceLocation,
        id_field: Option<&str>,
    ) -> Result<Self, ReadError> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(source) => return Err(ReadError::Malformed { location, source }),
        };

        let Value::Object(payload) = value else {
            return Err(ReadError::NotAnObject { location });
        };

        let id = id_field
            .and_then(|field| payload.get(field))
            .and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
                _ => None,
            });

        let size_bytes = match serde_json::to_vec(&payload) {
            Ok(encoded) => encoded.len(),
            Err(_) => raw.trim().len(),
        };

        Ok(Self {
            id,
            payload,
            location,
            size_bytes,
        })
    }

    /// Identifier for display purposes
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unassigned>")
    }
}

/// Why a document was not indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The engine rejected this document (mapping/validation failure)
    EngineRejection {
        reason: String,
        detail: Option<String>,
    },
    /// The whole batch hit transport errors until retries ran out
    TransportExhausted { attempts: u32, last_error: String },
    /// The engine refused the whole request with a permanent error
    EngineError { message: String },
    /// The document alone exceeds the batch byte limit
    DocumentTooLarge { size: usize, limit: usize },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::EngineRejection {
                reason,
                detail: Some(detail),
            } => write!(f, "{}: {}", reason, detail),
            FailureReason::EngineRejection { reason, detail: None } => write!(f, "{}", reason),
            FailureReason::TransportExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "transport exhausted after {} attempts: {}",
                attempts, last_error
            ),
            FailureReason::EngineError { message } => write!(f, "engine error: {}", message),
            FailureReason::DocumentTooLarge { size, limit } => {
                write!(f, "document too large: {} bytes (limit {})", size, limit)
            }
        }
    }
}

/// Per-document outcome of an indexing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexResult {
    Indexed,
    Failed(FailureReason),
    Skipped { reason: String },
}

impl IndexResult {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IndexResult::Indexed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, IndexResult::Failed(_))
    }
}
