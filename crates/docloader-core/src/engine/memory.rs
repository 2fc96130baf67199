//! In-process engine
//!
//! Stores documents in memory and records every call. Failures can be
//! injected to exercise retry and abort paths without a live engine.

use super::{BulkItemStatus, BulkResponse, EngineError, EngineResult, SearchEngine};
use crate::Document;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// A call received by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Exists(String),
    Delete(String),
    Create(String),
    Bulk { index: String, documents: usize },
    Refresh(String),
}

#[derive(Default)]
struct MemoryState {
    indices: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    calls: Vec<EngineCall>,
    unreachable: bool,
    transient_bulk_failures: usize,
    rejections: HashMap<String, String>,
    next_id: u64,
}

/// Engine backed by in-memory maps
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing, empty index
    pub async fn with_index(self, name: &str) -> Self {
        self.state
            .lock()
            .await
            .indices
            .insert(name.to_string(), BTreeMap::new());
        self
    }

    /// Make every call fail with a connectivity error
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// Fail the next `count` bulk submissions with a connectivity error
    pub async fn fail_next_bulk(&self, count: usize) {
        self.state.lock().await.transient_bulk_failures = count;
    }

    /// Reject the document with this identifier
    pub async fn reject(&self, id: &str, reason: &str) {
        self.state
            .lock()
            .await
            .rejections
            .insert(id.to_string(), reason.to_string());
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of documents stored in an index
    pub async fn document_count(&self, index: &str) -> usize {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    /// Stored payload for a document
    pub async fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }
}

impl MemoryState {
    fn record(&mut self, call: EngineCall) -> EngineResult<()> {
        self.calls.push(call);
        if self.unreachable {
            return Err(EngineError::Connectivity("engine unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn index_exists(&self, name: &str) -> EngineResult<bool> {
        let mut state = self.state.lock().await;
        state.record(EngineCall::Exists(name.to_string()))?;
        Ok(state.indices.contains_key(name))
    }

    async fn delete_index(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        state.record(EngineCall::Delete(name.to_string()))?;
        state.indices.remove(name);
        Ok(())
    }

    async fn create_index(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        state.record(EngineCall::Create(name.to_string()))?;
        if state.indices.contains_key(name) {
            return Err(EngineError::Request {
                status: 400,
                message: format!("resource_already_exists_exception: {}", name),
            });
        }
        state.indices.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn bulk_submit(&self, index: &str, documents: &[Document]) -> EngineResult<BulkResponse> {
        let mut state = self.state.lock().await;
        state.record(EngineCall::Bulk {
            index: index.to_string(),
            documents: documents.len(),
        })?;

        if state.transient_bulk_failures > 0 {
            state.transient_bulk_failures -= 1;
            return Err(EngineError::Connectivity("connection reset".to_string()));
        }

        let mut items = Vec::with_capacity(documents.len());
        for doc in documents {
            let rejection = doc.id.as_ref().and_then(|id| state.rejections.get(id).cloned());
            if let Some(reason) = rejection {
                items.push(BulkItemStatus::Rejected {
                    reason,
                    detail: None,
                });
                continue;
            }

            let id = match &doc.id {
                Some(id) => id.clone(),
                None => {
                    state.next_id += 1;
                    format!("auto-{}", state.next_id)
                }
            };
            // Bulk writes create missing indices, like the real engine
            state
                .indices
                .entry(index.to_string())
                .or_default()
                .insert(id, doc.payload.clone());
            items.push(BulkItemStatus::Indexed);
        }

        let errors = items.iter().any(|item| *item != BulkItemStatus::Indexed);
        Ok(BulkResponse {
            took_ms: 0,
            errors,
            items,
        })
    }

    async fn refresh_index(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        state.record(EngineCall::Refresh(name.to_string()))
    }
}
