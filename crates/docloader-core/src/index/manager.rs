//! Index lifecycle management
//!
//! Existence checks, recreation and deletion of a named index.
//!
//! `recreate` and `delete` check existence and then act. That is not atomic
//! against other clients of the engine: the engine is assumed single-tenant
//! for a run, and concurrent runs against one index need external locking.

use crate::engine::{EngineResult, SearchEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Known state of a named index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub exists: bool,
    /// Set when this manager created the index
    pub created_at: Option<DateTime<Utc>>,
}

/// Owns the lifecycle of indices on one engine
pub struct IndexManager<E> {
    engine: Arc<E>,
    // One destructive action per index name at a time
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<E: SearchEngine> IndexManager<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Whether the index exists. Connectivity errors are returned as is.
    pub async fn exists(&self, name: &str) -> EngineResult<bool> {
        self.engine.index_exists(name).await
    }

    /// Delete the index if present, then create it fresh
    pub async fn recreate(&self, name: &str) -> EngineResult<IndexDescriptor> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        info!("Does index {} exist?", name);
        if self.exists(name).await? {
            info!("Yes, deleting index {}", name);
            self.engine.delete_index(name).await?;
        } else {
            debug!("Index {} does not exist", name);
        }

        self.create(name).await
    }

    /// Create the index only when it is missing; never deletes
    pub async fn ensure(&self, name: &str) -> EngineResult<IndexDescriptor> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        if self.exists(name).await? {
            debug!("Appending to existing index {}", name);
            return Ok(IndexDescriptor {
                name: name.to_string(),
                exists: true,
                created_at: None,
            });
        }

        self.create(name).await
    }

    /// Delete the index. Deleting a missing index is a no-op.
    pub async fn delete(&self, name: &str) -> EngineResult<IndexDescriptor> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        if self.exists(name).await? {
            info!("Deleting index {}", name);
            self.engine.delete_index(name).await?;
        } else {
            debug!("Index {} already absent, nothing to delete", name);
        }

        Ok(IndexDescriptor {
            name: name.to_string(),
            exists: false,
            created_at: None,
        })
    }

    async fn create(&self, name: &str) -> EngineResult<IndexDescriptor> {
        self.engine.create_index(name).await?;
        info!("Created index {}", name);
        Ok(IndexDescriptor {
            name: name.to_string(),
            exists: true,
            created_at: Some(Utc::now()),
        })
    }
}
