//! Delete command implementation

use docloader_core::engine::ElasticClient;
use docloader_core::index::IndexManager;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(index: &str, url: Option<&str>, timeout: Duration) -> anyhow::Result<()> {
    let engine = Arc::new(ElasticClient::new(url, timeout)?);
    let manager = IndexManager::new(engine);

    manager.delete(index).await?;
    println!("Index '{}' deleted (or was already absent)", index);
    Ok(())
}
