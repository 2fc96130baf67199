//! Status command implementation

use docloader_core::engine::ElasticClient;
use docloader_core::index::IndexManager;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(index: &str, url: Option<&str>, timeout: Duration) -> anyhow::Result<()> {
    let engine = Arc::new(ElasticClient::new(url, timeout)?);
    let base_url = engine.base_url().to_string();
    let manager = IndexManager::new(engine);

    let exists = manager.exists(index).await?;
    println!("Engine: {}", base_url);
    println!(
        "Index '{}': {}",
        index,
        if exists { "exists" } else { "does not exist" }
    );
    Ok(())
}
