//! Command implementations for cascade CLI.
//!
//! Each submodule implements the logic for one command.

pub mod classify;
pub mod feedback;
pub mod stats;
pub mod weights;

use anyhow::{Context, Result};
use cascade_core::Database;
use cascade_router::{build_embedder, build_llm_client, Service};
use std::sync::Arc;

use crate::config::Config;

/// Open the local database, creating it if needed.
pub fn open_database(config: &Config) -> Result<Arc<Database>> {
    let db = Database::open_path(&config.database.path).with_context(|| {
        format!("Failed to open database {}", config.database.path.display())
    })?;
    db.ping().context("Database is not responding")?;
    Ok(Arc::new(db))
}

/// Build a router backed by `db` for memory and weights.
pub fn build_service(config: &Config, db: Arc<Database>) -> Result<Service> {
    let mut builder = Service::builder(config.router.clone())
        .with_memory(db.clone())
        .with_weight_storage(db);

    if let Some(provider) = &config.provider {
        builder = builder.with_llm(build_llm_client(provider).context("Failed to set up LLM provider")?);
        if let Some(embedder) = build_embedder(provider).context("Failed to set up embedding provider")? {
            builder = builder.with_embedder(embedder);
        }
    }

    #[cfg(feature = "local-embeddings")]
    if config.local_embeddings {
        builder = builder.with_embedder(cascade_router::providers::local_embedder());
    }
    #[cfg(not(feature = "local-embeddings"))]
    if config.local_embeddings {
        tracing::warn!("local_embeddings is set but this build lacks the local-embeddings feature");
    }

    builder.build().context("Failed to build router")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_database_creates_file() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("data").join("cascade.db");

        let db = open_database(&config).unwrap();
        assert!(config.database.path.exists());
        assert!(db.load_weights(1).unwrap().is_empty());
    }
}
