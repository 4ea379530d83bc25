//! Model registry port: model ids to model files.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One listable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub id: String,
}

impl ModelEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to scan model directory: {0}")]
    Scan(#[from] std::io::Error),
}

/// Resolves and lists models.
#[async_trait]
pub trait ModelRegistryPort: Send + Sync + fmt::Debug {
    /// Resolve a request's model id to a file path.
    ///
    /// Aliases map through the table; any other non-empty id is taken as a
    /// literal path. `None` means nothing usable is configured.
    fn resolve_model_path(&self, model_id: &str) -> Option<PathBuf>;

    /// Model files on disk followed by the alias table.
    async fn list_models(&self) -> Result<Vec<ModelEntry>, RegistryError>;
}
