//! Model registry backed by a static alias table and a models directory.

use async_trait::async_trait;
use herd_core::{ModelEntry, ModelRegistryPort, RegistryError, Settings};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ids OpenAI clients send by default; both map to the default model.
pub const BUILTIN_ALIASES: [&str; 2] = ["gpt-3.5-turbo", "text-davinci-003"];

/// Model file extensions picked up by the directory scan.
const MODEL_EXTENSIONS: [&str; 2] = ["bin", "gguf"];

/// Alias table plus a recursive scan of the models directory.
#[derive(Debug, Clone)]
pub struct StaticModelRegistry {
    models_dir: PathBuf,
    /// Builtins first, then user aliases in name order.
    aliases: Vec<(String, Option<PathBuf>)>,
}

impl StaticModelRegistry {
    pub fn new(models_dir: impl Into<PathBuf>, default_model: Option<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            aliases: BUILTIN_ALIASES
                .iter()
                .map(|id| ((*id).to_string(), default_model.clone()))
                .collect(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        settings.model_aliases.iter().fold(
            Self::new(settings.models_dir(), settings.default_model.clone()),
            |registry, (id, path)| registry.with_alias(id.clone(), path.clone()),
        )
    }

    /// Add or replace an alias.
    #[must_use]
    pub fn with_alias(mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        let path = Some(path.into());
        match self.aliases.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = path,
            None => self.aliases.push((id, path)),
        }
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }
}

#[async_trait]
impl ModelRegistryPort for StaticModelRegistry {
    fn resolve_model_path(&self, model_id: &str) -> Option<PathBuf> {
        if let Some((_, path)) = self.aliases.iter().find(|(id, _)| id == model_id) {
            return path.clone();
        }
        (!model_id.trim().is_empty()).then(|| PathBuf::from(model_id))
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>, RegistryError> {
        let mut files = match scan_model_files(&self.models_dir).await {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(dir = %self.models_dir.display(), "Models directory does not exist");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        files.sort();
        debug!(count = files.len(), "Scanned model files");

        Ok(files
            .into_iter()
            .map(|path| ModelEntry::new(path.to_string_lossy()))
            .chain(self.aliases.iter().map(|(id, _)| ModelEntry::new(id.as_str())))
            .collect())
    }
}

/// Every model file under `root`, recursively.
async fn scan_model_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if is_model_file(&path) {
                found.push(path);
            }
        }
    }

    Ok(found)
}

fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MODEL_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_aliases_resolve_to_default_model() {
        let registry = StaticModelRegistry::new("/llama/models", Some("/llama/models/7B.bin".into()));
        assert_eq!(
            registry.resolve_model_path("gpt-3.5-turbo"),
            Some(PathBuf::from("/llama/models/7B.bin"))
        );
        assert_eq!(
            registry.resolve_model_path("text-davinci-003"),
            Some(PathBuf::from("/llama/models/7B.bin"))
        );
    }

    #[test]
    fn alias_without_default_model_is_unresolvable() {
        let registry = StaticModelRegistry::new("/llama/models", None);
        assert_eq!(registry.resolve_model_path("gpt-3.5-turbo"), None);
        assert_eq!(registry.resolve_model_path(""), None);
    }

    #[test]
    fn unknown_id_is_a_literal_path() {
        let registry = StaticModelRegistry::new("/llama/models", None);
        assert_eq!(
            registry.resolve_model_path("/somewhere/model.gguf"),
            Some(PathBuf::from("/somewhere/model.gguf"))
        );
    }

    #[test]
    fn user_alias_overrides_builtin() {
        let registry = StaticModelRegistry::new("/m", Some("/m/default.bin".into()))
            .with_alias("gpt-3.5-turbo", "/m/other.bin")
            .with_alias("vicuna-7b", "/m/vicuna.bin");
        assert_eq!(
            registry.resolve_model_path("gpt-3.5-turbo"),
            Some(PathBuf::from("/m/other.bin"))
        );
        assert_eq!(
            registry.resolve_model_path("vicuna-7b"),
            Some(PathBuf::from("/m/vicuna.bin"))
        );
    }

    #[tokio::test]
    async fn list_models_scans_recursively_then_aliases() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vicuna")).unwrap();
        std::fs::write(dir.path().join("vicuna/ggml-vic7b.bin"), b"").unwrap();
        std::fs::write(dir.path().join("llama.gguf"), b"").unwrap();
        std::fs::write(dir.path().join("README.md"), b"").unwrap();

        let registry = StaticModelRegistry::new(dir.path(), None);
        let ids: Vec<String> = registry
            .list_models()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(ids.len(), 4);
        assert!(ids[0].ends_with("llama.gguf"));
        assert!(ids[1].ends_with("ggml-vic7b.bin"));
        assert_eq!(&ids[2..], ["gpt-3.5-turbo", "text-davinci-003"]);
    }

    #[tokio::test]
    async fn missing_models_dir_lists_only_aliases() {
        let registry = StaticModelRegistry::new("/definitely/not/here", None);
        let models = registry.list_models().await.unwrap();
        assert_eq!(models.len(), BUILTIN_ALIASES.len());
    }
}
