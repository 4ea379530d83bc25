//! Settings domain types and validation.
//!
//! Pure data: the CLI fills these in from flags and environment, the
//! runtime and proxy read them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::EchoMode;

/// Executable name inside the llama.cpp directory.
pub const DEFAULT_EXECUTABLE: &str = "main";

/// Threads passed with `--threads`.
pub const DEFAULT_THREADS: u32 = 7;

/// Listen address of the HTTP server.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Seconds without output before the process is nudged.
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 20;

/// Consecutive nudges before a stalled generation is cancelled.
pub const DEFAULT_MAX_STALL_NUDGES: u32 = 3;

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// llama.cpp checkout; holds the executable and `models/`.
    pub llama_path: PathBuf,

    /// Executable name (or absolute path).
    pub executable: String,

    pub threads: u32,

    /// Model used for the built-in aliases.
    pub default_model: Option<PathBuf>,

    /// Extra `id -> path` aliases.
    pub model_aliases: BTreeMap<String, PathBuf>,

    pub host: String,
    pub port: u16,

    pub stall_timeout_secs: u64,
    pub max_stall_nudges: u32,

    pub echo_mode: EchoMode,

    /// Forwarded as `--ctx-size` when set.
    pub ctx_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llama_path: PathBuf::new(),
            executable: DEFAULT_EXECUTABLE.to_string(),
            threads: DEFAULT_THREADS,
            default_model: None,
            model_aliases: BTreeMap::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            stall_timeout_secs: DEFAULT_STALL_TIMEOUT_SECS,
            max_stall_nudges: DEFAULT_MAX_STALL_NUDGES,
            echo_mode: EchoMode::default(),
            ctx_size: None,
        }
    }
}

impl Settings {
    /// Settings rooted at a llama.cpp directory, everything else default.
    pub fn new(llama_path: impl Into<PathBuf>) -> Self {
        Self {
            llama_path: llama_path.into(),
            ..Self::default()
        }
    }

    /// Full path of the generation executable.
    pub fn executable_path(&self) -> PathBuf {
        self.llama_path.join(&self.executable)
    }

    /// Directory scanned for model files.
    pub fn models_dir(&self) -> PathBuf {
        self.llama_path.join("models")
    }

    pub const fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    /// `host:port` for binding the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("LLAMA_PATH is not set; point it at your llama.cpp directory")]
    MissingLlamaPath,

    #[error("Executable name cannot be empty")]
    EmptyExecutable,

    #[error("Thread count must be at least 1, got {0}")]
    InvalidThreads(u32),

    #[error("Stall timeout must be at least 1 second, got {0}")]
    InvalidStallTimeout(u64),

    #[error("Context size must be between 128 and 1,000,000, got {0}")]
    InvalidContextSize(u32),

    #[error("Invalid model alias '{0}', expected ID=PATH")]
    InvalidAlias(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings.llama_path.as_os_str().is_empty() {
        return Err(SettingsError::MissingLlamaPath);
    }

    if settings.executable.trim().is_empty() {
        return Err(SettingsError::EmptyExecutable);
    }

    if settings.threads == 0 {
        return Err(SettingsError::InvalidThreads(0));
    }

    if settings.stall_timeout_secs == 0 {
        return Err(SettingsError::InvalidStallTimeout(0));
    }

    if let Some(ctx_size) = settings
        .ctx_size
        .filter(|size| !(128..=1_000_000).contains(size))
    {
        return Err(SettingsError::InvalidContextSize(ctx_size));
    }

    if let Some(id) = settings
        .model_aliases
        .iter()
        .find_map(|(id, path)| (id.trim().is_empty() || path.as_os_str().is_empty()).then_some(id))
    {
        return Err(SettingsError::InvalidAlias(id.clone()));
    }

    Ok(())
}

/// Parse one `ID=PATH` alias.
pub fn parse_model_alias(raw: &str) -> Result<(String, PathBuf), SettingsError> {
    let (id, path) = raw
        .split_once('=')
        .ok_or_else(|| SettingsError::InvalidAlias(raw.to_string()))?;
    let (id, path) = (id.trim(), path.trim());
    if id.is_empty() || path.is_empty() {
        return Err(SettingsError::InvalidAlias(raw.to_string()));
    }
    Ok((id.to_string(), Path::new(path).to_path_buf()))
}
