//! Root CLI parser.
//!
//! Every setting can come from a flag or an environment variable; flags
//! win. A `.env` file in the working directory is loaded before parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use herd_core::{
    DEFAULT_EXECUTABLE, DEFAULT_HOST, DEFAULT_MAX_STALL_NUDGES, DEFAULT_PORT,
    DEFAULT_STALL_TIMEOUT_SECS, DEFAULT_THREADS, EchoMode, Settings, SettingsError,
    parse_model_alias, validate_settings,
};

#[derive(Parser, Debug)]
#[command(name = "herd")]
#[command(about = "Serve llama.cpp through an OpenAI-compatible completions API")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(SettingsArgs),

    /// List the model ids the server would advertise
    Models(SettingsArgs),
}

impl Commands {
    pub const fn settings_args(&self) -> &SettingsArgs {
        match self {
            Self::Serve(args) | Self::Models(args) => args,
        }
    }
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// llama.cpp directory holding the executable and `models/`
    #[arg(long, env = "LLAMA_PATH")]
    pub llama_path: PathBuf,

    /// Generation executable, relative to the llama.cpp directory
    #[arg(long, env = "HERD_EXECUTABLE", default_value = DEFAULT_EXECUTABLE)]
    pub executable: String,

    #[arg(long, env = "THREADS", default_value_t = DEFAULT_THREADS)]
    pub threads: u32,

    /// Model file used for the built-in aliases (gpt-3.5-turbo, text-davinci-003)
    #[arg(long, env = "DEFAULT_MODEL")]
    pub default_model: Option<PathBuf>,

    /// Extra model alias as ID=PATH; repeatable, comma-separated in the environment
    #[arg(long = "model-alias", env = "HERD_MODEL_ALIASES", value_delimiter = ',')]
    pub model_aliases: Vec<String>,

    #[arg(long, env = "HERD_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "HERD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds without output before the process is nudged
    #[arg(long, env = "HERD_STALL_TIMEOUT_SECS", default_value_t = DEFAULT_STALL_TIMEOUT_SECS)]
    pub stall_timeout_secs: u64,

    /// Nudges without output before the generation is cancelled
    #[arg(long, env = "HERD_MAX_STALL_NUDGES", default_value_t = DEFAULT_MAX_STALL_NUDGES)]
    pub max_stall_nudges: u32,

    /// How the prompt echo is detected: strict, tolerant or bypass
    #[arg(long, env = "HERD_ECHO_MODE", default_value_t = EchoMode::default())]
    pub echo_mode: EchoMode,

    /// Forwarded to llama.cpp as --ctx-size
    #[arg(long, env = "HERD_CTX_SIZE")]
    pub ctx_size: Option<u32>,
}

impl SettingsArgs {
    /// Validated settings from the parsed flags.
    pub fn to_settings(&self) -> Result<Settings, SettingsError> {
        let model_aliases = self
            .model_aliases
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_model_alias(raw))
            .collect::<Result<_, _>>()?;

        let settings = Settings {
            llama_path: self.llama_path.clone(),
            executable: self.executable.clone(),
            threads: self.threads,
            default_model: self.default_model.clone(),
            model_aliases,
            host: self.host.clone(),
            port: self.port,
            stall_timeout_secs: self.stall_timeout_secs,
            max_stall_nudges: self.max_stall_nudges,
            echo_mode: self.echo_mode,
            ctx_size: self.ctx_size,
        };
        validate_settings(&settings)?;
        Ok(settings)
    }
}
