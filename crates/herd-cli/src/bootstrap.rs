//! Composition root: the only place adapters are wired together.

use std::sync::Arc;

use herd_core::{ModelRegistryPort, ProcessLauncher, Settings};
use herd_proxy::AppState;
use herd_runtime::{
    GenerationSupervisor, LlamaLauncher, StaticModelRegistry, SupervisorConfig,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Everything a subcommand needs.
#[derive(Debug, Clone)]
pub struct HerdContext {
    pub settings: Settings,
    pub supervisor: GenerationSupervisor,
    pub registry: Arc<StaticModelRegistry>,
}

impl HerdContext {
    /// Router state sharing this context's supervisor and registry.
    pub fn app_state(&self) -> AppState {
        let registry: Arc<dyn ModelRegistryPort> = Arc::clone(&self.registry) as _;
        AppState::new(Arc::new(self.supervisor.clone()), registry)
    }
}

/// Wire the llama.cpp launcher, supervisor and model registry.
pub fn bootstrap(settings: Settings) -> HerdContext {
    let launcher: Arc<dyn ProcessLauncher> = Arc::new(LlamaLauncher::default());
    let supervisor = GenerationSupervisor::new(SupervisorConfig::from_settings(&settings), launcher);
    let registry = Arc::new(StaticModelRegistry::from_settings(&settings));

    info!(
        executable = %settings.executable_path().display(),
        threads = settings.threads,
        echo_mode = %settings.echo_mode,
        "Generation supervisor ready"
    );
    match &settings.default_model {
        Some(model) => debug!(model = %model.display(), "Default model configured"),
        None => info!("No DEFAULT_MODEL set; built-in aliases will not resolve"),
    }

    HerdContext {
        settings,
        supervisor,
        registry,
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}
