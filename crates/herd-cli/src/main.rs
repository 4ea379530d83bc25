//! herd entry point.

use clap::Parser;

use herd_cli::{Cli, Commands, bootstrap, handlers, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.command.settings_args().to_settings()?;
    let ctx = bootstrap(settings);

    match cli.command {
        Commands::Serve(_) => handlers::serve(&ctx).await,
        Commands::Models(_) => handlers::list_models(&ctx).await,
    }
}
