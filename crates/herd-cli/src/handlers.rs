//! Subcommand handlers.

use anyhow::Context;
use herd_core::ModelRegistryPort;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::HerdContext;

/// Run the HTTP server until Ctrl-C.
pub async fn serve(ctx: &HerdContext) -> anyhow::Result<()> {
    let addr = ctx.settings.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    let result = herd_proxy::serve(listener, ctx.app_state(), cancel).await;
    ctx.supervisor.shutdown().await;
    result
}

/// Print the ids `/v1/models` would return, one per line.
pub async fn list_models(ctx: &HerdContext) -> anyhow::Result<()> {
    let models = ctx
        .registry
        .list_models()
        .await
        .context("Failed to list models")?;

    for model in models {
        println!("{}", model.id);
    }
    Ok(())
}
