//! Edge Runtime Service (comsrv)

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use comsrv::args::Args;
use comsrv::{logging, EdgeConfig, EdgeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(&args.log_level, args.log_dir.as_deref())?;

    info!("comsrv {} starting", env!("CARGO_PKG_VERSION"));
    let config = EdgeConfig::load(&args.config).inspect_err(|e| error!("Configuration invalid: {:#}", e))?;
    info!(
        "Loaded {}: {} bridges, cycle {}ms",
        args.config.display(),
        config.bridges.len(),
        config.cycle_time_ms
    );

    // Validation mode: validate and exit
    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let runtime = EdgeRuntime::from_config(&config)?;

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                token.cancel();
            },
            Err(e) => error!("Signal handler failed: {}", e),
        }
    });

    runtime.run(shutdown).await;
    Ok(())
}
