use blobshare::{Application, Config, config::Args, telemetry};
use clap::Parser;

/// Resolves on Ctrl+C, or on SIGTERM where the platform has it.
async fn termination_requested() {
    use tokio::signal;

    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(signal, "Stopping blobshare");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::debug!(?args, "Parsed arguments");

    if config.console.enabled {
        tracing::info!("Operator console on stdin/stdout, logs on stderr");
    } else {
        tracing::info!("Operator console disabled");
    }

    // The console's exit command stops the server as well
    Application::new(config).await?.serve(termination_requested()).await
}
