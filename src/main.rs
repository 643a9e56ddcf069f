use clap::Parser;
use sekai_chart_render::{format_summary, load_config, setup_logging, ChartExecutor, Cli, CliRunner};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting sekai-chart-render v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;
    let cli_runner = CliRunner::new(config)?;

    // Signals stop new items from starting; running items finish and are reported
    let _shutdown_handler = setup_shutdown_handler(cli_runner.executor.clone());

    let report = cli_runner.run(&args.selection()).await?;
    println!("{}", format_summary(&report));

    if !report.is_success() {
        error!("Run finished with failures");
        std::process::exit(1);
    }

    info!("sekai-chart-render stopped");
    Ok(())
}

fn setup_shutdown_handler(executor: ChartExecutor) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => executor.cancel(),
            Err(e) => warn!("Signal handling unavailable: {}", e),
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    Ok(())
}
