/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running market data stream with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use tinvest_stream::{StreamConfig, runner};

mod cli {
    pub mod init;
}

#[derive(Parser, Debug)]
#[command(name = "tinvest-stream", version, about = "Invest OpenAPI market data stream runner")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long = "config", value_name = "PATH", default_value = "tinvest-stream.yaml")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a configuration file interactively
    Init {
        #[arg(long = "output", value_name = "PATH", default_value = "tinvest-stream.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if let Some(Command::Init { output }) = args.command {
        return cli::init::run_init(output);
    }

    let config = load_config(&args.config_path)?;
    let _log_guard = init_tracing(&args.log_level, config.log_dir.as_deref())?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting tinvest-stream"
    );
    info!(subscriptions = config.subscriptions.len(), "configuration loaded");

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let snapshot = runner::run(config, shutdown).await.context("run stream")?;
    info!(events = snapshot.total_events(), "shutdown complete");

    Ok(())
}

fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;

    let Some(dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err))
            .context("initialize tracing subscriber")?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let (file, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "tinvest-stream.log"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout.and(file))
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(Some(guard))
}

fn load_config(path: &Path) -> Result<StreamConfig> {
    StreamConfig::from_file(path).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
