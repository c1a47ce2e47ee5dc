mod orchestrator;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use xfer_buffer::AdaptationStrategy;
use xfer_core::{drain, readiness, signal, telemetry, version};
use xfer_engine::TransferConfig;
use xfer_progress::{RichObserver, SimpleObserver, Subject};

#[derive(Parser)]
#[command(name = "xfer", version, about = "Adaptive-transport file transfer over a tunnelled TCP socket")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Buffer-sizing strategy used when no initial size override applies.
    #[arg(long, value_enum, default_value_t = Strategy::Balanced, global = true)]
    strategy: Strategy,

    /// Disable the indicatif-backed renderer in favor of rate-limited log lines.
    #[arg(long, global = true)]
    plain_progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for incoming transfers and write them under a directory.
    Serve {
        #[arg(long, default_value_t = 9292)]
        port: u16,
        #[arg(long)]
        recv_dir: PathBuf,
    },
    /// Dial a listening peer and send one file.
    Send {
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 9292)]
        port: u16,
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Conservative,
    Balanced,
    Aggressive,
}

impl From<Strategy> for AdaptationStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Conservative => AdaptationStrategy::Conservative,
            Strategy::Balanced => AdaptationStrategy::Balanced,
            Strategy::Aggressive => AdaptationStrategy::Aggressive,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging = telemetry::setup_logging();
    info!(build = %version::BuildInfo::new(), "starting xfer");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Arc::new(TransferConfig {
        adaptation_strategy: cli.strategy.into(),
        use_rich_progress: !cli.plain_progress,
        ..TransferConfig::default()
    });

    let subject = Arc::new(Subject::new());
    // `reaper` holds the concrete `RichObserver` (if any) so worker tasks can
    // call `.reap()` on it directly; `subject` only ever sees it through the
    // type-erased `Arc<dyn Observer>` attachment, which has no `reap()`.
    let reaper = if config.use_rich_progress {
        let rich = Arc::new(RichObserver::new());
        subject.attach(rich.clone());
        Some(rich)
    } else {
        subject.attach(Arc::new(SimpleObserver::new()));
        None
    };

    let shutdown = signal::Shutdown::new();
    let ready = readiness::Ready::new();

    match cli.command {
        Command::Serve { port, recv_dir } => {
            tokio::fs::create_dir_all(&recv_dir).await?;
            let (drain_trigger, drain_watcher) = drain::new();
            let block = ready.register_task("server");
            let server = tokio::spawn(orchestrator::run_server(port, recv_dir, config, subject, reaper, drain_watcher));
            drop(block);
            shutdown.wait().await;
            info!("shutdown requested, starting drain");
            drain_trigger.start_drain_and_wait(drain::DrainMode::Graceful).await;
            server.await??;
        }
        Command::Send { host, port, file } => {
            drop(shutdown);
            orchestrator::run_client(&host, port, file, config, subject, reaper).await?;
        }
    }
    Ok(())
}
