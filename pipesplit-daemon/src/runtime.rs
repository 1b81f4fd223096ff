use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;

use pipesplit_core::{RunConfig, SourceSpec};
use pipesplit_sink::FileSink;

use crate::engine::{Engine, RunSummary};
use crate::error::{io_err, EngineError};
use crate::source::{FifoSource, StdinSource};
use crate::supervisor::PidFile;

/// Log line format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Validate `config`, run the copy loop to completion and tear the runtime
/// down.
///
/// Blocking work still in flight when the loop stops (a pipe open waiting
/// for a writer, a pending stdin read) gets `shutdown_grace` before it is
/// abandoned.
pub fn start_blocking(config: RunConfig, log_format: LogFormat) -> Result<RunSummary, EngineError> {
    init_tracing(log_format);
    config.validate()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let grace = config.shutdown_grace;
    let result = runtime.block_on(run(config));
    runtime.shutdown_timeout(grace);
    result
}

/// Run one process lifetime: pid file, output, signals, engine.
pub async fn run(config: RunConfig) -> Result<RunSummary, EngineError> {
    let _pid_file = config
        .daemon
        .pid_file
        .as_deref()
        .map(PidFile::create)
        .transpose()?;

    let sink = FileSink::open(&config.output)?;
    tracing::info!(
        source = %config.source,
        directory = %config.output.directory.display(),
        prefix = %config.output.prefix,
        daemon = config.daemon.enabled,
        continue_read = config.daemon.continue_read,
        "pipesplit started"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
    let signal_handle = tokio::spawn(wait_for_signal(shutdown_tx.clone()));

    let result = match config.source.clone() {
        SourceSpec::Stdin => {
            Engine::new(config, StdinSource::new(), sink)
                .run(shutdown_rx)
                .await
        }
        SourceSpec::Fifo { path, create } => {
            Engine::new(config, FifoSource::new(path, create), sink)
                .run(shutdown_rx)
                .await
        }
    };

    signal_handle.abort();
    drop(shutdown_tx);
    result
}

/// Forward the first termination request to the engine.
async fn wait_for_signal(shutdown: broadcast::Sender<()>) {
    let (mut term, mut hup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(err), _) | (_, Err(err)) => {
            tracing::error!(error = %err, "failed to install signal handlers");
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("received ctrl-c, shutting down"),
            Err(err) => {
                tracing::error!(error = %err, "ctrl-c handler failed");
                return;
            }
        },
        _ = term.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = hup.recv() => tracing::info!("received SIGHUP, shutting down"),
    }
    let _ = shutdown.send(());
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
