//! Daemon loop
//!
//! Wires the named-pipe intake, the curl transport, the tokio reactor and the
//! configured completion sink together and drives them on the current task
//! until shutdown is requested or the engine hits a fatal fault.

use crate::config::{Config, SinkBackend};
use crate::db::Database;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::intake::{BatchEnd, FifoSource, JobIntake};
use crate::reactor::{ReactorEvent, TokioReactor};
use crate::sink::{CompletionSink, LogSink, SqliteSink};
use crate::transport::{CurlTransport, Transport};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Run the daemon until `shutdown` is cancelled or a fatal error occurs
///
/// Unfinished transfers are released without being persisted on the way out.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    config.validate()?;

    match config.persistence.backend {
        SinkBackend::Sqlite => {
            let db = Database::new(&config.persistence.database_path).await?;
            info!(path = %config.persistence.database_path.display(), "storing pages in SQLite");
            let mut sink = SqliteSink::spawn(db, &config.persistence);
            let result = serve(&config, &mut sink, shutdown).await;
            let written = sink.close().await;
            info!(rows = written, "page writer finished");
            result
        }
        SinkBackend::Log => {
            let mut sink = LogSink::new();
            serve(&config, &mut sink, shutdown).await
        }
    }
}

/// Drive intake and the curl engine with the given sink
pub async fn serve<S: CompletionSink>(
    config: &Config,
    sink: S,
    shutdown: CancellationToken,
) -> Result<()> {
    let transport = CurlTransport::new(&config.engine, &config.transfer)?;
    info!(version = %CurlTransport::version(), "transport ready");
    serve_with(config, transport, sink, shutdown).await
}

/// Drive intake and an engine over any transport
///
/// Returns `Error::Engine` when the engine hits a fatal fault; unfinished
/// transfers are released either way.
pub async fn serve_with<T, S>(
    config: &Config,
    transport: T,
    sink: S,
    shutdown: CancellationToken,
) -> Result<()>
where
    T: Transport,
    S: CompletionSink,
{
    let source = FifoSource::create(&config.intake.fifo_path)?;
    let mut intake = JobIntake::new(source, &config.intake);

    let mut engine = Engine::new(transport, TokioReactor::new(), sink, config);

    let result = drive(&mut engine, &mut intake, config.intake.poll_interval, shutdown).await;
    if let Err(e) = &result {
        error!(error = %e, "daemon stopping on fatal error");
    }

    let abandoned = engine.abandon_all();
    let stats = engine.stats();
    info!(
        submitted = stats.submitted,
        deferred = stats.deferred,
        rejected = stats.rejected,
        completed = stats.completed,
        failed = stats.failed,
        sink_errors = stats.sink_errors,
        abandoned,
        "engine stopped"
    );

    result
}

async fn drive<T, S>(
    engine: &mut Engine<T, TokioReactor, S>,
    intake: &mut JobIntake<FifoSource>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> Result<()>
where
    T: Transport,
    S: CompletionSink,
{
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut saturated = false;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested");
                return Ok(());
            }
            event = engine.reactor_mut().wait() => match event {
                ReactorEvent::Socket { socket, readiness } => {
                    engine.on_socket_ready(socket, readiness)?;
                }
                ReactorEvent::Timeout => engine.on_timer_fire()?,
            },
            ready = intake.source().readable(), if !saturated => {
                ready?;
                saturated = pump(engine, intake)?;
            }
            _ = poll.tick() => {
                saturated = pump(engine, intake)?;
            }
            // A full batch left input behind; resume once other ready work had its turn.
            () = std::future::ready(()), if saturated => {
                saturated = pump(engine, intake)?;
            }
        }
    }
}

/// Run one intake batch and apply what the submissions asked of the reactor
///
/// Returns true when the batch limit stopped the batch.
fn pump<T, S>(
    engine: &mut Engine<T, TokioReactor, S>,
    intake: &mut JobIntake<FifoSource>,
) -> Result<bool>
where
    T: Transport,
    S: CompletionSink,
{
    let report = intake.run_batch(engine).map_err(Error::Io)?;
    engine.settle()?;

    if report.end == BatchEnd::EndOfInput {
        debug!("intake reported end-of-input");
    }
    Ok(report.end == BatchEnd::Saturated)
}
