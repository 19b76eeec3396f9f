//! # hiperfetch
//!
//! Event-driven bulk URL fetcher. URLs written into a named pipe are fetched
//! concurrently over a single curl multi handle driven by a tokio
//! current-thread reactor; every finished transfer is handed to a completion
//! sink (SQLite by default).
//!
//! ## Design Philosophy
//!
//! hiperfetch is designed to be:
//! - **Single-threaded** - One reactor, no locks on the engine state
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Bounded** - Intake batches and optional parallelism caps keep the loop responsive
//! - **At-most-once** - Each completion reaches the sink exactly once, never retried
//!
//! ## Quick Start
//!
//! ```no_run
//! use hiperfetch::{Config, run_with_shutdown};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     // Fetch until SIGINT/SIGTERM
//!     run_with_shutdown(config).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Daemon loop wiring intake, engine and sink
pub mod daemon;
/// Database persistence layer
pub mod db;
/// Multi-transfer engine
pub mod engine;
/// Error types
pub mod error;
/// Job intake from the named pipe
pub mod intake;
/// Readiness reactor
pub mod reactor;
/// Completion sinks
pub mod sink;
/// Per-transfer state
pub mod transfer;
/// Multi-transfer client seam and curl implementation
pub mod transport;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, NameSource, SinkBackend};
pub use db::Database;
pub use engine::{Engine, EngineStats};
pub use error::{DatabaseError, EngineFault, Error, Result, SinkError, SubmitError};
pub use intake::{JobIntake, Submitter};
pub use reactor::{Reactor, ReactorEvent, TokioReactor};
pub use sink::{CompletionSink, LogSink, SqliteSink};
pub use transport::{CurlTransport, Transport};
pub use types::{Completion, Interest, Readiness, Socket, TransferId};

use tokio_util::sync::CancellationToken;

/// Run the daemon until SIGINT or SIGTERM.
///
/// On a signal the unfinished transfers are released and `Ok(())` is
/// returned. A fatal engine fault is returned as an error.
pub async fn run_with_shutdown(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let signals = tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });

    let result = daemon::run(config, shutdown).await;
    signals.abort();
    result
}

async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "shutdown requested");
        }
        (term, int) => {
            if let Err(e) = term.and(int) {
                tracing::warn!(error = %e, "signal registration failed, waiting for ctrl_c");
            }
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl_c");
                std::future::pending::<()>().await;
            }
            tracing::info!(signal = "SIGINT", "shutdown requested");
        }
    }
}
