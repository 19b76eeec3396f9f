//! hiperfetch - fetch every URL written into a named pipe
//!
//! ```text
//! hiperfetch [--config <file.json>] [--fifo <path>] [--database <path>]
//! echo https://example.com/ > hiper.fifo
//! ```

use clap::Parser;
use hiperfetch::{Config, run_with_shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hiperfetch")]
#[command(about = "Fetch URLs written into a named pipe and store the results")]
#[command(version)]
struct Cli {
    /// JSON configuration file (all settings optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Named pipe to read URLs from (overrides intake.fifo_path)
    #[arg(long)]
    fifo: Option<PathBuf>,

    /// SQLite database file (overrides persistence.database_path)
    #[arg(long)]
    database: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: Cli) -> hiperfetch::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // CLI flags override the file
    if let Some(fifo) = cli.fifo {
        config.intake.fifo_path = fifo;
    }
    if let Some(database) = cli.database {
        config.persistence.database_path = database;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    exit_code(&run_with_shutdown(config).await)
}

fn exit_code(result: &hiperfetch::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "hiperfetch exited with an error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiperfetch::EngineFault;

    #[test]
    fn engine_fault_exits_non_zero() {
        let fault = hiperfetch::Error::Engine(EngineFault::UnknownSocket { socket: 3 });
        assert_eq!(exit_code(&Err(fault)), ExitCode::FAILURE);
        assert_eq!(exit_code(&Ok(())), ExitCode::SUCCESS);
    }
}
