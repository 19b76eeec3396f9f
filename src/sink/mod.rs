//! Completion sinks
//!
//! A sink receives every finished transfer exactly once, synchronously from
//! the engine's drain. Delivery is at-most-once: a failed `record` is logged
//! by the engine and the completion is dropped.
//!
//! - [`LogSink`] - logs and discards bodies
//! - [`SqliteSink`] - persists completions into the `pages` table

mod sqlite;

pub use sqlite::SqliteSink;

use crate::error::SinkError;
use crate::types::Completion;
use tracing::info;

/// Receiver of finished transfers
pub trait CompletionSink {
    /// Take ownership of one completion
    ///
    /// Must not block; slow backends hand the work off.
    fn record(&mut self, completion: Completion) -> Result<(), SinkError>;
}

impl<S: CompletionSink + ?Sized> CompletionSink for &mut S {
    fn record(&mut self, completion: Completion) -> Result<(), SinkError> {
        (**self).record(completion)
    }
}

/// Sink that only logs what it receives
#[derive(Debug, Default)]
pub struct LogSink {
    received: u64,
}

impl LogSink {
    /// Create a discarding sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Completions received so far
    pub fn received(&self) -> u64 {
        self.received
    }
}

impl CompletionSink for LogSink {
    fn record(&mut self, completion: Completion) -> Result<(), SinkError> {
        self.received += 1;
        info!(
            transfer_id = %completion.id,
            url = %completion.url,
            bytes = completion.size(),
            "discarding body"
        );
        Ok(())
    }
}
