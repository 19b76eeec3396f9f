//! SQLite completion sink
//!
//! `record` runs inside the engine's synchronous drain, so it only converts
//! the completion into a row and hands it to a writer task over a channel.
//! Insert failures are logged by the writer and not retried.

use super::CompletionSink;
use crate::config::{NameSource, PersistenceConfig};
use crate::db::{Database, NewPage};
use crate::error::SinkError;
use crate::types::Completion;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Sink persisting completions into the `pages` table
pub struct SqliteSink {
    tx: mpsc::UnboundedSender<NewPage>,
    writer: JoinHandle<u64>,
    name_source: NameSource,
    record_failures: bool,
}

impl SqliteSink {
    /// Start the writer task on the current runtime
    pub fn spawn(db: Database, config: &PersistenceConfig) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewPage>();

        let writer = tokio::spawn(async move {
            let mut written = 0u64;
            while let Some(page) = rx.recv().await {
                match db.insert_page(&page).await {
                    Ok(id) => {
                        written += 1;
                        debug!(row_id = id, url = %page.url, "page stored");
                    }
                    Err(e) => error!(url = %page.url, error = %e, "failed to store page"),
                }
            }
            db.close().await;
            written
        });

        Self {
            tx,
            writer,
            name_source: config.name_source,
            record_failures: config.record_failures,
        }
    }

    /// Flush queued rows, close the database and return how many rows were written
    pub async fn close(self) -> u64 {
        drop(self.tx);
        match self.writer.await {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "page writer task ended abnormally");
                0
            }
        }
    }

    fn to_row(&self, completion: Completion) -> NewPage {
        let name = match self.name_source {
            NameSource::Url => completion.url.clone(),
            NameSource::Body => String::from_utf8_lossy(&completion.body).into_owned(),
        };

        NewPage {
            name,
            size: completion.size() as i64,
            url: completion.url,
            status: completion.status.map(i64::from),
            error: completion.error,
            fetched_at: chrono::Utc::now().timestamp(),
        }
    }
}

impl CompletionSink for SqliteSink {
    fn record(&mut self, completion: Completion) -> Result<(), SinkError> {
        if completion.error.is_some() && !self.record_failures {
            debug!(transfer_id = %completion.id, "not persisting failed transfer");
            return Ok(());
        }

        let row = self.to_row(completion);
        self.tx.send(row).map_err(|_| SinkError::Closed)
    }
}
