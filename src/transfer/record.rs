//! Lifecycle state of one URL fetch.

use super::buffer::TransferBuffer;
use crate::types::{Completion, TransferId};
use std::time::Instant;
use tracing::debug;

/// One transfer from submission to completion
///
/// The record is owned by the engine's pool (through the transport handle)
/// until the transport reports it finished. The receive callback appends to
/// the body; the error slot is only written from the transport's result.
#[derive(Debug)]
pub struct TransferRecord {
    id: TransferId,
    url: String,
    body: TransferBuffer,
    error: Option<String>,
    status: Option<u32>,
    submitted_at: Instant,
}

impl TransferRecord {
    /// Create a record for `url`, optionally bounding the body size
    pub fn new(id: TransferId, url: impl Into<String>, max_body_bytes: Option<usize>) -> Self {
        Self {
            id,
            url: url.into(),
            body: TransferBuffer::new(max_body_bytes),
            error: None,
            status: None,
            submitted_at: Instant::now(),
        }
    }

    /// Transfer identifier
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Source URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Body bytes received so far
    pub fn bytes_received(&self) -> usize {
        self.body.len()
    }

    /// Borrow the body received so far
    pub fn body(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// Error recorded for this transfer, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// HTTP status recorded for this transfer, if any
    pub fn status(&self) -> Option<u32> {
        self.status
    }

    /// Append a received chunk
    ///
    /// Returns `false` when the body limit was crossed; the transport must
    /// then abort the transfer.
    pub fn receive(&mut self, chunk: &[u8]) -> bool {
        match self.body.append(chunk) {
            Ok(()) => true,
            Err(e) => {
                debug!(transfer_id = %self.id, url = %self.url, "{}", e);
                self.fail(e.to_string());
                false
            }
        }
    }

    /// Record a transfer failure. The first message wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// Record the HTTP response status
    pub fn set_status(&mut self, status: u32) {
        self.status = Some(status);
    }

    /// Convert into the value handed to the completion sink
    ///
    /// An HTTP status of 400 or above without a transport error is reported
    /// as an error as well.
    pub fn into_completion(self) -> Completion {
        let error = match (self.error, self.status) {
            (Some(e), _) => Some(e),
            (None, Some(code)) if code >= 400 => Some(format!("HTTP status {}", code)),
            (None, _) => None,
        };

        Completion {
            id: self.id,
            url: self.url,
            body: self.body.into_bytes(),
            status: self.status,
            error,
            elapsed: self.submitted_at.elapsed(),
        }
    }
}
