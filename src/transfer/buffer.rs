//! Response body accumulation for one in-flight transfer.

use thiserror::Error;

/// The body outgrew the configured limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response body exceeds limit of {limit} bytes")]
pub struct BodyLimitExceeded {
    /// Configured limit in bytes
    pub limit: usize,
}

/// Growable byte accumulator, append-only
///
/// Without a limit the buffer grows as needed. With a limit, the chunk that
/// crosses it is kept up to the limit and the append reports
/// [`BodyLimitExceeded`]; every later append is refused.
#[derive(Debug, Default)]
pub struct TransferBuffer {
    data: Vec<u8>,
    limit: Option<usize>,
    overflowed: bool,
}

impl TransferBuffer {
    /// Create an empty buffer with an optional size limit
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            data: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    /// Append a received chunk
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), BodyLimitExceeded> {
        let Some(limit) = self.limit else {
            self.data.extend_from_slice(chunk);
            return Ok(());
        };

        if self.overflowed {
            return Err(BodyLimitExceeded { limit });
        }

        let room = limit.saturating_sub(self.data.len());
        if chunk.len() <= room {
            self.data.extend_from_slice(chunk);
            Ok(())
        } else {
            self.data.extend_from_slice(&chunk[..room]);
            self.overflowed = true;
            Err(BodyLimitExceeded { limit })
        }
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing was received
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True once an append crossed the limit
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Borrow the accumulated bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the accumulated bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
