//! Job intake
//!
//! Jobs arrive as whitespace-delimited URLs on a byte stream, normally the
//! named pipe created by [`fifo::FifoSource`]. [`JobIntake`] turns the stream
//! into submissions, at most `batch_limit` per invocation so a flood of input
//! cannot starve transfers that are already running.

pub mod fifo;

pub use fifo::FifoSource;

use crate::config::IntakeConfig;
use crate::error::SubmitError;
use crate::types::TransferId;
use std::io::{self, Read};
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

/// Anything that accepts URLs for fetching
pub trait Submitter {
    /// Submit one URL
    fn submit(&mut self, url: &str) -> Result<TransferId, SubmitError>;
}

/// Result of asking the reader for the next token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A complete, non-empty token
    Url(String),
    /// No complete token is available without blocking
    WouldBlock,
    /// The stream reported end-of-input and no partial token is left
    EndOfInput,
}

/// Splits a non-blocking byte stream into whitespace-delimited tokens
///
/// A token cut short by `WouldBlock` is kept and completed by later reads.
/// Tokens longer than `max_token_len` bytes are truncated; the rest of the
/// token is skipped up to the next whitespace.
pub struct TokenReader<R> {
    source: R,
    chunk: Box<[u8]>,
    start: usize,
    end: usize,
    current: Vec<u8>,
    truncated: bool,
    max_token_len: usize,
}

impl<R: Read> TokenReader<R> {
    /// Wrap a byte source
    pub fn new(source: R, max_token_len: usize) -> Self {
        Self {
            source,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
            start: 0,
            end: 0,
            current: Vec::with_capacity(max_token_len.min(READ_CHUNK)),
            truncated: false,
            max_token_len,
        }
    }

    /// Borrow the underlying source
    pub fn source(&self) -> &R {
        &self.source
    }

    /// Read until one token is complete or the source stops yielding
    pub fn next_token(&mut self) -> io::Result<Token> {
        loop {
            while self.start < self.end {
                let byte = self.chunk[self.start];
                self.start += 1;

                if byte.is_ascii_whitespace() {
                    if !self.current.is_empty() {
                        return Ok(Token::Url(self.take_current()));
                    }
                } else if self.current.len() < self.max_token_len {
                    self.current.push(byte);
                } else {
                    self.truncated = true;
                }
            }

            match self.source.read(&mut self.chunk) {
                Ok(0) if self.current.is_empty() => return Ok(Token::EndOfInput),
                Ok(0) => return Ok(Token::Url(self.take_current())),
                Ok(n) => {
                    self.start = 0;
                    self.end = n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Token::WouldBlock),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn take_current(&mut self) -> String {
        let token = String::from_utf8_lossy(&self.current).into_owned();
        if self.truncated {
            warn!(max_len = self.max_token_len, "intake token truncated");
            self.truncated = false;
        }
        self.current.clear();
        token
    }
}

/// Why a batch stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEnd {
    /// The source would block; wait for readability
    Drained,
    /// The batch limit was reached; more input may be waiting
    Saturated,
    /// The source reported end-of-input
    EndOfInput,
}

/// Summary of one intake invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Why the batch stopped
    pub end: BatchEnd,
    /// Tokens accepted by the submitter
    pub submitted: usize,
    /// Tokens the submitter refused
    pub rejected: usize,
}

/// Reads job tokens and submits them in bounded batches
pub struct JobIntake<R> {
    reader: TokenReader<R>,
    batch_limit: usize,
}

impl<R: Read> JobIntake<R> {
    /// Create an intake over `source`
    pub fn new(source: R, config: &IntakeConfig) -> Self {
        Self {
            reader: TokenReader::new(source, config.max_token_len),
            batch_limit: config.batch_limit,
        }
    }

    /// Borrow the underlying source
    pub fn source(&self) -> &R {
        self.reader.source()
    }

    /// Submit tokens until the source would block, ends, or the batch is full
    ///
    /// Refused tokens are logged and skipped. Only read errors other than
    /// `WouldBlock` and `Interrupted` are returned.
    pub fn run_batch(&mut self, target: &mut impl Submitter) -> io::Result<BatchReport> {
        let mut submitted = 0;
        let mut rejected = 0;

        let end = loop {
            if submitted + rejected >= self.batch_limit {
                break BatchEnd::Saturated;
            }

            match self.reader.next_token()? {
                Token::Url(url) => match target.submit(&url) {
                    Ok(id) => {
                        debug!(transfer_id = %id, url = %url, "job accepted");
                        submitted += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "job refused");
                        rejected += 1;
                    }
                },
                Token::WouldBlock => break BatchEnd::Drained,
                Token::EndOfInput => break BatchEnd::EndOfInput,
            }
        };

        if submitted + rejected > 0 {
            debug!(submitted, rejected, ?end, "intake batch finished");
        }

        Ok(BatchReport {
            end,
            submitted,
            rejected,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
