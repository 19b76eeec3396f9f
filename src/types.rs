//! Core types for hiperfetch

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Socket descriptor as handed out by the transport
pub type Socket = std::os::fd::RawFd;

/// Unique identifier for a transfer, assigned at submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub u64);

impl TransferId {
    /// Create a new TransferId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TransferId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TransferId> for u64 {
    fn from(id: TransferId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of readiness kinds a watch is interested in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Interest {
    /// Wake when the socket is readable
    pub readable: bool,
    /// Wake when the socket is writable
    pub writable: bool,
}

impl Interest {
    /// No interest; the watch exists but is not registered
    pub const NONE: Interest = Interest {
        readable: false,
        writable: false,
    };
    /// Readable only
    pub const READ: Interest = Interest {
        readable: true,
        writable: false,
    };
    /// Writable only
    pub const WRITE: Interest = Interest {
        readable: false,
        writable: true,
    };
    /// Readable and writable
    pub const BOTH: Interest = Interest {
        readable: true,
        writable: true,
    };

    /// True when neither direction is requested
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}

impl std::fmt::Display for Interest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match (self.readable, self.writable) {
            (false, false) => "none",
            (true, false) => "in",
            (false, true) => "out",
            (true, true) => "inout",
        };
        f.write_str(s)
    }
}

/// Readiness reported by the reactor for one socket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Socket is readable (or hung up)
    pub readable: bool,
    /// Socket is writable
    pub writable: bool,
    /// Socket reported an error condition
    pub error: bool,
}

impl Readiness {
    /// Readable only
    pub fn readable() -> Self {
        Self {
            readable: true,
            ..Default::default()
        }
    }

    /// Writable only
    pub fn writable() -> Self {
        Self {
            writable: true,
            ..Default::default()
        }
    }

    /// True when nothing is ready
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable && !self.error
    }

    /// Merge another readiness report into this one
    pub fn merge(&mut self, other: Readiness) {
        self.readable |= other.readable;
        self.writable |= other.writable;
        self.error |= other.error;
    }
}

/// A finished transfer as handed to the completion sink
///
/// Both the source URL and the body are exposed so the sink can decide what
/// to persist.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Transfer identifier
    pub id: TransferId,
    /// URL the transfer was submitted with
    pub url: String,
    /// Response body (partial if the transfer failed mid-way)
    pub body: Vec<u8>,
    /// HTTP status, when a response line was received
    pub status: Option<u32>,
    /// Transport or HTTP error, `None` on success
    pub error: Option<String>,
    /// Time from submission to completion
    pub elapsed: Duration,
}

impl Completion {
    /// Number of body bytes received
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// True when neither the transport nor the HTTP status reported a failure
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
