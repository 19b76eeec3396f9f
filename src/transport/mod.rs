//! Transport engine seam
//!
//! The engine drives an external non-blocking multi-transfer client through
//! the [`Transport`] trait. During every call the transport may raise socket
//! and timer requests; they are queued as [`TransportSignal`]s and collected
//! by the engine with [`Transport::take_signals`] before the call returns to
//! the reactor, which keeps the registration bookkeeping a strictly
//! synchronous part of each step.
//!
//! - [`curl_multi`] — production implementation on the curl multi-socket interface

pub mod curl_multi;

use crate::error::{EngineFault, SubmitError};
use crate::transfer::TransferRecord;
use crate::types::{Interest, Readiness, Socket, TransferId};
use std::time::Duration;

pub use self::curl_multi::{Collector, CurlTransport};

/// What the transport wants done with one of its sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRequest {
    /// Watch the socket for the given interest (add or modify)
    Watch(Interest),
    /// Stop watching the socket
    Remove,
}

/// A request raised by the transport during a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// Socket registration change
    Socket {
        /// Descriptor concerned
        socket: Socket,
        /// Requested change
        request: SocketRequest,
        /// Transfer the socket belongs to, when the transport knows it
        ///
        /// [`CurlTransport`] always leaves this unset: libcurl's socket
        /// callback does not name the easy handle, and one connection can be
        /// reused by several transfers in turn.
        transfer: Option<TransferId>,
    },
    /// Re-arm the engine timer (`Some`) or cancel it (`None`)
    Timer(Option<Duration>),
}

/// A transfer the transport reports as done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// Transfer that finished
    pub id: TransferId,
    /// Transport outcome; `Err` carries the transport's error message
    pub result: Result<(), String>,
}

/// Non-blocking multi-transfer client driven by the engine
pub trait Transport {
    /// Per-transfer key the engine's pool holds while the transfer is in flight
    type Handle;

    /// Configure a handle for `record` and add it to the transfer pool
    fn add(&mut self, record: TransferRecord) -> Result<Self::Handle, SubmitError>;

    /// Detach a handle from the pool and give back its record
    fn remove(&mut self, handle: Self::Handle) -> Result<TransferRecord, EngineFault>;

    /// Advance the state machine for readiness on `socket`
    ///
    /// Returns the number of transfers still running.
    fn socket_action(&mut self, socket: Socket, readiness: Readiness)
    -> Result<usize, EngineFault>;

    /// Advance the state machine because the requested timeout elapsed
    ///
    /// Returns the number of transfers still running.
    fn timeout_action(&mut self) -> Result<usize, EngineFault>;

    /// Move every signal raised since the last call into `out`, in order
    fn take_signals(&mut self, out: &mut Vec<TransportSignal>);

    /// Transfers that finished since the last call
    fn take_finished(&mut self) -> Vec<Finished>;
}
