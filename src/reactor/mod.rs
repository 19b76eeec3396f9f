//! Readiness reactor seam
//!
//! The engine only needs to register sockets for an interest set, drop those
//! registrations, and keep one timer armed. [`Reactor`] captures exactly that;
//! [`TokioReactor`] implements it on the tokio current-thread runtime and
//! additionally produces the [`ReactorEvent`]s the daemon loop dispatches.

mod async_fd;

pub use async_fd::{FdRegistration, TokioReactor};

use crate::types::{Interest, Readiness, Socket};
use std::io;
use std::time::Duration;

/// Something the reactor observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    /// A watched socket became ready
    Socket {
        /// Descriptor that became ready
        socket: Socket,
        /// What it is ready for
        readiness: Readiness,
    },
    /// The engine timer expired
    Timeout,
}

/// Registration and timer operations the engine performs on its reactor
pub trait Reactor {
    /// Handle for one socket registration; dropping the bookkeeping must go
    /// through [`Reactor::deregister`]
    type Registration;

    /// Start delivering readiness for `socket` matching `interest`
    ///
    /// `interest` is never empty.
    fn register(&mut self, socket: Socket, interest: Interest) -> io::Result<Self::Registration>;

    /// Stop delivering readiness for a registration, effective immediately
    fn deregister(&mut self, registration: Self::Registration);

    /// Arm the engine timer to fire once after `after`, replacing any
    /// previously armed deadline
    fn arm_timer(&mut self, after: Duration);

    /// Cancel the engine timer if armed
    fn disarm_timer(&mut self);

    /// True while the engine timer is armed
    fn timer_armed(&self) -> bool;
}
