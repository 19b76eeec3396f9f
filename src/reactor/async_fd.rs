//! Reactor built on tokio's `AsyncFd`
//!
//! tokio readiness is edge-triggered while the transport expects level
//! semantics: it may leave data in a socket after a step and still expect to
//! be called again. Every socket dispatched is therefore probed with a
//! zero-timeout `poll(2)` before the next wait and re-queued while the
//! requested condition still holds.

use super::{Reactor, ReactorEvent};
use crate::types::{Interest, Readiness, Socket};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Borrowed descriptor; the transport owns and closes the socket
#[derive(Debug)]
struct WatchedFd(RawFd);

impl AsRawFd for WatchedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

struct Watch {
    generation: u64,
    interest: Interest,
    fd: AsyncFd<WatchedFd>,
}

/// Registration handle issued by [`TokioReactor`]
#[derive(Debug, PartialEq, Eq)]
pub struct FdRegistration {
    socket: Socket,
    generation: u64,
}

impl FdRegistration {
    /// Registered descriptor
    pub fn socket(&self) -> Socket {
        self.socket
    }
}

/// Single-threaded reactor over tokio's I/O driver and timer wheel
///
/// Must be used from within a tokio runtime with I/O and time enabled.
#[derive(Default)]
pub struct TokioReactor {
    watches: HashMap<Socket, Watch>,
    next_generation: u64,
    deadline: Option<Instant>,
    pending: VecDeque<(Socket, Readiness)>,
    dispatched: Vec<Socket>,
}

impl TokioReactor {
    /// Create an empty reactor
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live socket registrations
    pub fn registrations(&self) -> usize {
        self.watches.len()
    }

    /// Deadline of the engine timer, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Wait for the next socket readiness or timer expiry
    ///
    /// Cancel safe: readiness collected before cancellation stays queued and
    /// the timer stays armed.
    pub async fn wait(&mut self) -> ReactorEvent {
        self.requeue_still_ready();

        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            self.deadline = None;
            return ReactorEvent::Timeout;
        }

        let deadline = self.deadline;
        let fired = tokio::select! {
            ready = std::future::poll_fn(|cx| self.poll_next(cx)) => Some(ready),
            () = sleep_until(deadline) => None,
        };

        match fired {
            Some((socket, readiness)) => {
                self.dispatched.push(socket);
                ReactorEvent::Socket { socket, readiness }
            }
            None => {
                self.deadline = None;
                ReactorEvent::Timeout
            }
        }
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<(Socket, Readiness)> {
        for (&socket, watch) in &self.watches {
            let mut readiness = Readiness::default();

            if watch.interest.readable {
                match watch.fd.poll_read_ready(cx) {
                    Poll::Ready(Ok(mut guard)) => {
                        guard.clear_ready();
                        readiness.readable = true;
                    }
                    Poll::Ready(Err(e)) => {
                        debug!(socket, error = %e, "read readiness error");
                        readiness.error = true;
                    }
                    Poll::Pending => {}
                }
            }
            if watch.interest.writable {
                match watch.fd.poll_write_ready(cx) {
                    Poll::Ready(Ok(mut guard)) => {
                        guard.clear_ready();
                        readiness.writable = true;
                    }
                    Poll::Ready(Err(e)) => {
                        debug!(socket, error = %e, "write readiness error");
                        readiness.error = true;
                    }
                    Poll::Pending => {}
                }
            }

            if !readiness.is_empty() {
                enqueue(&mut self.pending, socket, readiness);
            }
        }

        match self.pending.pop_front() {
            Some(ready) => Poll::Ready(ready),
            None => Poll::Pending,
        }
    }

    fn requeue_still_ready(&mut self) {
        for socket in std::mem::take(&mut self.dispatched) {
            let Some(watch) = self.watches.get(&socket) else {
                continue;
            };
            let readiness = probe(socket, watch.interest);
            if !readiness.is_empty() {
                trace!(socket, ?readiness, "socket still ready after dispatch");
                enqueue(&mut self.pending, socket, readiness);
            }
        }
    }
}

fn enqueue(pending: &mut VecDeque<(Socket, Readiness)>, socket: Socket, readiness: Readiness) {
    match pending.iter_mut().find(|(s, _)| *s == socket) {
        Some((_, queued)) => queued.merge(readiness),
        None => pending.push_back((socket, readiness)),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Level-triggered readiness check that never blocks
fn probe(socket: Socket, interest: Interest) -> Readiness {
    let mut events: libc::c_short = 0;
    if interest.readable {
        events |= libc::POLLIN;
    }
    if interest.writable {
        events |= libc::POLLOUT;
    }
    let mut pfd = libc::pollfd {
        fd: socket,
        events,
        revents: 0,
    };

    // SAFETY: pfd is a valid, initialized pollfd, the count passed is 1 and a
    // zero timeout returns immediately.
    let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
    if rc <= 0 || pfd.revents & libc::POLLNVAL != 0 {
        return Readiness::default();
    }

    Readiness {
        readable: interest.readable && pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0,
        writable: interest.writable && pfd.revents & libc::POLLOUT != 0,
        error: pfd.revents & libc::POLLERR != 0,
    }
}

fn tokio_interest(interest: Interest) -> io::Result<tokio::io::Interest> {
    match (interest.readable, interest.writable) {
        (true, true) => Ok(tokio::io::Interest::READABLE | tokio::io::Interest::WRITABLE),
        (true, false) => Ok(tokio::io::Interest::READABLE),
        (false, true) => Ok(tokio::io::Interest::WRITABLE),
        (false, false) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot register an empty interest set",
        )),
    }
}

impl Reactor for TokioReactor {
    type Registration = FdRegistration;

    fn register(&mut self, socket: Socket, interest: Interest) -> io::Result<FdRegistration> {
        if self.watches.contains_key(&socket) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("socket {} is already registered", socket),
            ));
        }

        let fd = AsyncFd::try_with_interest(WatchedFd(socket), tokio_interest(interest)?)
            .map_err(|e| e.into_parts().1)?;
        self.next_generation += 1;
        let generation = self.next_generation;
        self.watches.insert(
            socket,
            Watch {
                generation,
                interest,
                fd,
            },
        );
        Ok(FdRegistration { socket, generation })
    }

    fn deregister(&mut self, registration: FdRegistration) {
        let current = self
            .watches
            .get(&registration.socket)
            .is_some_and(|w| w.generation == registration.generation);
        if current {
            // Dropping the AsyncFd removes the descriptor from the I/O driver.
            self.watches.remove(&registration.socket);
            self.pending.retain(|(s, _)| *s != registration.socket);
        }
    }

    fn arm_timer(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    fn disarm_timer(&mut self) {
        self.deadline = None;
    }

    fn timer_armed(&self) -> bool {
        self.deadline.is_some()
    }
}
