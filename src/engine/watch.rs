//! Socket watch table maintenance
//!
//! Applies the transport's socket requests to the reactor. Only reachable from
//! the engine's step functions, after the transport call that raised them.

use super::Engine;
use crate::error::EngineFault;
use crate::reactor::Reactor;
use crate::sink::CompletionSink;
use crate::transport::{SocketRequest, Transport};
use crate::types::{Interest, Socket, TransferId};
use tracing::trace;

/// Reactor registration bound to one transport socket
#[derive(Debug)]
pub struct SocketWatch<G> {
    socket: Socket,
    interest: Interest,
    pub(super) registration: Option<G>,
    transfer: Option<TransferId>,
}

impl<G> SocketWatch<G> {
    /// Watched descriptor
    pub fn socket(&self) -> Socket {
        self.socket
    }

    /// Current interest set
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Whether the socket is currently registered with the reactor
    ///
    /// False while the interest set is empty.
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Transfer owning the socket, when known
    pub fn transfer(&self) -> Option<TransferId> {
        self.transfer
    }
}

fn register<R: Reactor>(
    reactor: &mut R,
    socket: Socket,
    interest: Interest,
) -> Result<Option<R::Registration>, EngineFault> {
    if interest.is_empty() {
        return Ok(None);
    }
    reactor
        .register(socket, interest)
        .map(Some)
        .map_err(|source| EngineFault::Registration { socket, source })
}

impl<T, R, S> Engine<T, R, S>
where
    T: Transport,
    R: Reactor,
    S: CompletionSink,
{
    pub(super) fn apply_socket_request(
        &mut self,
        socket: Socket,
        request: SocketRequest,
        transfer: Option<TransferId>,
    ) -> Result<(), EngineFault> {
        match request {
            SocketRequest::Remove => {
                let watch = self
                    .watches
                    .remove(&socket)
                    .ok_or(EngineFault::UnknownSocket { socket })?;
                if let Some(registration) = watch.registration {
                    self.reactor.deregister(registration);
                }
                trace!(socket, "socket watch removed");
            }
            SocketRequest::Watch(interest) => match self.watches.get_mut(&socket) {
                Some(watch) => {
                    if transfer.is_some() {
                        watch.transfer = transfer;
                    }
                    if watch.interest == interest {
                        return Ok(());
                    }
                    // Registrations are immutable; replace rather than update.
                    if let Some(registration) = watch.registration.take() {
                        self.reactor.deregister(registration);
                    }
                    watch.interest = interest;
                    watch.registration = register(&mut self.reactor, socket, interest)?;
                    trace!(socket, %interest, "socket watch modified");
                }
                None => {
                    let registration = register(&mut self.reactor, socket, interest)?;
                    self.watches.insert(
                        socket,
                        SocketWatch {
                            socket,
                            interest,
                            registration,
                            transfer,
                        },
                    );
                    trace!(socket, %interest, "socket watch added");
                }
            },
        }
        Ok(())
    }
}
