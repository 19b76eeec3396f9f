//! Multi-transfer engine
//!
//! [`Engine`] owns the pool of in-flight transfers, the socket watch table and
//! the deferred-admission backlog. The daemon loop feeds it reactor events
//! through [`Engine::on_socket_ready`] and [`Engine::on_timer_fire`]; each step
//! advances the transport, applies the socket and timer requests it raised,
//! and drains finished transfers into the [`CompletionSink`].

mod watch;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use watch::SocketWatch;

use crate::config::Config;
use crate::error::{EngineFault, SubmitError};
use crate::intake::Submitter;
use crate::reactor::Reactor;
use crate::sink::CompletionSink;
use crate::transfer::TransferRecord;
use crate::transport::{Finished, Transport, TransportSignal};
use crate::types::{Completion, Readiness, Socket, TransferId};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};
use url::Url;

/// Running totals kept by the engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Submissions accepted (admitted immediately or deferred)
    pub submitted: u64,
    /// Submissions that had to wait in the backlog
    pub deferred: u64,
    /// Submissions refused by URL validation or the transport
    pub rejected: u64,
    /// Transfers delivered without an error
    pub completed: u64,
    /// Transfers delivered with an error
    pub failed: u64,
    /// Deliveries the sink refused
    pub sink_errors: u64,
}

/// Owned engine context
pub struct Engine<T, R, S>
where
    T: Transport,
    R: Reactor,
    S: CompletionSink,
{
    transport: T,
    reactor: R,
    sink: S,
    transfers: HashMap<TransferId, T::Handle>,
    backlog: VecDeque<TransferRecord>,
    watches: HashMap<Socket, SocketWatch<R::Registration>>,
    signals: Vec<TransportSignal>,
    still_running: usize,
    next_id: u64,
    max_parallel: Option<usize>,
    max_body_bytes: Option<usize>,
    stats: EngineStats,
}

impl<T, R, S> Engine<T, R, S>
where
    T: Transport,
    R: Reactor,
    S: CompletionSink,
{
    /// Assemble an engine from its collaborators
    pub fn new(transport: T, reactor: R, sink: S, config: &Config) -> Self {
        Self {
            transport,
            reactor,
            sink,
            transfers: HashMap::new(),
            backlog: VecDeque::new(),
            watches: HashMap::new(),
            signals: Vec::new(),
            still_running: 0,
            next_id: 0,
            max_parallel: config.engine.max_parallel_transfers,
            max_body_bytes: config.transfer.max_body_bytes,
            stats: EngineStats::default(),
        }
    }

    /// Submit a URL for fetching
    ///
    /// Tokens that do not parse as absolute URLs are refused here with
    /// [`SubmitError::InvalidUrl`] before the transport sees them. This is
    /// stricter than libcurl, which would guess `http://` for a scheme-less
    /// token such as `www.example.com/x`; intake input is expected to carry
    /// its scheme.
    ///
    /// The transfer is admitted to the transport right away unless the
    /// parallelism cap is reached, in which case it waits in the backlog.
    /// Socket and timer requests raised by the admission are applied by the
    /// next [`Engine::settle`] or step.
    pub fn submit(&mut self, url: &str) -> Result<TransferId, SubmitError> {
        if let Err(e) = Url::parse(url) {
            self.stats.rejected += 1;
            return Err(SubmitError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }

        self.next_id += 1;
        let id = TransferId(self.next_id);
        let record = TransferRecord::new(id, url, self.max_body_bytes);

        if !self.has_capacity() || !self.backlog.is_empty() {
            self.backlog.push_back(record);
            self.stats.submitted += 1;
            self.stats.deferred += 1;
            debug!(transfer_id = %id, url, backlog = self.backlog.len(), "transfer deferred");
            return Ok(id);
        }

        match self.transport.add(record) {
            Ok(handle) => {
                self.transfers.insert(id, handle);
                self.stats.submitted += 1;
                debug!(transfer_id = %id, url, in_flight = self.transfers.len(), "transfer submitted");
                Ok(id)
            }
            Err(e) => {
                self.stats.rejected += 1;
                Err(e)
            }
        }
    }

    /// Apply socket and timer requests the transport raised outside a step
    pub fn settle(&mut self) -> Result<(), EngineFault> {
        self.apply_signals()
    }

    /// Forward socket readiness into the transport
    ///
    /// Readiness for a socket whose watch was removed earlier in the same
    /// dispatch round is discarded.
    pub fn on_socket_ready(&mut self, socket: Socket, readiness: Readiness) -> Result<(), EngineFault> {
        if !self.watches.contains_key(&socket) {
            debug!(socket, ?readiness, "discarding readiness for unwatched socket");
            return Ok(());
        }

        self.still_running = self.transport.socket_action(socket, readiness)?;
        self.apply_signals()?;
        self.drain_completions()?;
        Ok(())
    }

    /// Forward a timer expiry into the transport
    pub fn on_timer_fire(&mut self) -> Result<(), EngineFault> {
        self.still_running = self.transport.timeout_action()?;
        self.apply_signals()?;
        self.drain_completions()?;
        Ok(())
    }

    /// Deliver every transfer the transport finished since the last drain
    ///
    /// Each finished transfer leaves the pool and reaches the sink exactly
    /// once; freed slots are refilled from the backlog. Returns the number of
    /// completions delivered.
    pub fn drain_completions(&mut self) -> Result<usize, EngineFault> {
        let mut delivered = 0;

        for Finished { id, result } in self.transport.take_finished() {
            let Some(handle) = self.transfers.remove(&id) else {
                warn!(transfer_id = %id, "transport finished a transfer that is not in the pool");
                continue;
            };
            let mut record = self.transport.remove(handle)?;
            if let Err(message) = result {
                record.fail(message);
            }
            self.deliver(record.into_completion());
            delivered += 1;
        }

        if delivered > 0 {
            self.apply_signals()?;
            self.promote_backlog()?;
        }

        if self.transfers.is_empty() && self.backlog.is_empty() && self.reactor.timer_armed() {
            debug!("engine idle, disarming timer");
            self.reactor.disarm_timer();
        }

        Ok(delivered)
    }

    /// Release every unfinished transfer without delivering it
    ///
    /// Used on shutdown. Returns how many transfers were dropped.
    pub fn abandon_all(&mut self) -> usize {
        let mut abandoned = self.backlog.len();
        self.backlog.clear();

        let ids: Vec<TransferId> = self.transfers.keys().copied().collect();
        for id in ids {
            if let Some(handle) = self.transfers.remove(&id) {
                abandoned += 1;
                if let Err(e) = self.transport.remove(handle) {
                    warn!(transfer_id = %id, error = %e, "failed to release transfer");
                }
            }
        }

        if let Err(e) = self.apply_signals() {
            warn!(error = %e, "inconsistent socket requests while releasing transfers");
        }
        for (_, watch) in self.watches.drain() {
            if let Some(registration) = watch.registration {
                self.reactor.deregister(registration);
            }
        }
        self.reactor.disarm_timer();
        self.still_running = 0;
        abandoned
    }

    /// Running totals
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Transfers the transport last reported as running
    pub fn still_running(&self) -> usize {
        self.still_running
    }

    /// Transfers currently held by the transport
    pub fn in_flight(&self) -> usize {
        self.transfers.len()
    }

    /// Submissions waiting for a free slot
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// True when nothing is in flight or waiting
    pub fn is_idle(&self) -> bool {
        self.transfers.is_empty() && self.backlog.is_empty()
    }

    /// Number of live socket watches
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Look up the watch for a socket
    pub fn watch(&self, socket: Socket) -> Option<&SocketWatch<R::Registration>> {
        self.watches.get(&socket)
    }

    /// Borrow the reactor
    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    /// Mutably borrow the reactor, e.g. to wait for its next event
    pub fn reactor_mut(&mut self) -> &mut R {
        &mut self.reactor
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Borrow the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutably borrow the sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the engine, giving back the sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn has_capacity(&self) -> bool {
        self.max_parallel
            .is_none_or(|max| self.transfers.len() < max)
    }

    fn apply_signals(&mut self) -> Result<(), EngineFault> {
        let mut signals = std::mem::take(&mut self.signals);
        self.transport.take_signals(&mut signals);

        let result = signals.drain(..).try_for_each(|signal| match signal {
            TransportSignal::Socket {
                socket,
                request,
                transfer,
            } => self.apply_socket_request(socket, request, transfer),
            TransportSignal::Timer(Some(after)) => {
                self.reactor.arm_timer(after);
                Ok(())
            }
            TransportSignal::Timer(None) => {
                self.reactor.disarm_timer();
                Ok(())
            }
        });

        self.signals = signals;
        result
    }

    fn promote_backlog(&mut self) -> Result<(), EngineFault> {
        let mut promoted = false;

        while self.has_capacity() {
            let Some(record) = self.backlog.pop_front() else {
                break;
            };
            let id = record.id();
            let url = record.url().to_string();

            match self.transport.add(record) {
                Ok(handle) => {
                    self.transfers.insert(id, handle);
                    promoted = true;
                    debug!(transfer_id = %id, url = %url, "deferred transfer admitted");
                }
                Err(e) => {
                    // Already acknowledged to intake, so it still gets delivered.
                    warn!(transfer_id = %id, url = %url, error = %e, "deferred transfer rejected");
                    let mut failed = TransferRecord::new(id, url, None);
                    failed.fail(e.to_string());
                    self.deliver(failed.into_completion());
                }
            }
        }

        if promoted {
            self.apply_signals()?;
        }
        Ok(())
    }

    fn deliver(&mut self, completion: Completion) {
        match &completion.error {
            None => {
                self.stats.completed += 1;
                info!(
                    transfer_id = %completion.id,
                    url = %completion.url,
                    status = completion.status.unwrap_or(0),
                    bytes = completion.size(),
                    elapsed_ms = completion.elapsed.as_millis() as u64,
                    "transfer complete"
                );
            }
            Some(error) => {
                self.stats.failed += 1;
                warn!(
                    transfer_id = %completion.id,
                    url = %completion.url,
                    status = completion.status.unwrap_or(0),
                    bytes = completion.size(),
                    elapsed_ms = completion.elapsed.as_millis() as u64,
                    error = %error,
                    "transfer failed"
                );
            }
        }

        let id = completion.id;
        if let Err(e) = self.sink.record(completion) {
            self.stats.sink_errors += 1;
            warn!(transfer_id = %id, error = %e, "completion sink failed, dropping result");
        }
    }
}

impl<T, R, S> Submitter for Engine<T, R, S>
where
    T: Transport,
    R: Reactor,
    S: CompletionSink,
{
    fn submit(&mut self, url: &str) -> Result<TransferId, SubmitError> {
        Engine::submit(self, url)
    }
}
