//! curl multi-socket transport
//!
//! Each transfer is an `Easy2<Collector>` whose handler owns the
//! [`TransferRecord`]. The transport keeps the attached handles keyed by
//! transfer id, which doubles as the easy handle's token, so completion
//! messages can be resolved against the handle and carry libcurl's
//! error-buffer detail. Socket and timer callbacks only push into a channel
//! drained by the engine.
//!
//! libcurl's socket callback does not expose the easy handle, so socket
//! signals from this transport never name their transfer.

use super::{Finished, SocketRequest, Transport, TransportSignal};
use crate::config::{EngineConfig, TransferConfig};
use crate::error::{EngineFault, Result, SubmitError};
use crate::transfer::TransferRecord;
use crate::types::{Interest, Readiness, Socket, TransferId};
use curl::easy::{Easy2, Handler, WriteError};
use curl::multi::{Easy2Handle, Events, Multi};
use std::collections::HashMap;
use std::sync::mpsc;
use tracing::{debug, warn};

/// curl write handler that appends into the owned transfer record
///
/// The record is taken back out when the handle leaves the pool.
#[derive(Debug)]
pub struct Collector(Option<TransferRecord>);

impl Collector {
    /// Wrap a record
    pub fn new(record: TransferRecord) -> Self {
        Self(Some(record))
    }

    /// Borrow the record while the transfer is running
    pub fn record(&self) -> Option<&TransferRecord> {
        self.0.as_ref()
    }
}

impl Handler for Collector {
    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, WriteError> {
        // A short count makes curl abort the transfer with a write error.
        match self.0.as_mut() {
            Some(record) => Ok(if record.receive(data) { data.len() } else { 0 }),
            None => Ok(0),
        }
    }
}

/// Transport backed by one curl multi handle
pub struct CurlTransport {
    // Attached handles must detach before the multi handle is dropped.
    handles: HashMap<TransferId, Easy2Handle<Collector>>,
    multi: Multi,
    signals: mpsc::Receiver<TransportSignal>,
    options: TransferConfig,
    running: usize,
}

impl CurlTransport {
    /// Create the multi handle and install the socket and timer callbacks
    pub fn new(engine: &EngineConfig, options: &TransferConfig) -> Result<Self> {
        let mut multi = Multi::new();
        let (tx, rx) = mpsc::channel();

        let socket_tx = tx.clone();
        multi.socket_function(move |socket, events, _token| {
            let request = if events.remove() {
                SocketRequest::Remove
            } else {
                SocketRequest::Watch(Interest {
                    readable: events.input(),
                    writable: events.output(),
                })
            };
            // The receiver lives in the transport, so this only fails while
            // the multi handle is being torn down.
            let _ = socket_tx.send(TransportSignal::Socket {
                socket,
                request,
                transfer: None,
            });
        })?;
        multi.timer_function(move |timeout| tx.send(TransportSignal::Timer(timeout)).is_ok())?;

        if let Some(max) = engine.max_host_connections {
            multi.set_max_host_connections(max)?;
        }
        if let Some(max) = engine.max_total_connections {
            multi.set_max_total_connections(max)?;
        }

        Ok(Self {
            handles: HashMap::new(),
            multi,
            signals: rx,
            options: options.clone(),
            running: 0,
        })
    }

    /// Version string of the linked libcurl
    pub fn version() -> String {
        curl::Version::get().version().to_string()
    }

    fn configure(&self, easy: &mut Easy2<Collector>, url: &str) -> std::result::Result<(), curl::Error> {
        easy.url(url)?;
        easy.follow_location(self.options.follow_redirects)?;
        if let Some(agent) = &self.options.user_agent {
            easy.useragent(agent)?;
        }
        if let Some(timeout) = self.options.connect_timeout {
            easy.connect_timeout(timeout)?;
        }
        if let Some(timeout) = self.options.timeout {
            easy.timeout(timeout)?;
        }
        Ok(())
    }
}

fn rejected(url: &str, reason: impl std::fmt::Display) -> SubmitError {
    SubmitError::Rejected {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Prefer libcurl's detailed error-buffer text over the generic code description
fn failure_message(error: &curl::Error) -> String {
    match error.extra_description() {
        Some(detail) if !detail.is_empty() => detail.to_string(),
        _ => error.description().to_string(),
    }
}

fn fault(context: &'static str, reason: impl std::fmt::Display) -> EngineFault {
    EngineFault::Transport {
        context,
        reason: reason.to_string(),
    }
}

impl Transport for CurlTransport {
    type Handle = TransferId;

    fn add(&mut self, record: TransferRecord) -> std::result::Result<Self::Handle, SubmitError> {
        let url = record.url().to_string();
        let id = record.id();

        let mut easy = Easy2::new(Collector::new(record));
        self.configure(&mut easy, &url)
            .map_err(|e| rejected(&url, e))?;

        let mut handle = self.multi.add2(easy).map_err(|e| rejected(&url, e))?;
        handle
            .set_token(id.get() as usize)
            .map_err(|e| rejected(&url, e))?;

        debug!(transfer_id = %id, url = %url, "added easy handle to multi");
        self.handles.insert(id, handle);
        Ok(id)
    }

    fn remove(&mut self, id: TransferId) -> std::result::Result<TransferRecord, EngineFault> {
        let handle = self
            .handles
            .remove(&id)
            .ok_or_else(|| fault("remove_handle", format!("unknown transfer {}", id)))?;
        let mut easy = self
            .multi
            .remove2(handle)
            .map_err(|e| fault("remove_handle", e))?;

        let status = easy.response_code().unwrap_or(0);
        let mut record = easy
            .get_mut()
            .0
            .take()
            .ok_or_else(|| fault("remove_handle", "transfer record already taken"))?;
        if status != 0 {
            record.set_status(status);
        }
        Ok(record)
    }

    fn socket_action(
        &mut self,
        socket: Socket,
        readiness: Readiness,
    ) -> std::result::Result<usize, EngineFault> {
        let mut events = Events::new();
        events
            .input(readiness.readable)
            .output(readiness.writable)
            .error(readiness.error);

        match self.multi.action(socket, &events) {
            Ok(running) => {
                self.running = running as usize;
                Ok(self.running)
            }
            // A socket closed earlier in the same dispatch round; harmless.
            Err(e) if e.is_bad_socket() => {
                warn!(socket, "socket_action on a socket the transport no longer knows");
                Ok(self.running)
            }
            Err(e) => Err(fault("socket_action", e)),
        }
    }

    fn timeout_action(&mut self) -> std::result::Result<usize, EngineFault> {
        let running = self.multi.timeout().map_err(|e| fault("socket_action(timeout)", e))?;
        self.running = running as usize;
        Ok(self.running)
    }

    fn take_signals(&mut self, out: &mut Vec<TransportSignal>) {
        out.extend(self.signals.try_iter());
    }

    fn take_finished(&mut self) -> Vec<Finished> {
        let mut finished = Vec::new();
        let handles = &self.handles;
        self.multi.messages(|msg| {
            let id = match msg.token() {
                Ok(token) => TransferId(token as u64),
                Err(e) => {
                    warn!(error = %e, "completion message without a transfer token");
                    return;
                }
            };
            let Some(handle) = handles.get(&id) else {
                warn!(transfer_id = %id, "completion message for an unknown transfer");
                return;
            };
            // Resolving against the handle pulls in the error-buffer text.
            if let Some(result) = msg.result_for2(handle) {
                finished.push(Finished {
                    id,
                    result: result.map_err(|e| failure_message(&e)),
                });
            }
        });
        finished
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_appends_and_reports_full_writes() {
        let mut collector = Collector::new(TransferRecord::new(
            TransferId(1),
            "http://example.test/",
            None,
        ));
        assert_eq!(collector.write(b"abc").unwrap(), 3);
        assert_eq!(collector.write(b"de").unwrap(), 2);
        assert_eq!(collector.record().unwrap().body(), b"abcde");
    }

    #[test]
    fn collector_short_write_past_body_limit() {
        let mut collector = Collector::new(TransferRecord::new(
            TransferId(1),
            "http://example.test/",
            Some(2),
        ));
        assert_eq!(collector.write(b"abc").unwrap(), 0);
        assert!(collector.record().unwrap().error().is_some());
    }

    #[test]
    fn add_then_remove_returns_the_record() {
        let mut transport =
            CurlTransport::new(&EngineConfig::default(), &TransferConfig::default()).unwrap();
        let record = TransferRecord::new(TransferId(5), "http://127.0.0.1:9/", None);

        let handle = transport.add(record).unwrap();
        let mut signals = Vec::new();
        transport.take_signals(&mut signals);
        // Adding a handle asks for an immediate timeout so the first step runs.
        assert!(signals.iter().any(|s| matches!(s, TransportSignal::Timer(Some(_)))));

        let record = transport.remove(handle).unwrap();
        assert_eq!(record.id(), TransferId(5));
        assert_eq!(record.url(), "http://127.0.0.1:9/");
        assert!(transport.take_finished().is_empty());
    }

    #[test]
    fn failure_message_prefers_error_buffer_detail() {
        let mut error = curl::Error::new(7);
        assert_eq!(failure_message(&error), error.description());

        error.set_extra("Failed to connect to 127.0.0.1 port 9: Connection refused".to_string());
        assert_eq!(
            failure_message(&error),
            "Failed to connect to 127.0.0.1 port 9: Connection refused"
        );
    }

    #[test]
    fn removing_an_unknown_transfer_is_a_fault() {
        let mut transport =
            CurlTransport::new(&EngineConfig::default(), &TransferConfig::default()).unwrap();
        let err = transport.remove(TransferId(42)).unwrap_err();
        assert!(matches!(err, EngineFault::Transport { context: "remove_handle", .. }));
    }

    #[test]
    fn version_is_reported() {
        assert!(!CurlTransport::version().is_empty());
    }
}
