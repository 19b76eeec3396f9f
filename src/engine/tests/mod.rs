//! Engine tests against a scripted transport and a recording reactor.

use super::*;
use crate::error::SinkError;
use crate::transport::SocketRequest;
use crate::types::Interest;
use std::collections::HashSet;
use std::io;
use std::time::Duration;


/// Transport double whose behaviour is driven by the test
///
/// Handles are the transfer ids themselves. Tests queue socket and timer
/// signals with [`ScriptedTransport::emit`] and finish transfers with
/// [`ScriptedTransport::complete`]; both are picked up by the next step.
#[derive(Default)]
pub(super) struct ScriptedTransport {
    pool: HashMap<TransferId, TransferRecord>,
    signals: Vec<TransportSignal>,
    finished: Vec<Finished>,
    reject: HashSet<String>,
    pub(super) socket_actions: Vec<(Socket, Readiness)>,
    pub(super) timeout_actions: usize,
    pub(super) removed: Vec<TransferId>,
    pub(super) fail_actions: bool,
}

impl ScriptedTransport {
    pub(super) fn emit(&mut self, signal: TransportSignal) {
        self.signals.push(signal);
    }

    pub(super) fn watch(&mut self, socket: Socket, interest: Interest) {
        self.emit(TransportSignal::Socket {
            socket,
            request: SocketRequest::Watch(interest),
            transfer: None,
        });
    }

    pub(super) fn unwatch(&mut self, socket: Socket) {
        self.emit(TransportSignal::Socket {
            socket,
            request: SocketRequest::Remove,
            transfer: None,
        });
    }

    pub(super) fn reject(&mut self, url: &str) {
        self.reject.insert(url.to_string());
    }

    /// Feed `body` into the transfer and report it finished
    pub(super) fn complete(&mut self, id: TransferId, body: &[u8], result: Result<(), String>) {
        let record = self.pool.get_mut(&id).expect("transfer not in transport pool");
        record.receive(body);
        record.set_status(if result.is_ok() { 200 } else { 0 });
        self.finished.push(Finished { id, result });
    }

    pub(super) fn in_pool(&self) -> usize {
        self.pool.len()
    }

    pub(super) fn holds(&self, id: TransferId) -> bool {
        self.pool.contains_key(&id)
    }
}

impl Transport for ScriptedTransport {
    type Handle = TransferId;

    fn add(&mut self, record: TransferRecord) -> Result<TransferId, SubmitError> {
        if self.reject.contains(record.url()) {
            return Err(SubmitError::Rejected {
                url: record.url().to_string(),
                reason: "scripted rejection".to_string(),
            });
        }
        let id = record.id();
        self.pool.insert(id, record);
        self.signals.push(TransportSignal::Timer(Some(Duration::ZERO)));
        Ok(id)
    }

    fn remove(&mut self, handle: TransferId) -> Result<TransferRecord, EngineFault> {
        self.removed.push(handle);
        self.pool.remove(&handle).ok_or(EngineFault::Transport {
            context: "remove_handle",
            reason: format!("unknown handle {}", handle),
        })
    }

    fn socket_action(&mut self, socket: Socket, readiness: Readiness) -> Result<usize, EngineFault> {
        self.socket_actions.push((socket, readiness));
        self.running()
    }

    fn timeout_action(&mut self) -> Result<usize, EngineFault> {
        self.timeout_actions += 1;
        self.running()
    }

    fn take_signals(&mut self, out: &mut Vec<TransportSignal>) {
        out.append(&mut self.signals);
    }

    fn take_finished(&mut self) -> Vec<Finished> {
        std::mem::take(&mut self.finished)
    }
}

impl ScriptedTransport {
    fn running(&self) -> Result<usize, EngineFault> {
        if self.fail_actions {
            return Err(EngineFault::Transport {
                context: "socket_action",
                reason: "scripted failure".to_string(),
            });
        }
        let finished: HashSet<TransferId> = self.finished.iter().map(|f| f.id).collect();
        Ok(self.pool.keys().filter(|id| !finished.contains(id)).count())
    }
}

/// Reactor double that records registrations and the timer
#[derive(Default)]
pub(super) struct RecordingReactor {
    pub(super) registered: HashMap<Socket, (u64, Interest)>,
    next: u64,
    pub(super) registrations: usize,
    pub(super) deregistrations: usize,
    pub(super) timer: Option<Duration>,
    pub(super) arms: usize,
    pub(super) refuse: HashSet<Socket>,
}

impl Reactor for RecordingReactor {
    type Registration = (Socket, u64);

    fn register(&mut self, socket: Socket, interest: Interest) -> io::Result<(Socket, u64)> {
        if self.refuse.contains(&socket) {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        assert!(!interest.is_empty(), "registered an empty interest set");
        assert!(
            !self.registered.contains_key(&socket),
            "socket {} registered twice",
            socket
        );
        self.next += 1;
        self.registrations += 1;
        self.registered.insert(socket, (self.next, interest));
        Ok((socket, self.next))
    }

    fn deregister(&mut self, (socket, generation): (Socket, u64)) {
        let entry = self.registered.remove(&socket);
        assert_eq!(entry.map(|(g, _)| g), Some(generation), "stale deregistration");
        self.deregistrations += 1;
    }

    fn arm_timer(&mut self, after: Duration) {
        self.arms += 1;
        self.timer = Some(after);
    }

    fn disarm_timer(&mut self) {
        self.timer = None;
    }

    fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }
}

/// Sink double that keeps everything it receives
#[derive(Default)]
pub(super) struct RecordingSink {
    pub(super) records: Vec<Completion>,
    pub(super) refuse: bool,
    pub(super) calls: usize,
}

impl CompletionSink for RecordingSink {
    fn record(&mut self, completion: Completion) -> Result<(), SinkError> {
        self.calls += 1;
        if self.refuse {
            return Err(SinkError::Closed);
        }
        self.records.push(completion);
        Ok(())
    }
}

pub(super) type TestEngine = Engine<ScriptedTransport, RecordingReactor, RecordingSink>;

pub(super) fn engine() -> TestEngine {
    engine_with(Config::default())
}

pub(super) fn engine_with(config: Config) -> TestEngine {
    Engine::new(
        ScriptedTransport::default(),
        RecordingReactor::default(),
        RecordingSink::default(),
        &config,
    )
}

pub(super) fn urls(engine: &TestEngine) -> Vec<&str> {
    engine.sink().records.iter().map(|c| c.url.as_str()).collect()
}
