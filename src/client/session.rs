//! State shared between a [`Client`](super::Client) and its two threads

use std::collections::VecDeque;
use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use crate::comm::CommEvent;
use crate::config::Config;
use crate::event::Event;
use crate::protocol::Protocol;
use crate::types::{ClientFlags, EventType};

/// Who a client is, as announced in its Connect message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub class: String,
    pub id: Uuid,
    pub working_dir: PathBuf,
    pub argv: Vec<String>,
    pub protocol: Protocol,
    pub flags: ClientFlags,
    pub project: Option<String>,
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How the sender should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopMode {
    /// Send what is queued, then exit
    Drain,
    /// The peer is gone; drop what is queued
    Abort,
}

#[derive(Default)]
pub(crate) struct Outgoing {
    pub queue: Vec<CommEvent>,
    pub stop: Option<StopMode>,
}

/// Lock a mutex, recovering the data if a thread panicked while holding it
///
/// Every guarded value here is a plain queue or flag, valid at any point.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Session {
    identity: ClientIdentity,
    server_name: String,

    /// Kept only to shut the connection down from any thread
    stream: TcpStream,

    state: Mutex<SessionState>,
    server_connected: AtomicBool,
    recv_close: AtomicBool,

    events: Mutex<VecDeque<Event>>,
    configs: Mutex<VecDeque<Config>>,

    outgoing: Mutex<Outgoing>,
    send_signal: Condvar,

    doorbell: Mutex<()>,
    doorbell_signal: Condvar,

    client_name: Mutex<Option<String>>,
    project_name: Mutex<Option<String>>,

    pub(crate) sender: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(identity: ClientIdentity, server_name: String, stream: TcpStream) -> Self {
        let project_name = identity.project.clone();
        Self {
            identity,
            server_name,
            stream,
            state: Mutex::new(SessionState::Connecting),
            server_connected: AtomicBool::new(false),
            recv_close: AtomicBool::new(false),
            events: Mutex::new(VecDeque::new()),
            configs: Mutex::new(VecDeque::new()),
            outgoing: Mutex::new(Outgoing::default()),
            send_signal: Condvar::new(),
            doorbell: Mutex::new(()),
            doorbell_signal: Condvar::new(),
            client_name: Mutex::new(None),
            project_name: Mutex::new(project_name),
            sender: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: SessionState) {
        {
            let mut current = lock(&self.state);
            if *current == state {
                return;
            }
            tracing::debug!(from = %*current, to = %state, "session state");
            *current = state;
        }
        // waiters check the state under the doorbell lock
        self.ring();
    }

    pub fn server_connected(&self) -> bool {
        self.server_connected.load(Ordering::SeqCst)
    }

    pub fn mark_connected(&self) {
        self.server_connected.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Connected);
    }

    /// Clear `server_connected`; returns whether it was set
    pub fn mark_disconnected(&self) -> bool {
        self.server_connected.swap(false, Ordering::SeqCst)
    }

    /// Request the receiver to stop; returns whether it had already been asked
    pub fn request_recv_close(&self) -> bool {
        self.recv_close.swap(true, Ordering::SeqCst)
    }

    pub fn recv_closing(&self) -> bool {
        self.recv_close.load(Ordering::SeqCst)
    }

    pub fn shutdown_stream(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // already shut down by the other side
            tracing::trace!(error = %e, "socket shutdown");
        }
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        if let Err(e) = self.stream.set_write_timeout(timeout) {
            tracing::warn!(error = %e, "could not set write timeout");
        }
    }

    pub fn push_event(&self, event: Event) {
        self.track_names(&event);
        lock(&self.events).push_back(event);
        self.ring();
    }

    pub fn push_config(&self, config: Config) {
        lock(&self.configs).push_back(config);
        self.ring();
    }

    pub fn pop_event(&self) -> Option<Event> {
        lock(&self.events).pop_front()
    }

    pub fn pop_config(&self) -> Option<Config> {
        lock(&self.configs).pop_front()
    }

    pub fn drain_configs(&self) -> Vec<Config> {
        lock(&self.configs).drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn pending_configs(&self) -> usize {
        lock(&self.configs).len()
    }

    pub fn client_name(&self) -> Option<String> {
        lock(&self.client_name).clone()
    }

    pub fn project_name(&self) -> Option<String> {
        lock(&self.project_name).clone()
    }

    fn track_names(&self, event: &Event) {
        match event.event_type() {
            EventType::ClientName => {
                *lock(&self.client_name) = event.string().map(ToOwned::to_owned);
            }
            EventType::ProjectName if !self.identity.flags.contains(ClientFlags::SERVER_INTERFACE) => {
                *lock(&self.project_name) = event.string().map(ToOwned::to_owned);
            }
            _ => {}
        }
    }

    /// Queue a comm-event for the sender thread
    ///
    /// Returns false once the sender has been told to stop.
    pub fn enqueue(&self, event: CommEvent) -> bool {
        let mut out = lock(&self.outgoing);
        if out.stop.is_some() {
            return false;
        }
        out.queue.push(event);
        drop(out);
        self.send_signal.notify_one();
        true
    }

    /// Tell the sender to stop after the current cycle
    pub fn stop_sender(&self, mode: StopMode) {
        let mut out = lock(&self.outgoing);
        // an abort overrides a pending drain, never the reverse
        if out.stop != Some(StopMode::Abort) {
            out.stop = Some(mode);
        }
        drop(out);
        self.send_signal.notify_all();
    }

    /// Block until comm-events are queued or a stop is requested
    ///
    /// Returns the whole queue and the stop request seen at the same time.
    pub fn take_outgoing(&self) -> (Vec<CommEvent>, Option<StopMode>) {
        let out = lock(&self.outgoing);
        let mut out = self
            .send_signal
            .wait_while(out, |out| out.queue.is_empty() && out.stop.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        let queue = std::mem::take(&mut out.queue);
        (queue, out.stop)
    }

    /// Wake anyone blocked in [`Session::wait`]
    pub fn ring(&self) {
        let _guard = lock(&self.doorbell);
        self.doorbell_signal.notify_all();
    }

    /// Block until an event or config is pending or the session is over
    pub fn wait(&self) {
        let guard = lock(&self.doorbell);
        let _guard = self
            .doorbell_signal
            .wait_while(guard, |_| {
                self.pending_events() == 0 && self.pending_configs() == 0 && !self.ended()
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn ended(&self) -> bool {
        matches!(self.state(), SessionState::Closing | SessionState::Closed)
    }
}
