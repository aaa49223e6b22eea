//! Client side of a LASH session
//!
//! A [`Client`] owns a TCP connection to the session daemon and two
//! background threads. The receiver fills the event and config mailboxes;
//! the sender drains the outgoing queue. The application polls the
//! mailboxes with [`Client::get_event`] and [`Client::get_config`] or uses
//! the callback layer ([`Client::open`], [`Client::dispatch`]).
//!
//! When the daemon goes away the client never fails loudly: exactly one
//! [`EventType::ServerLost`] event lands in the mailbox and
//! [`Client::server_connected`] turns false for good.

mod dispatch;
mod session;
mod threads;

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use uuid::Uuid;

use crate::args::Args;
use crate::comm::{CommEvent, ConnectParams};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::options::ClientOptions;
use crate::protocol::Protocol;
use crate::transport;
use crate::types::{ClientFlags, EventType};

use self::dispatch::Callbacks;
use self::session::{Session, StopMode, lock};

pub use self::dispatch::ConfigWriter;
pub use self::session::{ClientIdentity, SessionState};

/// Connection to a LASH session daemon
pub struct Client {
    session: Arc<Session>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    callbacks: Mutex<Callbacks>,
}

impl Client {
    /// Connect to the daemon, or return `None` with LASH support disabled
    ///
    /// Failures are logged; the application is expected to carry on without
    /// session management.
    pub fn init(args: &Args, class: &str, flags: ClientFlags, protocol: Protocol) -> Option<Client> {
        match Self::try_init(args, class, flags, protocol, &ClientOptions::from_env()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, class, "could not connect to LASH server, disabling LASH");
                None
            }
        }
    }

    /// Connect to the daemon
    ///
    /// The session counts as connected as soon as the Connect message has
    /// been written; a protocol rejection from the daemon arrives later as a
    /// [`EventType::ServerLost`] event.
    pub fn try_init(
        args: &Args,
        class: &str,
        flags: ClientFlags,
        protocol: Protocol,
        options: &ClientOptions,
    ) -> Result<Client> {
        if class.is_empty() {
            return Err(Error::InvalidArgument("client class must not be empty".to_string()));
        }

        let identity = ClientIdentity {
            class: class.to_string(),
            id: args.id.unwrap_or_else(Uuid::new_v4),
            working_dir: working_dir(),
            argv: args.argv.clone(),
            protocol,
            flags: flags | args.flags,
            project: args.project.clone(),
        };

        let (host, service) = options.target(args.server.as_deref());
        let mut stream = transport::connect_timeout(&host, &service, options.connect_timeout)?;
        let server_name = transport::lookup_peer_name(&stream).unwrap_or_else(|| host.clone());

        let connect = CommEvent::Connect(ConnectParams {
            protocol_version: identity.protocol,
            flags: identity.flags,
            project: identity.project.clone(),
            working_dir: identity.working_dir.to_string_lossy().into_owned(),
            class: identity.class.clone(),
            id: identity.id,
            argv: identity.argv.clone(),
        });

        let session = Arc::new(Session::new(identity, server_name, stream.try_clone()?));
        transport::send_event(&mut stream, &connect)?;
        session.set_write_timeout(options.write_timeout);
        session.mark_connected();

        let receiver = match threads::spawn(&session, &stream) {
            Ok(handle) => handle,
            Err(e) => {
                session.mark_disconnected();
                session.shutdown_stream();
                return Err(e);
            }
        };

        tracing::info!(
            server = session.server_name(),
            class,
            id = %session.identity().id,
            flags = %session.identity().flags,
            "connected to LASH server"
        );

        Ok(Client {
            session,
            receiver: Mutex::new(Some(receiver)),
            callbacks: Mutex::new(Callbacks::default()),
        })
    }

    /// Pop the oldest pending event, if any
    pub fn get_event(&self) -> Option<Event> {
        self.session.pop_event()
    }

    /// Pop the oldest pending config, if any
    pub fn get_config(&self) -> Option<Config> {
        self.session.pop_config()
    }

    pub fn pending_event_count(&self) -> usize {
        self.session.pending_events()
    }

    pub fn pending_config_count(&self) -> usize {
        self.session.pending_configs()
    }

    /// Queue an event for the daemon
    ///
    /// Dropped silently when the session is not connected.
    pub fn send_event(&self, event: Event) {
        self.send(CommEvent::Event(event));
    }

    /// Queue a config for the daemon
    ///
    /// Dropped silently when the session is not connected.
    pub fn send_config(&self, config: Config) {
        self.send(CommEvent::Config(config));
    }

    fn send(&self, message: CommEvent) {
        if !self.session.server_connected() || !self.session.enqueue(message) {
            tracing::debug!("not connected, dropping outgoing message");
        }
    }

    pub fn server_connected(&self) -> bool {
        self.session.server_connected()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Host name of the daemon, reverse-resolved when possible
    pub fn server_name(&self) -> &str {
        self.session.server_name()
    }

    pub fn identity(&self) -> &ClientIdentity {
        self.session.identity()
    }

    /// Name the daemon gave this client, once announced
    pub fn client_name(&self) -> Option<String> {
        self.session.client_name()
    }

    /// Project this client currently belongs to
    pub fn project_name(&self) -> Option<String> {
        self.session.project_name()
    }

    /// Tell the daemon which JACK client name this program uses
    pub fn jack_client_name(&self, name: &str) {
        self.send_event(Event::with_string(EventType::JackClientName, name));
    }

    /// Tell the daemon which ALSA sequencer client id this program uses
    pub fn alsa_client_id(&self, id: u8) {
        self.send_event(Event::with_string(EventType::AlsaClientId, id.to_string()));
    }

    /// Report save or restore progress (0 to 100)
    pub fn notify_progress(&self, percentage: u8) {
        let percentage = percentage.min(100);
        self.send_event(Event::with_string(
            EventType::Percentage,
            percentage.to_string(),
        ));
    }

    /// End the session
    ///
    /// Queued messages are flushed, followed by a Close message, before the
    /// connection is shut down. No [`EventType::ServerLost`] is produced.
    /// Calling it again, or after the daemon went away, only joins threads.
    pub fn close(&self) {
        let Some(receiver) = lock(&self.receiver).take() else {
            return;
        };

        let session = &self.session;
        if !session.request_recv_close() {
            session.set_state(SessionState::Closing);
            session.mark_disconnected();
            session.enqueue(CommEvent::Close);
            session.stop_sender(StopMode::Drain);
            threads::join_sender(session);
            session.shutdown_stream();
            tracing::info!(server = session.server_name(), "session closed");
        }

        if receiver.join().is_err() {
            tracing::warn!("receiver thread panicked");
        }
        session.set_state(SessionState::Closed);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("identity", self.identity())
            .field("server", &self.server_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Working directory announced to the daemon
fn working_dir() -> PathBuf {
    env::current_dir()
        .ok()
        .or_else(|| env::var_os("PWD").map(PathBuf::from))
        .or_else(|| env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_default()
}
