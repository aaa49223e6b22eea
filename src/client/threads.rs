//! The receiver and sender threads of a session
//!
//! The socket is read only by the receiver and written only by the sender.
//! Teardown is cooperative: whoever first raises the receive-close flag owns
//! it, and the sender is stopped through its queue's condition variable.

use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::session::{Session, SessionState, StopMode, lock};
use crate::comm::CommEvent;
use crate::error::Result;
use crate::event::Event;
use crate::transport;
use crate::types::EventType;

/// Start both threads; returns the receiver's handle
///
/// The sender's handle is parked in the session so either side can join it.
pub(crate) fn spawn(session: &Arc<Session>, stream: &TcpStream) -> Result<JoinHandle<()>> {
    let writer = stream.try_clone()?;
    let reader = stream.try_clone()?;

    let sender = {
        let session = Arc::clone(session);
        thread::Builder::new()
            .name("lash-sender".into())
            .spawn(move || send_loop(&session, writer))?
    };
    *lock(&session.sender) = Some(sender);

    let receiver = {
        let session = Arc::clone(session);
        thread::Builder::new()
            .name("lash-receiver".into())
            .spawn(move || recv_loop(&session, reader))
    };

    match receiver {
        Ok(handle) => Ok(handle),
        Err(e) => {
            session.stop_sender(StopMode::Abort);
            join_sender(session);
            Err(e.into())
        }
    }
}

fn recv_loop(session: &Session, mut stream: TcpStream) {
    tracing::debug!("receiver running");

    loop {
        let received = transport::recv_event(&mut stream);

        if session.recv_closing() {
            break;
        }

        match received {
            Ok(CommEvent::Event(event)) => {
                tracing::debug!(
                    event_type = ?event.event_type(),
                    string = event.string(),
                    "received event"
                );
                session.push_event(event);
            }
            Ok(CommEvent::Config(config)) => {
                tracing::debug!(
                    key = config.key(),
                    size = config.value_size(),
                    "received config"
                );
                session.push_config(config);
            }
            Ok(CommEvent::Ping) => {
                tracing::trace!("ping");
                session.enqueue(CommEvent::Pong);
            }
            Ok(CommEvent::ProtocolMismatch(protocol)) => {
                tracing::warn!(
                    server_protocol = %protocol,
                    client_protocol = %session.identity().protocol,
                    "protocol version mismatch"
                );
                lose_server(session);
                break;
            }
            Ok(CommEvent::Close) => {
                tracing::info!("server closed the session");
                lose_server(session);
                break;
            }
            Ok(other) => {
                tracing::warn!(kind = other.name(), "ignoring unexpected message");
            }
            Err(crate::Error::UnknownMessage(tag)) => {
                tracing::warn!(tag, "ignoring unknown message");
            }
            Err(e) => {
                if e.is_disconnect() {
                    tracing::info!(error = %e, "lost connection to server");
                } else {
                    tracing::warn!(error = %e, "receive failed");
                }
                lose_server(session);
                break;
            }
        }
    }

    tracing::debug!("receiver stopped");
}

/// Tear the session down from the receiver's side
///
/// Does nothing when the application already started closing.
fn lose_server(session: &Session) {
    if session.request_recv_close() {
        return;
    }

    session.set_state(SessionState::Closing);
    session.mark_disconnected();
    session.push_event(Event::new(EventType::ServerLost));

    session.stop_sender(StopMode::Abort);
    join_sender(session);
    session.shutdown_stream();

    session.set_state(SessionState::Closed);
}

fn send_loop(session: &Session, mut stream: TcpStream) {
    tracing::debug!("sender running");

    loop {
        let (batch, stop) = session.take_outgoing();

        if stop == Some(StopMode::Abort) {
            if !batch.is_empty() {
                tracing::debug!(dropped = batch.len(), "discarding unsent messages");
            }
            break;
        }

        for event in batch {
            if let Err(e) = transport::send_event(&mut stream, &event) {
                tracing::warn!(kind = event.name(), error = %e, "failed to send message");
            }
        }

        if stop == Some(StopMode::Drain) {
            break;
        }
    }

    tracing::debug!("sender stopped");
}

pub(crate) fn join_sender(session: &Session) {
    let handle = lock(&session.sender).take();
    if let Some(handle) = handle {
        if handle.join().is_err() {
            tracing::warn!("sender thread panicked");
        }
    }
}
