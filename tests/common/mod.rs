//! In-process mock daemon shared by the integration tests

#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use lash::comm::{self, CommEvent, ConnectParams};
use lash::{Args, Client, ClientFlags, Protocol, transport};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockDaemon {
    listener: TcpListener,
}

impl MockDaemon {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Args pointing a client at this daemon
    pub fn args(&self) -> Args {
        Args {
            server: Some(format!("127.0.0.1:{}", self.port())),
            argv: vec!["testapp".to_string(), "--verbose".to_string()],
            ..Args::default()
        }
    }

    /// Accept one client and read its Connect message
    pub fn accept(&self) -> (Peer, ConnectParams) {
        let (stream, _) = self.listener.accept().unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        let mut peer = Peer { stream };
        match peer.recv() {
            CommEvent::Connect(params) => (peer, params),
            other => panic!("expected connect, got {other:?}"),
        }
    }

    /// Connect a client with `flags` and accept it
    pub fn connect(&self, flags: ClientFlags) -> (Client, Peer) {
        let client = Client::init(&self.args(), "TestApp", flags, Protocol::CURRENT)
            .expect("client should connect");
        let (peer, _) = self.accept();
        (client, peer)
    }
}

/// Daemon side of one client connection
pub struct Peer {
    pub stream: TcpStream,
}

impl Peer {
    pub fn send(&mut self, event: &CommEvent) {
        transport::send_event(&mut self.stream, event).unwrap();
    }

    pub fn send_raw(&mut self, payload: &[u8]) {
        transport::send_all(&mut self.stream, payload).unwrap();
    }

    pub fn recv(&mut self) -> CommEvent {
        transport::recv_event(&mut self.stream).unwrap()
    }

    pub fn recv_raw(&mut self) -> Vec<u8> {
        transport::recv_all(&mut self.stream).unwrap()
    }

    /// Next message that is not a Pong
    pub fn recv_skipping_pongs(&mut self) -> CommEvent {
        loop {
            let payload = self.recv_raw();
            match comm::decode(&payload).unwrap() {
                CommEvent::Pong => continue,
                other => return other,
            }
        }
    }
}

/// Poll `condition` until it holds or the timeout passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
