//! Length-prefixed framing over a byte stream
//!
//! Wire format:
//! ```text
//! [4 bytes: payload length (u32 BE), not counting itself]
//! [payload bytes]
//! ```
//!
//! Also hosts the TCP connect helper and best-effort peer lookups used for
//! diagnostics.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::comm::{self, CommEvent};
use crate::error::{Error, Result};

/// Largest payload accepted from a peer (16MB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Registered LASH port, used when the services database has no `lash` entry
pub const DEFAULT_PORT: u16 = 14541;

/// Default service name
pub const DEFAULT_SERVICE: &str = "lash";

const LEN_PREFIX: usize = 4;

/// Send `payload` as one frame
///
/// Returns the number of bytes written, prefix included. Interrupted writes
/// are retried; a write of zero bytes means the peer is gone.
pub fn send_all<W: Write + ?Sized>(stream: &mut W, payload: &[u8]) -> Result<usize> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
            payload.len()
        )));
    }

    // length fits in u32, checked above
    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);

    let mut sent = 0;
    while sent < frame.len() {
        match stream.write(&frame[sent..]) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    stream.flush()?;

    Ok(sent)
}

/// Receive one frame and return its payload
///
/// End of stream before any byte of the length prefix is
/// [`Error::ConnectionClosed`]; end of stream anywhere later is an I/O error.
pub fn recv_all<R: Read + ?Sized>(stream: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; LEN_PREFIX];
    let mut got = 0;
    while got < LEN_PREFIX {
        match stream.read(&mut len_buf[got..]) {
            Ok(0) if got == 0 => return Err(Error::ConnectionClosed),
            Ok(0) => return Err(truncated("length prefix")),
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::malformed(format!(
            "frame length {len} exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }

    let mut payload = vec![0u8; len];
    let mut got = 0;
    while got < len {
        match stream.read(&mut payload[got..]) {
            Ok(0) => return Err(truncated("payload")),
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Ok(payload)
}

fn truncated(what: &str) -> Error {
    Error::Io(io::Error::new(
        ErrorKind::UnexpectedEof,
        format!("stream ended inside frame {what}"),
    ))
}

/// Encode and send one comm-event
pub fn send_event<W: Write + ?Sized>(stream: &mut W, event: &CommEvent) -> Result<usize> {
    let payload = comm::encode(event)?;
    tracing::trace!(kind = event.name(), len = payload.len(), "sending frame");
    send_all(stream, &payload)
}

/// Receive and decode one comm-event
pub fn recv_event<R: Read + ?Sized>(stream: &mut R) -> Result<CommEvent> {
    let payload = recv_all(stream)?;
    tracing::trace!(len = payload.len(), "received frame");
    comm::decode(&payload)
}

/// Connect to `host` on `service`
pub fn connect(host: &str, service: &str) -> Result<TcpStream> {
    connect_timeout(host, service, None)
}

/// Connect to `host` on `service`, bounding each attempt by `timeout`
///
/// Every resolved address is tried in order; the first that accepts wins.
pub fn connect_timeout(
    host: &str,
    service: &str,
    timeout: Option<Duration>,
) -> Result<TcpStream> {
    let port = resolve_service(service).ok_or_else(|| Error::ResolutionFailed {
        host: host.to_string(),
        service: service.to_string(),
        reason: "unknown service".to_string(),
    })?;

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::ResolutionFailed {
            host: host.to_string(),
            service: service.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(Error::ResolutionFailed {
            host: host.to_string(),
            service: service.to_string(),
            reason: "no addresses".to_string(),
        });
    }

    for addr in &addrs {
        tracing::debug!(%addr, host, service, "attempting connection");
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                tracing::debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connection attempt failed");
            }
        }
    }

    Err(Error::ConnectFailed {
        host: host.to_string(),
        service: service.to_string(),
    })
}

/// Map a service name or number to a TCP port
pub fn resolve_service(service: &str) -> Option<u16> {
    if let Ok(port) = service.parse::<u16>() {
        return Some(port);
    }

    if let Some(port) = lookup_service(service) {
        return Some(port);
    }

    (service == DEFAULT_SERVICE).then_some(DEFAULT_PORT)
}

#[cfg(unix)]
fn lookup_service(service: &str) -> Option<u16> {
    use std::ffi::CString;

    let name = CString::new(service).ok()?;
    // SAFETY: both arguments are valid NUL-terminated strings and the returned
    // entry is only read before any further netdb call on this thread.
    unsafe {
        let entry = libc::getservbyname(name.as_ptr(), c"tcp".as_ptr());
        if entry.is_null() {
            return None;
        }
        Some(u16::from_be((*entry).s_port as u16))
    }
}

#[cfg(not(unix))]
fn lookup_service(_service: &str) -> Option<u16> {
    None
}

/// Reverse-resolve the remote host of `stream`
///
/// Falls back to the numeric address when the name cannot be resolved;
/// returns `None` only when the peer address itself is unavailable.
#[cfg(unix)]
pub fn lookup_peer_name(stream: &TcpStream) -> Option<String> {
    use std::ffi::CStr;
    use std::os::fd::AsRawFd;

    const HOST_LEN: usize = 1025;

    // SAFETY: storage is large enough for any socket address and both calls
    // receive buffers sized by the lengths passed alongside them.
    unsafe {
        let mut storage: libc::sockaddr_storage = std::mem::zeroed();
        let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let addr = (&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr>();

        if libc::getpeername(stream.as_raw_fd(), addr, &mut len) != 0 {
            tracing::debug!(
                error = %io::Error::last_os_error(),
                "could not get peer address"
            );
            return None;
        }

        let mut host = [0 as libc::c_char; HOST_LEN];
        let rc = libc::getnameinfo(
            addr,
            len,
            host.as_mut_ptr(),
            HOST_LEN as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            0,
        );
        if rc != 0 {
            tracing::debug!(rc, "could not look up peer name");
            return None;
        }

        CStr::from_ptr(host.as_ptr())
            .to_str()
            .ok()
            .map(ToOwned::to_owned)
    }
}

#[cfg(not(unix))]
pub fn lookup_peer_name(stream: &TcpStream) -> Option<String> {
    stream.peer_addr().ok().map(|addr| addr.ip().to_string())
}

/// Remote port of `stream`
pub fn lookup_peer_port(stream: &TcpStream) -> Option<u16> {
    stream.peer_addr().ok().map(|addr| addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;

    /// Writer that accepts at most `chunk` bytes per call and fails every
    /// third call with `Interrupted`
    struct Choppy<T> {
        inner: T,
        chunk: usize,
        calls: usize,
    }

    impl<T> Choppy<T> {
        fn new(inner: T, chunk: usize) -> Self {
            Self {
                inner,
                chunk,
                calls: 0,
            }
        }

        fn interrupt(&mut self) -> bool {
            self.calls += 1;
            self.calls % 3 == 0
        }
    }

    impl<T: Write> Write for Choppy<T> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.interrupt() {
                return Err(ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(self.chunk);
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl<T: Read> Read for Choppy<T> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt() {
                return Err(ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_framing_with_partial_io() {
        for (len, chunk) in [(0, 1), (1, 1), (3, 2), (4096, 7), (1024 * 1024, 4093)] {
            let data = payload(len);

            let mut writer = Choppy::new(Vec::new(), chunk);
            let sent = send_all(&mut writer, &data).unwrap();
            assert_eq!(sent, len + 4);

            let mut reader = Choppy::new(Cursor::new(writer.inner), chunk);
            assert_eq!(recv_all(&mut reader).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn test_length_prefix_excludes_itself() {
        let mut out = Vec::new();
        send_all(&mut out, b"abc").unwrap();
        assert_eq!(out, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_eof_before_frame_is_connection_closed() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(matches!(recv_all(&mut empty), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_eof_inside_frame_is_io_error() {
        let mut partial_len = Cursor::new(vec![0u8, 0]);
        assert!(matches!(recv_all(&mut partial_len), Err(Error::Io(_))));

        let mut partial_body = Cursor::new(vec![0u8, 0, 0, 5, 1, 2]);
        assert!(matches!(recv_all(&mut partial_body), Err(Error::Io(_))));
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut huge = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        assert!(matches!(
            recv_all(&mut huge),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_zero_write_is_connection_closed() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        assert!(matches!(
            send_all(&mut Closed, b"x"),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_resolve_service() {
        assert_eq!(resolve_service("9999"), Some(9999));
        assert!(resolve_service("lash").is_some());
        assert_eq!(resolve_service("no-such-service-here"), None);
    }

    #[test]
    fn test_loopback_event() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            recv_event(&mut stream).unwrap()
        });

        let mut stream = connect("127.0.0.1", &port.to_string()).unwrap();
        assert_eq!(lookup_peer_port(&stream), Some(port));
        assert!(lookup_peer_name(&stream).is_some());
        send_event(&mut stream, &CommEvent::Ping).unwrap();

        assert_eq!(server.join().unwrap(), CommEvent::Ping);
    }

    #[test]
    fn test_connect_refused() {
        // bind then drop to find a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let result = connect_timeout("127.0.0.1", &port.to_string(), Some(Duration::from_secs(2)));
        assert!(matches!(result, Err(Error::ConnectFailed { .. })));
    }
}
