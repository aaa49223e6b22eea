//! Byte layout of each [`CommEvent`]
//!
//! ```text
//! Connect:  tag, magic, protocol, flags, project\0, working_dir\0, class\0,
//!           uuid[37], argc, argv\0...
//! Event:    tag, type, uuid[37], string\0, project\0
//! Config:   tag, key\0, [value_len, value bytes]
//! Mismatch: tag, protocol
//! Exec:     tag, flags, argc, uuid[37], working_dir\0, server\0, project\0,
//!           argv\0...
//! Close / Ping / Pong: tag
//! ```
//!
//! Integers are u32 big-endian. A uuid is its 36 character hyphenated form
//! followed by a NUL. Absent optional strings are a single NUL.

use std::path::PathBuf;

use uuid::Uuid;

use super::{COMM_PROTOCOL_VERSION, CommEvent, ConnectParams, ExecParams, tag};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::protocol::Protocol;
use crate::types::{ClientFlags, EventType};

const UUID_FIELD_LEN: usize = 37;
const UUID_TEXT_LEN: usize = 36;

/// Serialize a comm-event into a message body (without the length prefix)
pub fn encode(event: &CommEvent) -> Result<Vec<u8>> {
    let mut w = Writer::default();
    w.u32(event.tag());

    match event {
        CommEvent::Connect(params) => {
            w.u32(COMM_PROTOCOL_VERSION);
            w.u32(params.protocol_version.raw());
            w.u32(params.flags.bits());
            w.opt_str(params.project.as_deref(), "project")?;
            w.str(&params.working_dir, "working_dir")?;
            w.str(&params.class, "class")?;
            w.uuid(params.id);
            w.len(params.argv.len(), "argc")?;
            for arg in &params.argv {
                w.str(arg, "argv")?;
            }
        }
        CommEvent::Event(event) => {
            w.u32(event.event_type().as_u32());
            w.uuid(event.client_id());
            w.opt_str(event.string(), "string")?;
            w.opt_str(event.project(), "project")?;
        }
        CommEvent::Config(config) => {
            w.str(config.key(), "key")?;
            if let Some(value) = config.value() {
                w.len(value.len(), "value length")?;
                w.bytes(value);
            }
        }
        CommEvent::ProtocolMismatch(protocol) => {
            w.u32(protocol.raw());
        }
        CommEvent::Exec(params) => {
            w.u32(params.flags.bits());
            w.len(params.argv.len(), "argc")?;
            w.uuid(params.id);
            let working_dir = params.working_dir.to_str().ok_or_else(|| {
                Error::malformed("working_dir is not valid UTF-8")
            })?;
            w.str(working_dir, "working_dir")?;
            w.str(&params.server, "server")?;
            w.str(&params.project, "project")?;
            for arg in &params.argv {
                w.str(arg, "argv")?;
            }
        }
        CommEvent::Close | CommEvent::Ping | CommEvent::Pong => {}
    }

    Ok(w.buf)
}

/// Parse a message body (without the length prefix) into a comm-event
///
/// Every field read is bounds-checked; a short or inconsistent buffer yields
/// [`Error::MalformedMessage`]. A Connect whose handshake magic differs from
/// [`COMM_PROTOCOL_VERSION`] yields [`Error::TransportVersionMismatch`].
pub fn decode(buf: &[u8]) -> Result<CommEvent> {
    let mut r = Reader::new(buf);
    let tag = r.u32("tag")?;

    let event = match tag {
        tag::CONNECT => CommEvent::Connect(decode_connect(&mut r)?),
        tag::EVENT => CommEvent::Event(decode_event(&mut r)?),
        tag::CONFIG => CommEvent::Config(decode_config(&mut r)?),
        tag::PROTOCOL_MISMATCH => {
            CommEvent::ProtocolMismatch(Protocol::from_raw(r.u32("protocol")?))
        }
        tag::EXEC => CommEvent::Exec(decode_exec(&mut r)?),
        tag::CLOSE => CommEvent::Close,
        tag::PING => CommEvent::Ping,
        tag::PONG => CommEvent::Pong,
        other => return Err(Error::UnknownMessage(other)),
    };

    Ok(event)
}

fn decode_connect(r: &mut Reader<'_>) -> Result<ConnectParams> {
    let magic = r.u32("transport version")?;
    if magic != COMM_PROTOCOL_VERSION {
        return Err(Error::TransportVersionMismatch {
            expected: COMM_PROTOCOL_VERSION,
            found: magic,
        });
    }

    let protocol_version = Protocol::from_raw(r.u32("protocol")?);
    let flags = ClientFlags::from_bits(r.u32("flags")?);
    let project = non_empty(r.cstr("project")?);
    let working_dir = r.cstr("working_dir")?;
    let class = r.cstr("class")?;
    let id = r.uuid()?;
    let argv = r.argv("argv")?;

    Ok(ConnectParams {
        protocol_version,
        flags,
        project,
        working_dir,
        class,
        id,
        argv,
    })
}

fn decode_event(r: &mut Reader<'_>) -> Result<Event> {
    let mut event = Event::new(EventType::from_u32(r.u32("event type")?));
    event.set_client_id(r.uuid()?);
    event.set_string(non_empty(r.cstr("string")?));

    // last field; older peers may omit its terminator
    if r.remaining() > 0 {
        event.set_project(non_empty(r.trailing_str("project")?));
    }

    Ok(event)
}

fn decode_config(r: &mut Reader<'_>) -> Result<Config> {
    let key = r.cstr("key")?;
    if r.remaining() == 0 {
        return Ok(Config::new(key));
    }

    let len = r.u32("value length")? as usize;
    let value = r.bytes(len, "value")?;
    Ok(Config::with_value(key, value))
}

fn decode_exec(r: &mut Reader<'_>) -> Result<ExecParams> {
    let flags = ClientFlags::from_bits(r.u32("flags")?);
    let argc = r.u32("argc")? as usize;
    let id = r.uuid()?;
    let working_dir = PathBuf::from(r.cstr("working_dir")?);
    let server = r.cstr("server")?;
    let project = r.cstr("project")?;
    let argv = r.strings(argc, "argv")?;

    Ok(ExecParams {
        flags,
        id,
        working_dir,
        server,
        project,
        argv,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn len(&mut self, len: usize, field: &str) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| Error::malformed(format!("{field} does not fit in 32 bits")))?;
        self.u32(len);
        Ok(())
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn str(&mut self, s: &str, field: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(Error::malformed(format!("{field} contains a NUL byte")));
        }
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    fn opt_str(&mut self, s: Option<&str>, field: &str) -> Result<()> {
        self.str(s.unwrap_or(""), field)
    }

    fn uuid(&mut self, id: Uuid) {
        let mut text = [0u8; uuid::fmt::Hyphenated::LENGTH];
        id.hyphenated().encode_lower(&mut text);
        self.buf.extend_from_slice(&text);
        self.buf.push(0);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::malformed(format!(
                "truncated {field}: need {len} bytes, {} left",
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        let bytes = self.bytes(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn cstr(&mut self, field: &str) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::malformed(format!("unterminated {field}")))?;
        let s = utf8(&rest[..end], field)?;
        self.pos += end + 1;
        Ok(s)
    }

    /// Read a final string whose NUL terminator may be missing
    fn trailing_str(&mut self, field: &str) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = utf8(&rest[..end], field)?;
        self.pos = (self.pos + end + 1).min(self.buf.len());
        Ok(s)
    }

    fn uuid(&mut self) -> Result<Uuid> {
        let field = self.bytes(UUID_FIELD_LEN, "uuid")?;
        let text = std::str::from_utf8(&field[..UUID_TEXT_LEN])
            .map_err(|_| Error::malformed("uuid is not valid UTF-8"))?;
        Uuid::parse_str(text).map_err(|e| Error::malformed(format!("invalid uuid '{text}': {e}")))
    }

    fn argv(&mut self, field: &str) -> Result<Vec<String>> {
        let argc = self.u32("argc")? as usize;
        self.strings(argc, field)
    }

    fn strings(&mut self, count: usize, field: &str) -> Result<Vec<String>> {
        // each entry takes at least its terminator
        if count > self.remaining() {
            return Err(Error::malformed(format!(
                "{field} count {count} exceeds message size"
            )));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.cstr(field)?);
        }
        Ok(out)
    }
}

fn utf8(bytes: &[u8], field: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::malformed(format!("{field} is not valid UTF-8: {e}")))
}
