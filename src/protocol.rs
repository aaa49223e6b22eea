//! Application-level protocol versions
//!
//! A version is packed into 32 bits as `(major << 16) | minor`. A client and a
//! daemon can talk iff the majors are equal and the daemon's minor is at least
//! the client's.

use std::fmt;

const MAJOR_MASK: u32 = 0xFFFF_0000;
const MINOR_MASK: u32 = 0x0000_FFFF;

/// Packed LASH protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protocol(u32);

impl Protocol {
    /// The protocol version spoken by this crate
    pub const CURRENT: Protocol = Protocol::new(2, 0);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u16 {
        ((self.0 & MAJOR_MASK) >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        (self.0 & MINOR_MASK) as u16
    }

    /// Whether a daemon speaking `daemon` can serve a client requesting `self`
    pub fn is_served_by(self, daemon: Protocol) -> bool {
        self.major() == daemon.major() && daemon.minor() >= self.minor()
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl From<u32> for Protocol {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let p = Protocol::new(2, 7);
        assert_eq!(p.raw(), 0x0002_0007);
        assert_eq!(p.major(), 2);
        assert_eq!(p.minor(), 7);
        assert_eq!(p.to_string(), "2.7");
    }

    #[test]
    fn test_compatibility() {
        let client = Protocol::new(2, 1);
        assert!(client.is_served_by(Protocol::new(2, 1)));
        assert!(client.is_served_by(Protocol::new(2, 4)));
        assert!(!client.is_served_by(Protocol::new(2, 0)));
        assert!(!client.is_served_by(Protocol::new(1, 9)));
        assert!(!client.is_served_by(Protocol::new(3, 1)));
    }
}
