use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Client flags sent with the Connect handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientFlags(u32);

impl ClientFlags {
    pub const NONE: ClientFlags = ClientFlags(0);
    /// Wants to save data on the server
    pub const CONFIG_DATA_SET: ClientFlags = ClientFlags(0x0000_0001);
    /// Wants to save data in files
    pub const CONFIG_FILE: ClientFlags = ClientFlags(0x0000_0002);
    /// Is a server interface (controller)
    pub const SERVER_INTERFACE: ClientFlags = ClientFlags(0x0000_0004);
    /// The server shouldn't try to resume a lost client with this one
    pub const NO_AUTORESUME: ClientFlags = ClientFlags(0x0000_0008);
    /// Runs in a terminal
    pub const TERMINAL: ClientFlags = ClientFlags(0x0000_0010);
    /// Do not attempt to start a server automatically
    pub const NO_START_SERVER: ClientFlags = ClientFlags(0x0000_0020);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ClientFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ClientFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ClientFlags) {
        self.0 &= !other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ClientFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClientFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ClientFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ClientFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(ClientFlags, &str)] = &[
            (ClientFlags::CONFIG_DATA_SET, "config-data-set"),
            (ClientFlags::CONFIG_FILE, "config-file"),
            (ClientFlags::SERVER_INTERFACE, "server-interface"),
            (ClientFlags::NO_AUTORESUME, "no-autoresume"),
            (ClientFlags::TERMINAL, "terminal"),
            (ClientFlags::NO_START_SERVER, "no-start-server"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Type tag of an application-level [`Event`](crate::Event)
///
/// Numbers are stable on the wire. Numbers this crate doesn't know decode to
/// [`EventType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum EventType {
    #[default]
    Unknown = 0,

    // normal clients
    ClientName = 1,
    JackClientName = 2,
    AlsaClientId = 3,
    SaveFile = 4,
    RestoreFile = 5,
    SaveDataSet = 6,
    RestoreDataSet = 7,
    Save = 8,
    Quit = 9,
    ServerLost = 10,

    // server interface
    ProjectAdd = 11,
    ProjectRemove = 12,
    ProjectDir = 13,
    ProjectName = 14,
    ClientAdd = 15,
    ClientRemove = 16,
    Percentage = 17,
}

impl EventType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::ClientName,
            2 => Self::JackClientName,
            3 => Self::AlsaClientId,
            4 => Self::SaveFile,
            5 => Self::RestoreFile,
            6 => Self::SaveDataSet,
            7 => Self::RestoreDataSet,
            8 => Self::Save,
            9 => Self::Quit,
            10 => Self::ServerLost,
            11 => Self::ProjectAdd,
            12 => Self::ProjectRemove,
            13 => Self::ProjectDir,
            14 => Self::ProjectName,
            15 => Self::ClientAdd,
            16 => Self::ClientRemove,
            17 => Self::Percentage,
            _ => Self::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Events addressed to server-interface (controller) clients
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Self::ProjectAdd
                | Self::ProjectRemove
                | Self::ProjectDir
                | Self::ProjectName
                | Self::ClientAdd
                | Self::ClientRemove
                | Self::Percentage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_numbers() {
        for n in 0..=17 {
            assert_eq!(EventType::from_u32(n).as_u32(), n);
        }
        assert_eq!(EventType::from_u32(18), EventType::Unknown);
        assert_eq!(EventType::from_u32(u32::MAX), EventType::Unknown);
    }

    #[test]
    fn test_flags() {
        let mut flags = ClientFlags::CONFIG_DATA_SET | ClientFlags::TERMINAL;
        assert!(flags.contains(ClientFlags::TERMINAL));
        assert!(!flags.contains(ClientFlags::CONFIG_FILE));
        assert_eq!(flags.bits(), 0x11);
        flags.remove(ClientFlags::TERMINAL);
        assert_eq!(flags, ClientFlags::CONFIG_DATA_SET);
        assert_eq!(flags.to_string(), "config-data-set");
        assert_eq!(ClientFlags::NONE.to_string(), "none");
    }
}
