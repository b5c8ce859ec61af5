// command.rs - remote command definitions for the collector protocol
//
// Every frame exchanged between a client endpoint and a provider carries one
// of these command numbers in its header. Responses echo the command of the
// request they answer, so a client can reject a mismatched reply before it
// touches the payload.
//
// ============================================================================
// COMMANDS
// ============================================================================
//
//   FETCH (0) - copy the most recent window of a metric's samples into a
//               destination sized by the caller
//   LIST  (1) - enumerate up to `max_ids` metric ids known to the provider
//
// Command numbers are part of the wire format. New commands get new numbers;
// existing numbers are never reused.

/// Magic byte identifying collector frames ('M').
pub const FRAME_MAGIC: u8 = b'M';

/// Fetch the most recent samples of one metric.
pub const CMD_FETCH: u8 = 0;

/// List metric ids held by a provider.
pub const CMD_LIST: u8 = 1;

/// Remote commands understood by a provider.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Fetch a bounded window of samples.
    Fetch = CMD_FETCH,

    /// Enumerate metric ids.
    List = CMD_LIST,
}

impl Command {
    /// Convert command to u8 number
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to create command from u8 number
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_FETCH => Some(Self::Fetch),
            CMD_LIST => Some(Self::List),
            _ => None,
        }
    }

    /// Get human-readable command name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fetch => "FETCH",
            Self::List => "LIST",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
