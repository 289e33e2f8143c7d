//! Wire protocol shared by the two halves of the UnrealScript debugger
//! bridge.
//!
//! The interface (a library loaded into the game process) and the adapter (the
//! out-of-process DAP executable) exchange length-prefixed binary frames over
//! a single TCP connection. Each frame body is one byte of message kind
//! followed by positional fields; [`Event`] flows interface → adapter and
//! [`Command`] flows adapter → interface.

mod codec;
mod command;
mod event;
mod queue;

pub use codec::{read_frame, write_frame, WireError, WireReader, WireWriter, MAX_FRAME_BYTES};
pub use command::Command;
pub use event::{Event, Watch};
pub use queue::SendQueue;

/// Default TCP port the interface listens on; the adapter connects here.
pub const DEFAULT_PORT: u16 = 10077;

/// Environment variable overriding [`DEFAULT_PORT`] on both endpoints.
pub const PORT_ENV_VAR: &str = "USCRIPT_DEBUGGER_PORT";

/// The port to use for the interface/adapter connection: the override from
/// the environment when set and parseable, [`DEFAULT_PORT`] otherwise.
pub fn default_port() -> u16 {
    std::env::var(PORT_ENV_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// The three watch lists Unreal maintains per break.
///
/// The raw `int` Unreal passes through the debugger API is the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// Variables scoped to the current stack frame.
    Local,
    /// Variables of the object owning the current frame.
    Global,
    /// Expressions registered by the debugger client.
    User,
}

/// Number of distinct watch kinds; sizes the per-kind state arrays.
pub const WATCH_KIND_COUNT: usize = 3;

impl WatchKind {
    pub fn from_raw(raw: i32) -> Option<WatchKind> {
        match raw {
            0 => Some(WatchKind::Local),
            1 => Some(WatchKind::Global),
            2 => Some(WatchKind::User),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            WatchKind::Local => 0,
            WatchKind::Global => 1,
            WatchKind::User => 2,
        }
    }

    pub fn index(self) -> usize {
        self.as_raw() as usize
    }
}
