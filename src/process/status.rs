/*!
 * Exit Status Encoding
 *
 * Wait-status words as produced by `exit` and consumed by `waitpid`.
 * The low two bits carry how the process ended, the rest carries the
 * exit code or signal number.
 */

use crate::core::types::RawStatus;
use serde::{Deserialize, Serialize};

const KIND_BITS: u32 = 2;
const KIND_MASK: RawStatus = (1 << KIND_BITS) - 1;

const KIND_EXITED: RawStatus = 0;
const KIND_SIGNALED: RawStatus = 1;
const KIND_CORED: RawStatus = 2;
const KIND_STOPPED: RawStatus = 3;

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExitStatus {
    /// Normal `_exit(code)`
    Exited(i32),
    /// Killed by a signal
    Signaled(i32),
    /// Killed by a signal, core dumped
    Cored(i32),
}

impl ExitStatus {
    /// Encode into a raw wait status
    #[inline]
    #[must_use]
    pub const fn encode(self) -> RawStatus {
        match self {
            Self::Exited(code) => (code << KIND_BITS) | KIND_EXITED,
            Self::Signaled(sig) => (sig << KIND_BITS) | KIND_SIGNALED,
            Self::Cored(sig) => (sig << KIND_BITS) | KIND_CORED,
        }
    }

    /// Decode a raw wait status; `None` for stopped processes
    #[must_use]
    pub const fn decode(raw: RawStatus) -> Option<Self> {
        let value = raw >> KIND_BITS;
        match raw & KIND_MASK {
            KIND_EXITED => Some(Self::Exited(value)),
            KIND_SIGNALED => Some(Self::Signaled(value)),
            KIND_CORED => Some(Self::Cored(value)),
            _ => None,
        }
    }
}

impl From<ExitStatus> for RawStatus {
    fn from(status: ExitStatus) -> Self {
        status.encode()
    }
}

/// Predicates over a raw wait status, in the style of `<sys/wait.h>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitStatus(pub RawStatus);

impl WaitStatus {
    #[inline]
    #[must_use]
    pub const fn exited(self) -> bool {
        self.0 & KIND_MASK == KIND_EXITED
    }

    #[inline]
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        self.0 >> KIND_BITS
    }

    #[inline]
    #[must_use]
    pub const fn signaled(self) -> bool {
        matches!(self.0 & KIND_MASK, KIND_SIGNALED | KIND_CORED)
    }

    #[inline]
    #[must_use]
    pub const fn term_signal(self) -> i32 {
        self.0 >> KIND_BITS
    }

    #[inline]
    #[must_use]
    pub const fn core_dumped(self) -> bool {
        self.0 & KIND_MASK == KIND_CORED
    }

    #[inline]
    #[must_use]
    pub const fn stopped(self) -> bool {
        self.0 & KIND_MASK == KIND_STOPPED
    }

    #[inline]
    #[must_use]
    pub const fn decode(self) -> Option<ExitStatus> {
        ExitStatus::decode(self.0)
    }
}

impl From<ExitStatus> for WaitStatus {
    fn from(status: ExitStatus) -> Self {
        Self(status.encode())
    }
}
