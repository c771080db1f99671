/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::Pid;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Kernel error numbers surfaced through the syscall layer
///
/// Numeric values are part of the user-visible ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Errno {
    /// Out of memory
    ENOMEM = 3,
    /// Bad memory reference
    EFAULT = 6,
    /// Invalid argument
    EINVAL = 8,
    /// Too many processes in system
    ENPROC = 12,
    /// No such process
    ESRCH = 15,
    /// No child processes
    ECHILD = 16,
}

impl Errno {
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            3 => Some(Self::ENOMEM),
            6 => Some(Self::EFAULT),
            8 => Some(Self::EINVAL),
            12 => Some(Self::ENPROC),
            15 => Some(Self::ESRCH),
            16 => Some(Self::ECHILD),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ENOMEM => "ENOMEM",
            Self::EFAULT => "EFAULT",
            Self::EINVAL => "EINVAL",
            Self::ENPROC => "ENPROC",
            Self::ESRCH => "ESRCH",
            Self::ECHILD => "ECHILD",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Host collaborator operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOp {
    CreateTask,
    CloneAddressSpace,
    CloneFdTable,
    Spawn,
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateTask => "create task",
            Self::CloneAddressSpace => "clone address space",
            Self::CloneFdTable => "clone fd table",
            Self::Spawn => "spawn thread",
        };
        f.write_str(name)
    }
}

/// Process-lifecycle errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Pid space exhausted: all {capacity} slots in use")]
    #[diagnostic(
        code(process::pid_exhausted),
        help("Reap exited children with waitpid to free pid slots.")
    )]
    PidExhausted { capacity: usize },

    #[error("No such process: {0}")]
    #[diagnostic(
        code(process::no_such_process),
        help("The process may have been reaped or never existed. Check PID validity.")
    )]
    NoSuchProcess(i64),

    #[error("Process {pid} is not a child of {caller}")]
    #[diagnostic(
        code(process::not_child),
        help("Only the direct parent may wait for a process.")
    )]
    NotChild { pid: Pid, caller: Pid },

    #[error("Process {0} already has a waiter")]
    #[diagnostic(
        code(process::already_waited),
        help("A process can be waited for by a single caller at a time.")
    )]
    AlreadyWaited(Pid),

    #[error("Unsupported wait options: {0:#x}")]
    #[diagnostic(code(process::invalid_options), help("waitpid supports options == 0 only."))]
    InvalidOptions(i32),

    #[error("Host failed to {op}: {errno}")]
    #[diagnostic(
        code(process::host_failure),
        help("A collaborator refused the request. The fork was unwound.")
    )]
    Host { op: HostOp, errno: Errno },

    #[error("Invalid process table configuration: {0}")]
    #[diagnostic(code(process::invalid_config))]
    InvalidConfig(String),

    #[error("Process table is shut down")]
    #[diagnostic(code(process::shut_down))]
    ShutDown,
}

impl ProcessError {
    /// Error number reported to the syscall layer
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::PidExhausted { .. } => Errno::ENPROC,
            Self::NoSuchProcess(_) => Errno::ESRCH,
            Self::NotChild { .. } | Self::AlreadyWaited(_) => Errno::ECHILD,
            Self::InvalidOptions(_) | Self::InvalidConfig(_) | Self::ShutDown => Errno::EINVAL,
            Self::Host { errno, .. } => *errno,
        }
    }

    #[inline]
    pub(crate) const fn host(op: HostOp, errno: Errno) -> Self {
        Self::Host { op, errno }
    }
}

impl From<ProcessError> for Errno {
    fn from(err: ProcessError) -> Self {
        err.errno()
    }
}
