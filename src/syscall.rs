/*!
 * System Call Module
 * Process-lifecycle system calls with "value, or -1 and errno" returns
 */

use crate::core::errors::{Errno, ProcessError};
use crate::core::types::{Pid, RawStatus};
use crate::monitoring::SyscallSpan;
use crate::process::{ExitStatus, ProcessContext, Terminated};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// System call result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallResult {
    /// Return value; `-1` on failure
    pub retval: i32,
    /// Set iff the call failed
    pub errno: Option<Errno>,
}

impl SyscallResult {
    #[inline]
    pub fn ok(retval: i32) -> Self {
        Self {
            retval,
            errno: None,
        }
    }

    #[inline]
    pub fn err(errno: Errno) -> Self {
        Self {
            retval: -1,
            errno: Some(errno),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.errno.is_none()
    }

    fn from_pid(span: &SyscallSpan, result: Result<Pid, ProcessError>) -> Self {
        match result.map(|pid| pid as i32) {
            Ok(pid) => {
                span.record_return(pid);
                Self::ok(pid)
            }
            Err(e) => {
                let errno = e.errno();
                span.record_errno(errno.code());
                debug!(error = %e, "syscall failed");
                Self::err(errno)
            }
        }
    }
}

/// `fork()`: the parent gets the child's pid, the child runs `entry`
pub fn sys_fork<F>(ctx: &ProcessContext, entry: F) -> SyscallResult
where
    F: FnOnce(ProcessContext) -> Terminated + Send + 'static,
{
    let span = SyscallSpan::new("fork", ctx.pid());
    let _entered = span.enter();
    SyscallResult::from_pid(&span, ctx.fork(entry))
}

/// `getpid()`; never fails
pub fn sys_getpid(ctx: &ProcessContext) -> SyscallResult {
    let span = SyscallSpan::new("getpid", ctx.pid());
    let _entered = span.enter();
    SyscallResult::from_pid(&span, Ok(ctx.pid()))
}

/// `waitpid(pid, status, options)`
///
/// `status` is written only on success. `None` skips the copy-out.
pub fn sys_waitpid(
    ctx: &ProcessContext,
    pid: i32,
    status: Option<&mut RawStatus>,
    options: i32,
) -> SyscallResult {
    let span = SyscallSpan::new("waitpid", ctx.pid());
    let _entered = span.enter();
    SyscallResult::from_pid(&span, ctx.waitpid(i64::from(pid), status, options))
}

/// `_exit(code)`; consumes the calling context
pub fn sys_exit(ctx: ProcessContext, code: i32) -> Terminated {
    let span = SyscallSpan::new("_exit", ctx.pid());
    let _entered = span.enter();
    span.record_return(0);
    ctx.exit(ExitStatus::Exited(code))
}
