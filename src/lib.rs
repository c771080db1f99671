/*!
 * Process Lifecycle Kernel Library
 * Pid allocation, reference-counted control blocks, fork, exit and wait
 */

pub mod core;
pub mod monitoring;
pub mod process;
pub mod syscall;

// Re-exports
pub use crate::core::config::{ConfigError, ProcessTableConfig};
pub use crate::core::errors::{Errno, HostOp, ProcessError, ProcessResult};
pub use crate::core::types::{Pid, RawStatus, TaskHandle, KERNEL_PID};
pub use process::{
    ExitPath, ExitStatus, KernelContext, ProcessContext, ProcessInfo, ProcessState, ProcessTable,
    TableStats, TaskHost, Terminated, ThreadHost, WaitStatus,
};
pub use syscall::{sys_exit, sys_fork, sys_getpid, sys_waitpid, SyscallResult};
