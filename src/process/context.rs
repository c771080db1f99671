/*!
 * Execution Contexts
 *
 * Handles through which running code calls back into the process table.
 * A forked child receives a [`ProcessContext`] and must hand back the
 * [`Terminated`] token produced by [`ProcessContext::exit`]; the kernel's own
 * thread uses a [`KernelContext`], which can fork and wait but never exits.
 */

use super::status::ExitStatus;
use super::table::ProcessTable;
use super::wait::ExitPath;
use crate::core::errors::ProcessResult;
use crate::core::types::{Pid, RawStatus, KERNEL_PID};
use std::sync::Arc;

/// Proof that a process ran its exit protocol
#[must_use = "return the token from the process entry function"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminated {
    pid: Pid,
    path: Option<ExitPath>,
}

impl Terminated {
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// How the process left the table; `None` if the table was already down
    #[inline]
    pub fn path(&self) -> Option<ExitPath> {
        self.path
    }
}

/// Execution context of one user process
pub struct ProcessContext {
    table: Arc<ProcessTable>,
    pid: Pid,
}

impl ProcessContext {
    pub(crate) fn new(table: Arc<ProcessTable>, pid: Pid) -> Self {
        Self { table, pid }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Current parent; the kernel once the forking parent has exited
    pub fn parent_pid(&self) -> Option<Pid> {
        self.table.snapshot(self.pid).and_then(|info| info.parent_pid)
    }

    #[inline]
    pub fn table(&self) -> &Arc<ProcessTable> {
        &self.table
    }

    /// Fork a child running `entry`; returns the child's pid
    pub fn fork<F>(&self, entry: F) -> ProcessResult<Pid>
    where
        F: FnOnce(ProcessContext) -> Terminated + Send + 'static,
    {
        self.table.fork(self.pid, entry)
    }

    /// Wait for the child `pid`, copying its status out when `status` is given
    pub fn waitpid(
        &self,
        pid: i64,
        status: Option<&mut RawStatus>,
        options: i32,
    ) -> ProcessResult<Pid> {
        let (pid, code) = self.table.wait(self.pid, pid, options)?;
        if let Some(status) = status {
            *status = code;
        }
        Ok(pid)
    }

    /// Finish this process with `status`
    pub fn exit(self, status: ExitStatus) -> Terminated {
        let task = self.table.get(self.pid).map(|pcb| pcb.task());
        let path = self.table.exit(self.pid, status.encode());
        if let Some(task) = task {
            self.table.host().terminate(task);
        }
        Terminated {
            pid: self.pid,
            path,
        }
    }
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext").field("pid", &self.pid).finish()
    }
}

/// Execution context of the kernel itself (pid 0)
pub struct KernelContext {
    table: Arc<ProcessTable>,
}

impl KernelContext {
    pub(crate) fn new(table: Arc<ProcessTable>) -> Self {
        Self { table }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        KERNEL_PID
    }

    #[inline]
    pub fn table(&self) -> &Arc<ProcessTable> {
        &self.table
    }

    pub fn fork<F>(&self, entry: F) -> ProcessResult<Pid>
    where
        F: FnOnce(ProcessContext) -> Terminated + Send + 'static,
    {
        self.table.fork(KERNEL_PID, entry)
    }

    /// Wait for a child of the kernel
    ///
    /// Kernel children that exit while nobody waits are reaped at once, so a
    /// wait that loses that race fails with `NoSuchProcess`.
    pub fn waitpid(
        &self,
        pid: i64,
        status: Option<&mut RawStatus>,
        options: i32,
    ) -> ProcessResult<Pid> {
        let (pid, code) = self.table.wait(KERNEL_PID, pid, options)?;
        if let Some(status) = status {
            *status = code;
        }
        Ok(pid)
    }
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext").finish_non_exhaustive()
    }
}
