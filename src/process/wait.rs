/*!
 * Wait / Exit
 *
 * Blocking handshake between an exiting process and its parent.
 *
 * # States
 *
 * `Running -> Zombie -> Reaped`, or straight `Running -> Reaped` when the
 * parent is the kernel and nobody is waiting. The only suspension point is the
 * waiter sleeping on the child's condition variable.
 */

use super::table::ProcessTable;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::types::{Pid, RawStatus, KERNEL_PID};
use serde::Serialize;
use tracing::debug;

/// How an exiting process left the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPath {
    /// Status published for the parent to collect
    Zombie,
    /// Nobody could collect the status; the block was torn down at once
    Reaped,
}

impl ProcessTable {
    /// Run the exit protocol for `pid` with an already-encoded status
    ///
    /// Returns `None` once the table is shut down: nothing is left to publish
    /// the status to.
    pub(crate) fn exit(&self, pid: Pid, status: RawStatus) -> Option<ExitPath> {
        let me = self.get(pid)?;
        debug_assert!(!me.is_kernel(), "the kernel never exits");

        {
            let mut exit = me.lock_exit();
            debug_assert!(!exit.exiting, "pid {pid} exited twice");
            exit.exiting = true;
        }
        let rearranged = self.rearrange_children(&me);

        let mut exit = me.lock_exit();
        exit.exited = true;
        exit.code = status;

        let path = if me.parent_pid() == Some(KERNEL_PID) && !exit.waiter {
            exit.reaped = true;
            self.host().detach(me.task());
            drop(exit);
            self.release(me.arc());
            ExitPath::Reaped
        } else {
            me.exit_cv().notify_all();
            self.host().detach(me.task());
            drop(exit);
            ExitPath::Zombie
        };

        debug!(
            pid,
            status,
            ?path,
            reparented = rearranged.reparented,
            reaped = rearranged.reaped,
            "process exited"
        );
        drop(me);
        Some(path)
    }

    /// Block until the child `target` of `caller` exits and collect its status
    pub fn wait(&self, caller: Pid, target: i64, options: i32) -> ProcessResult<(Pid, RawStatus)> {
        if options != 0 {
            return Err(ProcessError::InvalidOptions(options));
        }
        let pid = Pid::try_from(target)
            .ok()
            .filter(|pid| *pid != KERNEL_PID && (*pid as usize) < self.capacity())
            .ok_or(ProcessError::NoSuchProcess(target))?;

        let child = self.get(pid).ok_or(ProcessError::NoSuchProcess(target))?;

        let mut exit = child.lock_exit();
        if child.parent_pid() != Some(caller) {
            return Err(ProcessError::NotChild { pid, caller });
        }
        if exit.reaped {
            return Err(ProcessError::NoSuchProcess(target));
        }
        if exit.waiter {
            return Err(ProcessError::AlreadyWaited(pid));
        }
        exit.waiter = true;

        while !exit.exited {
            child.exit_cv().wait(&mut exit);
        }
        // A fork that failed after the lookup tears its child down this way
        if exit.reaped {
            return Err(ProcessError::NoSuchProcess(target));
        }
        let code = exit.code;
        exit.reaped = true;
        drop(exit);

        debug!(caller, pid, code, "child reaped");
        self.release(child.arc());
        child.release();
        Ok((pid, code))
    }
}
