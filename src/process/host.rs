/*!
 * Host Collaborators
 *
 * Everything the process core needs from the rest of the kernel: the task
 * primitive a control block wraps, address-space and file-table cloning, and
 * the thread that runs a forked child.
 */

use crate::core::errors::Errno;
use crate::core::types::{Pid, TaskHandle};

/// Code a freshly forked child runs on its own execution context
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Task, memory and file-table services consumed by the process table
#[cfg_attr(test, mockall::automock)]
pub trait TaskHost: Send + Sync {
    /// Create a task with an empty address space and file table
    fn create_task(&self, name: &str) -> Result<TaskHandle, Errno>;

    /// Free a task; no thread may still be attached
    fn destroy_task(&self, task: TaskHandle);

    /// Attach one execution context to the task on behalf of `pid`
    fn attach(&self, task: TaskHandle, pid: Pid);

    /// Detach the calling execution context from the task
    fn detach(&self, task: TaskHandle);

    /// Give `to` a copy of `from`'s address space
    fn clone_address_space(&self, from: TaskHandle, to: TaskHandle) -> Result<(), Errno>;

    /// Give `to` a copy of `from`'s open-file table
    fn clone_fd_table(&self, from: TaskHandle, to: TaskHandle) -> Result<(), Errno>;

    /// Close every file in the task's table
    fn destroy_fd_table(&self, task: TaskHandle);

    /// Start a new execution context in `task` running `entry`
    fn spawn(&self, task: TaskHandle, entry: ThreadEntry) -> Result<(), Errno>;

    /// The calling execution context is finished
    fn terminate(&self, task: TaskHandle);
}
