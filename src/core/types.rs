/*!
 * Core Types
 * Common types used across the process core
 */

/// Process ID type
pub type Pid = u32;

/// Raw wait status as handed back to `waitpid` callers
pub type RawStatus = i32;

/// Pid of the kernel's own control block
pub const KERNEL_PID: Pid = 0;

/// Opaque handle to a task owned by the host
///
/// The process core never looks inside a task; it only hands the handle back
/// to the [`TaskHost`](crate::process::TaskHost) that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}
