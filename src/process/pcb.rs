/*!
 * Process Control Block
 *
 * The reference-counted unit representing one process.
 *
 * # Reference counting
 *
 * `Arc` keeps the memory alive; `ref_count` is the kernel's logical count and
 * decides *when* a block is torn down. The table holds one reference from
 * creation until the block is reaped, every lookup holds one more. The call
 * that takes the count to zero, and only that call, reports `true` from
 * [`ProcessControlBlock::release`] and is responsible for destruction.
 */

use crate::core::types::{Pid, RawStatus, TaskHandle, KERNEL_PID};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tracing::error;

/// Sentinel stored in `parent_pid` for the kernel, which has no parent
const NO_PARENT: u32 = u32::MAX;

/// Lifecycle state of a process as seen through its exit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Still executing
    Running,
    /// Exited, status not yet collected
    Zombie,
    /// Status collected or discarded; the block is on its way out
    Reaped,
}

/// Exit/wait handshake state, guarded by the block's mutex
#[derive(Debug, Default)]
pub(crate) struct ExitState {
    /// Exit has begun; no new children may be linked under this process
    pub(crate) exiting: bool,
    /// The process has finished and `code` is valid
    pub(crate) exited: bool,
    /// A parent committed to waiting for this process
    pub(crate) waiter: bool,
    /// The status was consumed (or nobody will ever consume it)
    pub(crate) reaped: bool,
    pub(crate) code: RawStatus,
}

impl ExitState {
    pub(crate) fn state(&self) -> ProcessState {
        if self.reaped {
            ProcessState::Reaped
        } else if self.exited {
            ProcessState::Zombie
        } else {
            ProcessState::Running
        }
    }
}

/// Process control block
pub struct ProcessControlBlock {
    pid: Pid,
    name: String,
    parent_pid: AtomicU32,
    ref_count: AtomicUsize,
    exit: Mutex<ExitState>,
    exit_cv: Condvar,
    task: TaskHandle,
    task_released: AtomicBool,
}

impl ProcessControlBlock {
    /// New block holding one reference, owned by the table
    pub(crate) fn new(pid: Pid, name: impl Into<String>, task: TaskHandle) -> Self {
        Self {
            pid,
            name: name.into(),
            parent_pid: AtomicU32::new(KERNEL_PID),
            ref_count: AtomicUsize::new(1),
            exit: Mutex::new(ExitState::default()),
            exit_cv: Condvar::new(),
            task,
            task_released: AtomicBool::new(false),
        }
    }

    /// The kernel's own block, parentless
    pub(crate) fn new_kernel(name: impl Into<String>, task: TaskHandle) -> Self {
        let pcb = Self::new(KERNEL_PID, name, task);
        pcb.parent_pid.store(NO_PARENT, Ordering::Release);
        pcb
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent pid; `None` only for the kernel
    #[inline]
    pub fn parent_pid(&self) -> Option<Pid> {
        match self.parent_pid.load(Ordering::Acquire) {
            NO_PARENT => None,
            pid => Some(pid),
        }
    }

    #[inline]
    pub(crate) fn set_parent_pid(&self, parent: Pid) {
        self.parent_pid.store(parent, Ordering::Release);
    }

    #[inline]
    pub fn is_kernel(&self) -> bool {
        self.pid == KERNEL_PID
    }

    /// Current logical reference count
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ProcessState {
        self.exit.lock().state()
    }

    #[inline]
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    /// Claim the task for teardown; only the first caller gets it
    pub(crate) fn take_task(&self) -> Option<TaskHandle> {
        (!self.task_released.swap(true, Ordering::AcqRel)).then_some(self.task)
    }

    #[inline]
    pub(crate) fn lock_exit(&self) -> MutexGuard<'_, ExitState> {
        self.exit.lock()
    }

    #[inline]
    pub(crate) fn exit_cv(&self) -> &Condvar {
        &self.exit_cv
    }

    /// Take another reference; the caller must already hold one
    #[inline]
    pub fn retain(&self) {
        let previous = self.ref_count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "retain on a dead control block {}", self.pid);
    }

    /// Take a reference unless the block is already being destroyed
    #[inline]
    pub(crate) fn try_retain(&self) -> bool {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count + 1)
            })
            .is_ok()
    }

    /// Drop one reference
    ///
    /// Returns `true` iff this call took the count to exactly zero. Under any
    /// number of concurrent callers exactly one observes `true`.
    #[must_use = "the caller that reaches zero must tear the block down"]
    pub fn release(&self) -> bool {
        match self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            }) {
            Ok(previous) => previous == 1,
            Err(_) => {
                error!(pid = self.pid, "release on a control block with no references");
                false
            }
        }
    }
}

impl std::fmt::Debug for ProcessControlBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessControlBlock")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("parent_pid", &self.parent_pid())
            .field("ref_count", &self.ref_count())
            .finish_non_exhaustive()
    }
}
