/*!
 * Thread Host
 *
 * Hosted implementation of [`TaskHost`]: every execution context is a host
 * thread and tasks are bookkeeping records. Address spaces and file tables
 * are modelled by a generation number and an open-file count, enough to see
 * that fork copied them and destruction dropped them.
 */

use super::host::{TaskHost, ThreadEntry};
use crate::core::errors::Errno;
use crate::core::limits::PROCESS_THREAD_PREFIX;
use crate::core::types::{Pid, TaskHandle};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{error, warn};

/// Host-side record of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedTask {
    pub name: String,
    /// Pid of the last context attached
    pub pid: Option<Pid>,
    /// Execution contexts currently attached
    pub threads: u32,
    /// Address-space generation; `None` for a kernel-only task
    pub address_space: Option<u64>,
    pub open_files: u32,
}

/// Lifetime counters for leak checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostCounters {
    pub created: usize,
    pub destroyed: usize,
    pub spawned: usize,
    pub terminated: usize,
}

/// Thread-backed task host
pub struct ThreadHost {
    next_task: AtomicU64,
    next_space: AtomicU64,
    tasks: DashMap<TaskHandle, HostedTask>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    spawned: AtomicUsize,
    terminated: AtomicUsize,
    stdio_files: u32,
}

impl ThreadHost {
    pub fn new() -> Self {
        Self {
            next_task: AtomicU64::new(1),
            next_space: AtomicU64::new(1),
            tasks: DashMap::new(),
            threads: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
            terminated: AtomicUsize::new(0),
            stdio_files: 3,
        }
    }

    /// Snapshot of a task record
    pub fn task(&self, task: TaskHandle) -> Option<HostedTask> {
        self.tasks.get(&task).map(|entry| entry.value().clone())
    }

    /// Tasks created and not yet destroyed
    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn counters(&self) -> HostCounters {
        HostCounters {
            created: self.created.load(Ordering::Acquire),
            destroyed: self.destroyed.load(Ordering::Acquire),
            spawned: self.spawned.load(Ordering::Acquire),
            terminated: self.terminated.load(Ordering::Acquire),
        }
    }

    /// Join every spawned thread, including threads spawned while joining
    pub fn join_all(&self) {
        loop {
            let batch = std::mem::take(&mut *self.threads.lock());
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if handle.join().is_err() {
                    error!("process thread panicked");
                }
            }
        }
    }
}

impl Default for ThreadHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskHost for ThreadHost {
    fn create_task(&self, name: &str) -> Result<TaskHandle, Errno> {
        let handle = TaskHandle::from_raw(self.next_task.fetch_add(1, Ordering::Relaxed));
        self.tasks.insert(
            handle,
            HostedTask {
                name: name.to_string(),
                pid: None,
                threads: 0,
                address_space: None,
                open_files: self.stdio_files,
            },
        );
        self.created.fetch_add(1, Ordering::AcqRel);
        Ok(handle)
    }

    fn destroy_task(&self, task: TaskHandle) {
        match self.tasks.remove(&task) {
            Some((_, record)) => {
                if record.threads != 0 {
                    warn!(%task, threads = record.threads, "destroying a task with attached threads");
                }
                self.destroyed.fetch_add(1, Ordering::AcqRel);
            }
            None => warn!(%task, "destroying an unknown task"),
        }
    }

    fn attach(&self, task: TaskHandle, pid: Pid) {
        if let Some(mut record) = self.tasks.get_mut(&task) {
            record.threads += 1;
            record.pid = Some(pid);
        }
    }

    fn detach(&self, task: TaskHandle) {
        if let Some(mut record) = self.tasks.get_mut(&task) {
            record.threads = record.threads.saturating_sub(1);
        }
    }

    fn clone_address_space(&self, from: TaskHandle, to: TaskHandle) -> Result<(), Errno> {
        if !self.tasks.contains_key(&from) {
            return Err(Errno::EINVAL);
        }
        let space = self.next_space.fetch_add(1, Ordering::Relaxed);
        let mut target = self.tasks.get_mut(&to).ok_or(Errno::EINVAL)?;
        target.address_space = Some(space);
        Ok(())
    }

    fn clone_fd_table(&self, from: TaskHandle, to: TaskHandle) -> Result<(), Errno> {
        let open_files = self
            .tasks
            .get(&from)
            .map(|record| record.open_files)
            .ok_or(Errno::EINVAL)?;
        let mut target = self.tasks.get_mut(&to).ok_or(Errno::EINVAL)?;
        target.open_files = open_files;
        Ok(())
    }

    fn destroy_fd_table(&self, task: TaskHandle) {
        if let Some(mut record) = self.tasks.get_mut(&task) {
            record.open_files = 0;
        }
    }

    fn spawn(&self, task: TaskHandle, entry: ThreadEntry) -> Result<(), Errno> {
        let pid = self
            .tasks
            .get(&task)
            .ok_or(Errno::EINVAL)?
            .pid
            .unwrap_or_default();

        let handle = thread::Builder::new()
            .name(format!("{PROCESS_THREAD_PREFIX}-{pid}"))
            .spawn(entry)
            .map_err(|_| Errno::ENOMEM)?;

        self.threads.lock().push(handle);
        self.spawned.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn terminate(&self, _task: TaskHandle) {
        self.terminated.fetch_add(1, Ordering::AcqRel);
    }
}
