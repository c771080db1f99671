/*!
 * Process Table
 *
 * Owns the pid map, the child registry and the kernel's control block, and
 * is the only place control blocks are created or destroyed.
 *
 * # Locking
 *
 * - Structural lock (re-entrant): creation, lookup, rearrangement, destruction
 * - Pid map lock: the bitmap and slot array
 * - Link lock: the child registry
 * - Per-block exit lock: exit/wait handshake state of one block
 *
 * Order: structural -> exit lock -> link lock -> pid map lock.
 */

use super::children::ChildRegistry;
use super::context::{KernelContext, ProcessContext, Terminated};
use super::host::{TaskHost, ThreadEntry};
use super::pcb::{ProcessControlBlock, ProcessState};
use super::pidmap::PidMap;
use crate::core::config::ProcessTableConfig;
use crate::core::errors::{HostOp, ProcessError, ProcessResult};
use crate::core::types::{Pid, TaskHandle, KERNEL_PID};
use parking_lot::ReentrantMutex;
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Point-in-time view of one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    pub pid: Pid,
    pub parent_pid: Option<Pid>,
    pub name: String,
    pub state: ProcessState,
    /// A parent is committed to waiting for this process
    pub waiter: bool,
    pub ref_count: usize,
    pub children: Vec<Pid>,
}

/// Table occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TableStats {
    pub capacity: usize,
    pub live: usize,
    pub free: usize,
    pub zombies: usize,
}

/// What shutdown found still installed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// User processes still live at shutdown
    pub leaked: Vec<Pid>,
}

/// Counted reference to a control block
///
/// Obtained from [`ProcessTable::get`]; dropping it gives the reference back
/// and destroys the block if it was the last one.
pub struct ProcessRef<'t> {
    table: &'t ProcessTable,
    pcb: Arc<ProcessControlBlock>,
    held: bool,
}

impl<'t> ProcessRef<'t> {
    #[inline]
    pub fn arc(&self) -> &Arc<ProcessControlBlock> {
        &self.pcb
    }

    /// Give the reference back now; `true` if this destroyed the block
    pub fn release(mut self) -> bool {
        self.held = false;
        self.table.release(&self.pcb)
    }
}

impl Clone for ProcessRef<'_> {
    fn clone(&self) -> Self {
        self.pcb.retain();
        Self {
            table: self.table,
            pcb: Arc::clone(&self.pcb),
            held: true,
        }
    }
}

impl Deref for ProcessRef<'_> {
    type Target = ProcessControlBlock;

    fn deref(&self) -> &ProcessControlBlock {
        &self.pcb
    }
}

impl Drop for ProcessRef<'_> {
    fn drop(&mut self) {
        if self.held {
            self.table.release(&self.pcb);
        }
    }
}

impl std::fmt::Debug for ProcessRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProcessRef").field(&self.pcb).finish()
    }
}

/// The process table
pub struct ProcessTable {
    config: ProcessTableConfig,
    structure: ReentrantMutex<()>,
    pids: PidMap,
    registry: ChildRegistry,
    kernel: Arc<ProcessControlBlock>,
    host: Arc<dyn TaskHost>,
    live: AtomicBool,
}

impl ProcessTable {
    /// Bring up the pid map and install the kernel's control block at pid 0
    pub fn init(config: ProcessTableConfig, host: Arc<dyn TaskHost>) -> ProcessResult<Arc<Self>> {
        config
            .validate()
            .map_err(|e| ProcessError::InvalidConfig(e.to_string()))?;

        let pids = PidMap::new(config.max_processes);
        let pid = pids.allocate()?;
        assert_eq!(pid, KERNEL_PID, "kernel must own pid 0");

        let task = match host.create_task(&config.kernel_name) {
            Ok(task) => task,
            Err(errno) => {
                pids.deallocate(pid, None);
                return Err(ProcessError::host(HostOp::CreateTask, errno));
            }
        };

        let kernel = Arc::new(ProcessControlBlock::new_kernel(
            config.kernel_name.as_str(),
            task,
        ));
        pids.install(pid, Arc::clone(&kernel));
        host.attach(task, KERNEL_PID);

        info!(
            capacity = config.max_processes,
            kernel = %config.kernel_name,
            "Process table initialized"
        );

        Ok(Arc::new(Self {
            config,
            structure: ReentrantMutex::new(()),
            pids,
            registry: ChildRegistry::new(),
            kernel,
            host,
            live: AtomicBool::new(true),
        }))
    }

    /// Execution context of the kernel itself
    pub fn kernel_context(self: &Arc<Self>) -> KernelContext {
        KernelContext::new(Arc::clone(self))
    }

    #[inline]
    pub fn config(&self) -> &ProcessTableConfig {
        &self.config
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pids.capacity()
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    #[inline]
    pub fn host(&self) -> &Arc<dyn TaskHost> {
        &self.host
    }

    /// Task handle of the kernel's control block
    #[inline]
    pub fn kernel_task(&self) -> TaskHandle {
        self.kernel.task()
    }

    #[inline]
    pub(crate) fn structure(&self) -> &ReentrantMutex<()> {
        &self.structure
    }

    #[inline]
    pub(crate) fn pids(&self) -> &PidMap {
        &self.pids
    }

    #[inline]
    pub(crate) fn registry(&self) -> &ChildRegistry {
        &self.registry
    }

    #[inline]
    pub(crate) fn kernel(&self) -> &Arc<ProcessControlBlock> {
        &self.kernel
    }

    /// Look up a live process, taking a reference on it
    pub fn get(&self, pid: Pid) -> Option<ProcessRef<'_>> {
        if !self.is_live() {
            return None;
        }
        let _structure = self.structure.lock();
        self.pids.get_retained(pid).map(|pcb| ProcessRef {
            table: self,
            pcb,
            held: true,
        })
    }

    /// Create an unlinked control block parented under the kernel
    ///
    /// The returned block carries the table's own reference.
    pub fn create(&self, name: &str) -> ProcessResult<Arc<ProcessControlBlock>> {
        if !self.is_live() {
            return Err(ProcessError::ShutDown);
        }
        let _structure = self.structure.lock();

        let pid = self.pids.allocate()?;
        let task = match self.host.create_task(name) {
            Ok(task) => task,
            Err(errno) => {
                self.pids.deallocate(pid, None);
                return Err(ProcessError::host(HostOp::CreateTask, errno));
            }
        };

        let pcb = Arc::new(ProcessControlBlock::new(pid, name, task));
        self.pids.install(pid, Arc::clone(&pcb));
        debug!(pid, %task, name, "control block created");
        Ok(pcb)
    }

    /// Drop one reference, tearing the block down if it was the last
    pub fn release(&self, pcb: &Arc<ProcessControlBlock>) -> bool {
        if pcb.release() {
            self.destroy(pcb);
            true
        } else {
            false
        }
    }

    fn destroy(&self, pcb: &Arc<ProcessControlBlock>) {
        let _structure = self.structure.lock();
        debug_assert_eq!(pcb.ref_count(), 0);

        let pid = pcb.pid();
        self.pids.deallocate(pid, Some(pcb));
        self.registry.unlink(pid);
        self.registry.drop_list(pid);
        if let Some(task) = pcb.take_task() {
            self.host.destroy_fd_table(task);
            self.host.destroy_task(task);
        }
        debug!(pid, "control block destroyed");
    }

    /// Tear down a child whose fork failed
    ///
    /// Anyone who looked the child up in the meantime sees it as already
    /// reaped; a blocked waiter is woken and gets `NoSuchProcess`.
    fn abandon(&self, child: &Arc<ProcessControlBlock>) {
        {
            let mut exit = child.lock_exit();
            exit.exiting = true;
            exit.exited = true;
            exit.reaped = true;
            child.exit_cv().notify_all();
        }
        self.release(child);
    }

    /// Duplicate `parent` into a new child process running `entry`
    ///
    /// Every step that fails unwinds the steps before it; on error no trace
    /// of the child remains. A parent that has begun exiting cannot fork.
    pub fn fork<F>(self: &Arc<Self>, parent: Pid, entry: F) -> ProcessResult<Pid>
    where
        F: FnOnce(ProcessContext) -> Terminated + Send + 'static,
    {
        if !self.is_live() {
            return Err(ProcessError::ShutDown);
        }
        let parent = self
            .get(parent)
            .ok_or(ProcessError::NoSuchProcess(i64::from(parent)))?;
        let parent_task = parent.task();

        let child = self.create(parent.name())?;
        let pid = child.pid();
        let task = child.task();

        if let Err(errno) = self.host.clone_address_space(parent_task, task) {
            self.abandon(&child);
            return Err(ProcessError::host(HostOp::CloneAddressSpace, errno));
        }
        if let Err(errno) = self.host.clone_fd_table(parent_task, task) {
            self.abandon(&child);
            return Err(ProcessError::host(HostOp::CloneFdTable, errno));
        }

        // Serialized against the parent's rearrange_children
        {
            let _structure = self.structure.lock();
            let exit = parent.lock_exit();
            if exit.exiting {
                drop(exit);
                self.abandon(&child);
                return Err(ProcessError::NoSuchProcess(i64::from(parent.pid())));
            }
            self.registry.attach(&child, &parent);
            self.host.attach(task, pid);
        }

        let table = Arc::clone(self);
        let thread: ThreadEntry = Box::new(move || {
            let terminated = entry(ProcessContext::new(table, pid));
            debug!(pid = terminated.pid(), path = ?terminated.path(), "execution context finished");
        });
        if let Err(errno) = self.host.spawn(task, thread) {
            self.host.detach(task);
            self.abandon(&child);
            return Err(ProcessError::host(HostOp::Spawn, errno));
        }

        debug!(parent = parent.pid(), pid, "forked");
        Ok(pid)
    }

    /// Children currently linked under `pid`
    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.registry.children_of(pid)
    }

    /// Pids with an installed control block
    pub fn live_pids(&self) -> Vec<Pid> {
        self.pids.live_pids()
    }

    /// Inspect a process without taking a reference on it
    pub fn snapshot(&self, pid: Pid) -> Option<ProcessInfo> {
        let pcb = self.pids.peek(pid)?;
        let (state, waiter) = {
            let exit = pcb.lock_exit();
            (exit.state(), exit.waiter)
        };
        Some(ProcessInfo {
            pid: pcb.pid(),
            parent_pid: pcb.parent_pid(),
            name: pcb.name().to_string(),
            state,
            waiter,
            ref_count: pcb.ref_count(),
            children: self.registry.children_of(pid),
        })
    }

    pub fn stats(&self) -> TableStats {
        let zombies = self
            .pids
            .live_pids()
            .into_iter()
            .filter_map(|pid| self.pids.peek(pid))
            .filter(|pcb| pcb.state() == ProcessState::Zombie)
            .count();
        TableStats {
            capacity: self.pids.capacity(),
            live: self.pids.live(),
            free: self.pids.free_slots(),
            zombies,
        }
    }

    /// Tear the table down
    ///
    /// Every installed block is dropped, the kernel's included. Later lookups
    /// find nothing and `fork` fails with [`ProcessError::ShutDown`].
    pub fn shutdown(&self) -> ShutdownReport {
        if !self.live.swap(false, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        let _structure = self.structure.lock();

        let mut report = ShutdownReport::default();
        for pcb in self.pids.drain() {
            if !pcb.is_kernel() {
                report.leaked.push(pcb.pid());
            }
            if let Some(task) = pcb.take_task() {
                if pcb.is_kernel() {
                    self.host.detach(task);
                }
                self.host.destroy_fd_table(task);
                self.host.destroy_task(task);
            }
        }
        self.registry.clear();

        if !report.leaked.is_empty() {
            warn!(leaked = ?report.leaked, "processes still live at shutdown");
        }
        info!("Process table shut down");
        report
    }
}

impl std::fmt::Debug for ProcessTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTable")
            .field("pids", &self.pids)
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}
