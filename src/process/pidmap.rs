/*!
 * Pid Map
 *
 * Fixed-capacity pid allocator. A bitmap records which pids are taken and a
 * parallel slot array maps each taken pid to its control block.
 *
 * # Performance
 *
 * The free-slot counter is decremented before the bitmap lock is taken, so an
 * exhausted pid space is reported without touching the lock.
 */

use super::pcb::ProcessControlBlock;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::PIDMAP_WORD_BITS;
use crate::core::types::Pid;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

struct PidMapInner {
    bitmap: Vec<u64>,
    slots: Vec<Option<Arc<ProcessControlBlock>>>,
}

impl PidMapInner {
    #[inline]
    fn is_set(&self, pid: usize) -> bool {
        self.bitmap[pid / PIDMAP_WORD_BITS] & (1 << (pid % PIDMAP_WORD_BITS)) != 0
    }

    #[inline]
    fn set(&mut self, pid: usize) {
        self.bitmap[pid / PIDMAP_WORD_BITS] |= 1 << (pid % PIDMAP_WORD_BITS);
    }

    #[inline]
    fn clear(&mut self, pid: usize) {
        self.bitmap[pid / PIDMAP_WORD_BITS] &= !(1 << (pid % PIDMAP_WORD_BITS));
    }

    /// Lowest clear bit below `capacity`
    fn first_clear(&self, capacity: usize) -> Option<usize> {
        self.bitmap
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(index, word)| index * PIDMAP_WORD_BITS + word.trailing_ones() as usize)
            .filter(|pid| *pid < capacity)
    }
}

/// Bitmap pid allocator with a pid -> control block slot array
pub struct PidMap {
    capacity: usize,
    free: AtomicUsize,
    inner: Mutex<PidMapInner>,
}

impl PidMap {
    pub fn new(capacity: usize) -> Self {
        let words = capacity.div_ceil(PIDMAP_WORD_BITS);
        let mut bitmap = vec![0u64; words];

        // Bits past the end of the pid space stay permanently taken
        let tail = capacity % PIDMAP_WORD_BITS;
        if tail != 0 {
            if let Some(last) = bitmap.last_mut() {
                *last = !((1u64 << tail) - 1);
            }
        }

        Self {
            capacity,
            free: AtomicUsize::new(capacity),
            inner: Mutex::new(PidMapInner {
                bitmap,
                slots: vec![None; capacity],
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.capacity - self.free_slots()
    }

    /// Reserve the lowest free pid
    pub fn allocate(&self) -> ProcessResult<Pid> {
        self.free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| free.checked_sub(1))
            .map_err(|_| ProcessError::PidExhausted {
                capacity: self.capacity,
            })?;

        let mut inner = self.inner.lock();
        match inner.first_clear(self.capacity) {
            Some(pid) => {
                inner.set(pid);
                debug_assert!(inner.slots[pid].is_none());
                Ok(pid as Pid)
            }
            None => {
                // Counter and bitmap disagree; give the slot back
                drop(inner);
                self.free.fetch_add(1, Ordering::AcqRel);
                warn!(capacity = self.capacity, "pid bitmap full with free slots counted");
                Err(ProcessError::PidExhausted {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Record the control block for an allocated pid
    ///
    /// # Panics
    /// If `pid` was not allocated or already has a block installed.
    pub fn install(&self, pid: Pid, pcb: Arc<ProcessControlBlock>) {
        let index = pid as usize;
        assert!(index < self.capacity, "pid {pid} out of range");
        assert_eq!(pcb.pid(), pid, "installing block {} at pid {pid}", pcb.pid());

        let mut inner = self.inner.lock();
        assert!(inner.is_set(index), "installing pid {pid} that was never allocated");
        assert!(inner.slots[index].is_none(), "pid {pid} already installed");
        inner.slots[index] = Some(pcb);
    }

    /// Release a pid and take back its control block
    ///
    /// When `expected` is given, the installed block must be that one.
    ///
    /// # Panics
    /// If the installed block is not `expected`.
    pub fn deallocate(
        &self,
        pid: Pid,
        expected: Option<&Arc<ProcessControlBlock>>,
    ) -> Option<Arc<ProcessControlBlock>> {
        let index = pid as usize;
        if index >= self.capacity {
            warn!(pid, "deallocating pid outside the pid space");
            return None;
        }

        let mut inner = self.inner.lock();
        if !inner.is_set(index) {
            debug_assert!(inner.slots[index].is_none());
            warn!(pid, "deallocating a pid that is not allocated");
            return None;
        }

        inner.clear(index);
        let installed = inner.slots[index].take();
        self.free.fetch_add(1, Ordering::AcqRel);
        drop(inner);

        debug_assert!(self.free_slots() <= self.capacity);
        if let (Some(expected), Some(installed)) = (expected, installed.as_ref()) {
            assert!(
                Arc::ptr_eq(expected, installed),
                "pid {pid} held a different control block"
            );
        }
        installed
    }

    /// Resolve a pid and take a reference on its block
    ///
    /// Blocks whose count already reached zero are reported as absent.
    pub fn get_retained(&self, pid: Pid) -> Option<Arc<ProcessControlBlock>> {
        let index = pid as usize;
        if index >= self.capacity {
            return None;
        }

        let inner = self.inner.lock();
        if !inner.is_set(index) {
            return None;
        }
        let pcb = inner.slots[index].as_ref()?;
        pcb.try_retain().then(|| Arc::clone(pcb))
    }

    /// Resolve a pid without taking a reference
    pub fn peek(&self, pid: Pid) -> Option<Arc<ProcessControlBlock>> {
        let index = pid as usize;
        if index >= self.capacity {
            return None;
        }
        self.inner.lock().slots[index].clone()
    }

    #[inline]
    pub fn is_allocated(&self, pid: Pid) -> bool {
        let index = pid as usize;
        index < self.capacity && self.inner.lock().is_set(index)
    }

    /// Pids with a block installed, in ascending order
    pub fn live_pids(&self) -> Vec<Pid> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(pid, _)| pid as Pid)
            .collect()
    }

    /// Empty every slot and return the blocks that were installed
    pub(crate) fn drain(&self) -> Vec<Arc<ProcessControlBlock>> {
        let mut inner = self.inner.lock();
        let mut drained = Vec::new();
        for pid in 0..self.capacity {
            if inner.is_set(pid) {
                inner.clear(pid);
                if let Some(pcb) = inner.slots[pid].take() {
                    drained.push(pcb);
                }
            }
        }
        self.free.store(self.capacity, Ordering::Release);
        drained
    }
}

impl std::fmt::Debug for PidMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidMap")
            .field("capacity", &self.capacity)
            .field("free", &self.free_slots())
            .finish()
    }
}
