/*!
 * Child Registry
 *
 * Parent -> children lists keyed by pid, plus the reparenting and zombie
 * reaping run when a parent exits.
 *
 * # Design
 *
 * Links are pids, never pointers: a parent never owns its children and a child
 * never owns its parent. Resolving a pid to a block goes through the pid map,
 * which hands out a counted reference or nothing at all.
 */

use super::pcb::ProcessControlBlock;
use super::table::ProcessTable;
use crate::core::types::Pid;
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Links {
    /// Children of each parent, in attach order
    children: AHashMap<Pid, Vec<Pid>>,
    /// Back-link: the list a pid is currently linked into
    linked_under: AHashMap<Pid, Pid>,
}

/// Outcome of rearranging an exiting process's children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rearranged {
    /// Running children handed to the kernel
    pub reparented: usize,
    /// Exited children released because nobody is left to reap them
    pub reaped: usize,
}

/// Parent/child links for every live process
pub struct ChildRegistry {
    links: Mutex<Links>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(Links::default()),
        }
    }

    /// Append `child` to `parent`'s children and point it at `parent`
    ///
    /// # Panics
    /// If `child` is already linked under some parent.
    pub fn attach(&self, child: &ProcessControlBlock, parent: &ProcessControlBlock) {
        let mut links = self.links.lock();
        let previous = links.linked_under.insert(child.pid(), parent.pid());
        assert!(
            previous.is_none(),
            "pid {} is already linked under {:?}",
            child.pid(),
            previous
        );
        links
            .children
            .entry(parent.pid())
            .or_default()
            .push(child.pid());
        child.set_parent_pid(parent.pid());
    }

    /// Children currently linked under `parent`
    pub fn children_of(&self, parent: Pid) -> Vec<Pid> {
        self.links
            .lock()
            .children
            .get(&parent)
            .cloned()
            .unwrap_or_default()
    }

    /// The parent list `child` is linked into, if any
    pub fn parent_link(&self, child: Pid) -> Option<Pid> {
        self.links.lock().linked_under.get(&child).copied()
    }

    /// Detach every child of `parent`, calling `visit` for each under the link lock
    pub(crate) fn detach_all<F>(&self, parent: Pid, mut visit: F)
    where
        F: FnMut(Pid),
    {
        let mut links = self.links.lock();
        let Some(children) = links.children.get_mut(&parent).map(std::mem::take) else {
            return;
        };
        for child in children {
            links.linked_under.remove(&child);
            visit(child);
        }
    }

    /// Remove `child` from whatever list holds it
    pub(crate) fn unlink(&self, child: Pid) -> bool {
        let mut links = self.links.lock();
        let Some(parent) = links.linked_under.remove(&child) else {
            return false;
        };
        if let Some(siblings) = links.children.get_mut(&parent) {
            siblings.retain(|pid| *pid != child);
        }
        true
    }

    /// Free the children container of a block being destroyed
    pub(crate) fn drop_list(&self, parent: Pid) {
        let mut links = self.links.lock();
        if let Some(children) = links.children.remove(&parent) {
            if !children.is_empty() {
                warn!(pid = parent, ?children, "destroying a process that still has children");
                for child in children {
                    links.linked_under.remove(&child);
                }
            }
        }
    }

    pub(crate) fn clear(&self) {
        let mut links = self.links.lock();
        links.children.clear();
        links.linked_under.clear();
    }
}

impl Default for ChildRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    /// Hand off the children of an exiting process
    ///
    /// Running children move under the kernel; exited children that were never
    /// waited for are released. Runs before the exiting process publishes its
    /// own exit, so no child is ever left pointing at a vanished parent.
    pub(crate) fn rearrange_children(&self, exiting: &ProcessControlBlock) -> Rearranged {
        let _structure = self.structure().lock();

        let mut snapshot: Vec<Arc<ProcessControlBlock>> = Vec::new();
        self.registry().detach_all(exiting.pid(), |pid| {
            match self.pids().get_retained(pid) {
                Some(child) => {
                    assert_eq!(
                        child.parent_pid(),
                        Some(exiting.pid()),
                        "child {pid} linked under the wrong parent"
                    );
                    snapshot.push(child);
                }
                None => debug!(pid, "child already being destroyed"),
            }
        });

        let mut summary = Rearranged::default();
        for child in &snapshot {
            let mut exit = child.lock_exit();
            if !exit.exited {
                self.registry().attach(child, self.kernel());
                drop(exit);
                debug!(pid = child.pid(), from = exiting.pid(), "orphan moved under kernel");
                summary.reparented += 1;
            } else if !exit.reaped {
                exit.reaped = true;
                drop(exit);
                self.release(child);
                debug!(pid = child.pid(), from = exiting.pid(), "zombie reaped with its parent");
                summary.reaped += 1;
            }
        }

        for child in snapshot {
            self.release(&child);
        }

        if summary != Rearranged::default() {
            debug!(
                pid = exiting.pid(),
                reparented = summary.reparented,
                reaped = summary.reaped,
                "children rearranged"
            );
        }
        summary
    }
}
