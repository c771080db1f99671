/*!
 * Process Concurrency Tests
 * Pid uniqueness, capacity limits and reference release under contention
 */

use crate::support::{boot, wait_until, Gate};
use kproc::{Errno, ExitStatus, ProcessError, KERNEL_PID};
use pretty_assertions::assert_eq;
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_forks_get_unique_pids() {
    const FORKERS: usize = 8;
    const PER_FORKER: usize = 8;

    let (table, host) = boot(128);
    let gate = Gate::new();
    let barrier = Arc::new(Barrier::new(FORKERS));

    let handles: Vec<_> = (0..FORKERS)
        .map(|_| {
            let table = table.clone();
            let gate = gate.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let kernel = table.kernel_context();
                barrier.wait();
                (0..PER_FORKER)
                    .map(|_| {
                        let gate = gate.clone();
                        kernel
                            .fork(move |ctx| {
                                gate.pass();
                                ctx.exit(ExitStatus::Exited(0))
                            })
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for pid in handle.join().unwrap() {
            assert_ne!(pid, KERNEL_PID);
            assert!(seen.insert(pid), "pid {pid} handed out twice");
        }
    }
    assert_eq!(seen.len(), FORKERS * PER_FORKER);
    assert_eq!(table.stats().live, FORKERS * PER_FORKER + 1);

    let mut children = table.children_of(KERNEL_PID);
    children.sort_unstable();
    let mut expected: Vec<_> = seen.into_iter().collect();
    expected.sort_unstable();
    assert_eq!(children, expected);

    gate.open();
    host.join_all();
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
}

#[test]
fn test_fork_fails_with_enproc_at_capacity() {
    const CAPACITY: usize = 8;

    let (table, host) = boot(CAPACITY);
    let kernel = table.kernel_context();
    let gate = Gate::new();

    for _ in 1..CAPACITY {
        let gate = gate.clone();
        kernel
            .fork(move |ctx| {
                gate.pass();
                ctx.exit(ExitStatus::Exited(0))
            })
            .unwrap();
    }
    assert_eq!(table.stats().free, 0);

    let err = kernel
        .fork(|ctx| ctx.exit(ExitStatus::Exited(0)))
        .unwrap_err();
    assert_eq!(err, ProcessError::PidExhausted { capacity: CAPACITY });
    assert_eq!(err.errno(), Errno::ENPROC);

    gate.open();
    host.join_all();

    // Exhaustion is recoverable once processes go away
    kernel.fork(|ctx| ctx.exit(ExitStatus::Exited(0))).unwrap();
    host.join_all();
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
}

#[test]
fn test_concurrent_release_destroys_once() {
    const THREADS: usize = 16;

    let (table, host) = boot(16);
    let pcb = table.create("shared").unwrap();
    let pid = pcb.pid();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = table.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..rng.gen_range(10..50) {
                    let first = table.get(pid).unwrap();
                    let second = first.clone();
                    drop(first);
                    assert!(!second.release());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pcb.ref_count(), 1);
    assert!(table.release(&pcb));
    assert!(table.get(pid).is_none());
    assert_eq!(host.counters().destroyed, 1);
}

#[test]
fn test_parent_and_children_exit_together() {
    const CHILDREN: usize = 16;

    for _ in 0..10 {
        let (table, host) = boot(64);
        let gate = Gate::new();

        let child_gate = gate.clone();
        table
            .kernel_context()
            .fork(move |ctx| {
                for _ in 0..CHILDREN {
                    let gate = child_gate.clone();
                    ctx.fork(move |child| {
                        gate.pass();
                        child.exit(ExitStatus::Exited(1))
                    })
                    .unwrap();
                }
                child_gate.pass();
                ctx.exit(ExitStatus::Exited(0))
            })
            .unwrap();

        wait_until("children to be forked", || table.stats().live == CHILDREN + 2);
        gate.open();
        host.join_all();

        // Every child was either reaped with its parent or adopted and reaped
        assert_eq!(table.live_pids(), vec![KERNEL_PID]);
        assert_eq!(table.stats().zombies, 0);
        let counters = host.counters();
        assert_eq!(counters.created, counters.destroyed + 1);
    }
}
