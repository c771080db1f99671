/*!
 * Process Lifecycle Tests
 * Fork, exit and wait across real execution contexts
 */

use crate::support::{boot, wait_until, Gate, TIMEOUT};
use kproc::{
    Errno, ExitStatus, Pid, ProcessError, ProcessState, WaitStatus, KERNEL_PID,
};
use pretty_assertions::assert_eq;
use std::sync::mpsc;

#[test]
fn test_exit_statuses_reach_parent() {
    let (table, host) = boot(16);
    let (tx, rx) = mpsc::channel();

    table
        .kernel_context()
        .fork(move |ctx| {
            let endings = [
                ExitStatus::Exited(42),
                ExitStatus::Signaled(9),
                ExitStatus::Cored(11),
            ];
            for ending in endings {
                let child = ctx.fork(move |child| child.exit(ending)).unwrap();
                let mut raw = 0;
                let reaped = ctx.waitpid(i64::from(child), Some(&mut raw), 0).unwrap();
                assert_eq!(reaped, child);
                tx.send(raw).unwrap();
            }
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    let statuses: Vec<_> = (0..3).map(|_| WaitStatus(rx.recv_timeout(TIMEOUT).unwrap())).collect();
    host.join_all();

    assert!(statuses[0].exited());
    assert_eq!(statuses[0].exit_code(), 42);
    assert!(statuses[1].signaled());
    assert_eq!(statuses[1].term_signal(), 9);
    assert!(!statuses[1].core_dumped());
    assert!(statuses[2].core_dumped());
    assert_eq!(statuses[2].term_signal(), 11);

    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
}

#[test]
fn test_orphan_moves_under_kernel() {
    let (table, host) = boot(16);
    let gate = Gate::new();
    let (tx, rx) = mpsc::channel();

    let child_gate = gate.clone();
    let parent = table
        .kernel_context()
        .fork(move |ctx| {
            let child = ctx
                .fork(move |child| {
                    child_gate.pass();
                    child.exit(ExitStatus::Exited(0))
                })
                .unwrap();
            tx.send(child).unwrap();
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    let child: Pid = rx.recv_timeout(TIMEOUT).unwrap();
    wait_until("parent to exit", || table.snapshot(parent).is_none());

    let info = table.snapshot(child).unwrap();
    assert_eq!(info.parent_pid, Some(KERNEL_PID));
    assert_eq!(info.state, ProcessState::Running);
    assert_eq!(table.children_of(KERNEL_PID), vec![child]);

    gate.open();
    host.join_all();

    assert!(table.snapshot(child).is_none());
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
    assert!(table.children_of(KERNEL_PID).is_empty());
}

#[test]
fn test_zombie_reaped_with_parent() {
    let (table, host) = boot(16);
    let (tx, rx) = mpsc::channel();

    table
        .kernel_context()
        .fork(move |ctx| {
            let child = ctx.fork(|child| child.exit(ExitStatus::Exited(5))).unwrap();
            let table = ctx.table().clone();
            wait_until("child to become a zombie", || {
                table
                    .snapshot(child)
                    .is_some_and(|info| info.state == ProcessState::Zombie)
            });
            tx.send((child, table.snapshot(child).unwrap())).unwrap();
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    let (child, zombie) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(zombie.ref_count, 1);
    assert!(!zombie.waiter);

    host.join_all();
    assert!(table.snapshot(child).is_none());
    assert_eq!(table.stats().zombies, 0);
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);

    let counters = host.counters();
    assert_eq!(counters.created, counters.destroyed + 1);
    assert_eq!(counters.spawned, counters.terminated);
}

#[test]
fn test_no_cross_tree_reaping() {
    let (table, host) = boot(16);
    let kernel = table.kernel_context();
    let gate = Gate::new();
    let (pid_tx, pid_rx) = mpsc::channel::<Pid>();
    let (result_tx, result_rx) = mpsc::channel();

    let grandchild_gate = gate.clone();
    kernel
        .fork(move |ctx| {
            let grandchild = ctx
                .fork(move |child| {
                    grandchild_gate.pass();
                    child.exit(ExitStatus::Exited(3))
                })
                .unwrap();
            pid_tx.send(grandchild).unwrap();
            let mut raw = 0;
            ctx.waitpid(i64::from(grandchild), Some(&mut raw), 0).unwrap();
            assert_eq!(WaitStatus(raw).exit_code(), 3);
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    let grandchild = pid_rx.recv_timeout(TIMEOUT).unwrap();
    kernel
        .fork(move |ctx| {
            let mut raw = -1;
            let result = ctx.waitpid(i64::from(grandchild), Some(&mut raw), 0);
            result_tx.send((result, raw)).unwrap();
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    let (result, raw) = result_rx.recv_timeout(TIMEOUT).unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, ProcessError::NotChild { pid, .. } if pid == grandchild));
    assert_eq!(err.errno(), Errno::ECHILD);
    assert_eq!(raw, -1, "status untouched on failure");

    gate.open();
    host.join_all();
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
}

#[test]
fn test_wait_argument_errors() {
    let (table, host) = boot(16);
    let (tx, rx) = mpsc::channel();

    table
        .kernel_context()
        .fork(move |ctx| {
            let me = i64::from(ctx.pid());
            let child = ctx.fork(|child| child.exit(ExitStatus::Exited(0))).unwrap();
            let mut errors = vec![
                ctx.waitpid(-5, None, 0).unwrap_err().errno(),
                ctx.waitpid(999, None, 0).unwrap_err().errno(),
                ctx.waitpid(me, None, 0).unwrap_err().errno(),
                ctx.waitpid(i64::from(child), None, 1).unwrap_err().errno(),
            ];
            ctx.waitpid(i64::from(child), None, 0).unwrap();
            errors.push(ctx.waitpid(i64::from(child), None, 0).unwrap_err().errno());
            tx.send(errors).unwrap();
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    let errors = rx.recv_timeout(TIMEOUT).unwrap();
    host.join_all();
    assert_eq!(
        errors,
        vec![
            Errno::ESRCH,
            Errno::ESRCH,
            Errno::ECHILD,
            Errno::EINVAL,
            Errno::ESRCH
        ]
    );
}

#[test]
fn test_second_waiter_is_refused() {
    let (table, host) = boot(16);
    let kernel = table.kernel_context();
    let gate = Gate::new();

    let child_gate = gate.clone();
    let child = kernel
        .fork(move |ctx| {
            child_gate.pass();
            ctx.exit(ExitStatus::Exited(8))
        })
        .unwrap();

    let first = {
        let table = table.clone();
        std::thread::spawn(move || {
            let mut raw = 0;
            table
                .kernel_context()
                .waitpid(i64::from(child), Some(&mut raw), 0)
                .map(|pid| (pid, raw))
        })
    };
    wait_until("first waiter to commit", || {
        table.snapshot(child).is_some_and(|info| info.waiter)
    });

    let second = kernel.waitpid(i64::from(child), None, 0).unwrap_err();
    assert_eq!(second, ProcessError::AlreadyWaited(child));
    assert_eq!(second.errno(), Errno::ECHILD);

    gate.open();
    let (pid, raw) = first.join().unwrap().unwrap();
    assert_eq!(pid, child);
    assert_eq!(WaitStatus(raw).exit_code(), 8);

    host.join_all();
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
}

#[test]
fn test_reference_counts_through_lifecycle() {
    let (table, host) = boot(16);
    let gate = Gate::new();

    let child_gate = gate.clone();
    let child = table
        .kernel_context()
        .fork(move |ctx| {
            child_gate.pass();
            ctx.exit(ExitStatus::Exited(0))
        })
        .unwrap();

    assert_eq!(table.snapshot(child).unwrap().ref_count, 1);
    {
        let first = table.get(child).unwrap();
        let second = table.get(child).unwrap();
        assert_eq!(first.ref_count(), 3);
        drop(second);
        assert_eq!(first.ref_count(), 2);
    }
    assert_eq!(table.snapshot(child).unwrap().ref_count, 1);

    gate.open();
    host.join_all();
    assert!(table.get(child).is_none());
}
