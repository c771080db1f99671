/*!
 * Syscall Layer Tests
 * Return-value and errno conventions of the process syscalls
 */

use crate::support::{boot, TIMEOUT};
use kproc::{
    sys_exit, sys_fork, sys_getpid, sys_waitpid, Errno, ExitPath, ExitStatus, ProcessError,
    SyscallResult, WaitStatus, KERNEL_PID,
};
use pretty_assertions::assert_eq;
use std::sync::mpsc;

#[test]
fn test_fork_wait_exit_round_trip() {
    let (table, host) = boot(16);
    let (tx, rx) = mpsc::channel();

    let parent = table
        .kernel_context()
        .fork(move |ctx| {
            let me = sys_getpid(&ctx);
            let forked = sys_fork(&ctx, |child| sys_exit(child, 7));

            let mut raw = 0;
            let waited = sys_waitpid(&ctx, forked.retval, Some(&mut raw), 0);
            let again = sys_waitpid(&ctx, forked.retval, None, 0);
            let bad_options = sys_waitpid(&ctx, forked.retval, None, 2);

            tx.send((me, forked, waited, raw, again, bad_options)).unwrap();
            sys_exit(ctx, 0)
        })
        .unwrap();

    let (me, forked, waited, raw, again, bad_options) = rx.recv_timeout(TIMEOUT).unwrap();
    host.join_all();

    assert_eq!(me, SyscallResult::ok(parent as i32));
    assert!(forked.is_ok());
    assert!(forked.retval > parent as i32);
    assert_eq!(waited, SyscallResult::ok(forked.retval));
    assert!(WaitStatus(raw).exited());
    assert_eq!(WaitStatus(raw).exit_code(), 7);
    assert_eq!(again, SyscallResult::err(Errno::ESRCH));
    assert_eq!(bad_options, SyscallResult::err(Errno::EINVAL));
    assert_eq!(table.live_pids(), vec![KERNEL_PID]);
}

#[test]
fn test_exit_token_reports_path() {
    let (table, host) = boot(16);
    let (tx, rx) = mpsc::channel();

    table
        .kernel_context()
        .fork(move |ctx| {
            let forked = sys_fork(&ctx, move |child| {
                let terminated = child.exit(ExitStatus::Exited(1));
                tx.send(terminated).unwrap();
                terminated
            });
            let waited = sys_waitpid(&ctx, forked.retval, None, 0);
            assert!(waited.is_ok());
            sys_exit(ctx, 0)
        })
        .unwrap();

    let terminated = rx.recv_timeout(TIMEOUT).unwrap();
    host.join_all();
    assert_eq!(terminated.path(), Some(ExitPath::Zombie));
    assert_ne!(terminated.pid(), KERNEL_PID);
    assert!(table.get(terminated.pid()).is_none());
}

#[test]
fn test_fork_after_shutdown_is_einval() {
    let (table, host) = boot(16);
    let kernel = table.kernel_context();

    let report = table.shutdown();
    assert!(report.leaked.is_empty());
    assert_eq!(host.live_tasks(), 0);

    let err = kernel
        .fork(|ctx| ctx.exit(ExitStatus::Exited(0)))
        .unwrap_err();
    assert_eq!(err, ProcessError::ShutDown);
    assert_eq!(err.errno(), Errno::EINVAL);
    assert!(table.get(KERNEL_PID).is_none());
}
