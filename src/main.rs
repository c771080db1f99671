/*!
 * Process Lifecycle Kernel - Main Entry Point
 *
 * Boots a process table on host threads and runs a small workload:
 * - init forks a batch of workers and reaps them
 * - one worker leaves an orphan behind for the kernel to adopt
 * - final table statistics are printed as JSON
 */

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use kproc::monitoring::init_tracing;
use kproc::{
    sys_exit, sys_fork, sys_getpid, sys_waitpid, ProcessContext, ProcessTable,
    ProcessTableConfig, Terminated, ThreadHost, WaitStatus,
};

const WORKERS: i32 = 4;

fn orphan(ctx: ProcessContext) -> Terminated {
    info!(pid = ctx.pid(), parent = ?ctx.parent_pid(), "orphan running");
    sys_exit(ctx, 0)
}

fn worker(ctx: ProcessContext, code: i32) -> Terminated {
    let pid = sys_getpid(&ctx).retval;
    if code == 0 {
        let forked = sys_fork(&ctx, orphan);
        if !forked.is_ok() {
            warn!(pid, errno = ?forked.errno, "worker could not fork");
        }
    }
    info!(pid, code, "worker exiting");
    sys_exit(ctx, code)
}

fn init(ctx: ProcessContext) -> Terminated {
    let mut children = Vec::new();
    for code in 0..WORKERS {
        let forked = sys_fork(&ctx, move |child| worker(child, code));
        match forked.errno {
            None => children.push((forked.retval, code)),
            Some(errno) => warn!(%errno, "init could not fork"),
        }
    }

    let mut failures = 0;
    for (pid, expected) in children {
        let mut status = 0;
        let waited = sys_waitpid(&ctx, pid, Some(&mut status), 0);
        let status = WaitStatus(status);
        if waited.retval != pid || !status.exited() || status.exit_code() != expected {
            warn!(pid, ?waited, raw = status.0, "unexpected wait result");
            failures += 1;
        } else {
            info!(pid, code = status.exit_code(), "worker reaped");
        }
    }

    sys_exit(ctx, failures)
}

fn main() -> Result<()> {
    init_tracing();

    let config = ProcessTableConfig::from_env().context("reading process table config")?;
    let host = Arc::new(ThreadHost::new());
    let table = ProcessTable::init(config, host.clone()).context("booting process table")?;

    let kernel = table.kernel_context();
    let init_pid = kernel.fork(init).context("starting init")?;
    info!(pid = init_pid, "init started");

    host.join_all();

    let stats = table.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let report = table.shutdown();
    let counters = host.counters();
    info!(?counters, "host counters");
    if !report.leaked.is_empty() {
        bail!("processes leaked at shutdown: {:?}", report.leaked);
    }
    Ok(())
}
