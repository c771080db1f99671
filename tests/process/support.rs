/*!
 * Shared helpers for process tests
 */

use kproc::{ProcessTable, ProcessTableConfig, ThreadHost};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn boot(capacity: usize) -> (Arc<ProcessTable>, Arc<ThreadHost>) {
    let host = Arc::new(ThreadHost::new());
    let table = ProcessTable::init(
        ProcessTableConfig::default().with_max_processes(capacity),
        host.clone(),
    )
    .expect("table boots");
    (table, host)
}

/// Spin until `condition` holds, failing the test after [`TIMEOUT`]
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// One-shot latch that holds processes in place until opened
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, cv) = &*self.inner;
        *open.lock() = true;
        cv.notify_all();
    }

    pub fn pass(&self) {
        let (open, cv) = &*self.inner;
        let mut open = open.lock();
        while !*open {
            cv.wait(&mut open);
        }
    }
}
