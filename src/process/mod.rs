/*!
 * Process Module
 * Process lifecycle: pid allocation, control blocks, fork, exit and wait
 */

pub mod children;
pub mod context;
pub mod host;
pub mod hosted;
pub mod pcb;
pub mod pidmap;
pub mod status;
pub mod table;
pub mod wait;

// Re-export for convenience
pub use children::{ChildRegistry, Rearranged};
pub use context::{KernelContext, ProcessContext, Terminated};
pub use host::{TaskHost, ThreadEntry};
pub use hosted::{HostCounters, HostedTask, ThreadHost};
pub use pcb::{ProcessControlBlock, ProcessState};
pub use pidmap::PidMap;
pub use status::{ExitStatus, WaitStatus};
pub use table::{ProcessInfo, ProcessRef, ProcessTable, ShutdownReport, TableStats};
pub use wait::ExitPath;
