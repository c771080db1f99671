/*!
 * System Limits and Constants
 *
 * Centralized location for the fixed sizes of the process core.
 */

// =============================================================================
// PID SPACE
// =============================================================================

/// Default number of pid slots, kernel included
pub const MAX_PROCESS_COUNT: usize = 1024;

/// Upper bound accepted for a configured pid space
/// Pids are handed to user code as `i32`
pub const MAX_PID_SPACE: usize = 1 << 20;

/// Smallest usable pid space: the kernel plus one user process
pub const MIN_PID_SPACE: usize = 2;

/// Bits per bitmap word in the pid allocator
pub const PIDMAP_WORD_BITS: usize = u64::BITS as usize;

// =============================================================================
// KERNEL PROCESS
// =============================================================================

/// Name given to the kernel's control block at bootstrap
pub const KERNEL_PROCESS_NAME: &str = "[kernel]";

/// Prefix for host thread names of forked processes
pub const PROCESS_THREAD_PREFIX: &str = "pid";
