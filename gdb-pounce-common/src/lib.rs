#![no_std]

// Shared data structures between eBPF and userspace

/// Length of the kernel's per-task program name, including the trailing NUL.
pub const TASK_COMM_LEN: usize = 16;

/// Coarse filter verdicts carried in [`ExecEvent::filter_result`]
///
/// `FILTER_COARSE_MATCH`: the kernel probe confirmed the comm-prefix and uid
/// predicates and froze the task with SIGSTOP. Userspace owns the rest of the
/// decision and must release or hand off the task.
pub const FILTER_COARSE_MATCH: u32 = 1;
/// `FILTER_MISMATCH_BPF`: the kernel-side predicates rejected the task. It was
/// never frozen; the event exists only so userspace can report the rejection.
pub const FILTER_MISMATCH_BPF: u32 = 2;

/// Key of the single [`MatchFilter`] slot in the `FILTER` map.
pub const FILTER_KEY: u32 = 0;

/// Key of the single drop-counter slot in the `DROPPED_EVENTS` map.
pub const DROP_COUNTER_KEY: u32 = 0;

/// One record per observed exec, sent from eBPF to userspace
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecEvent {
    pub pid: u32,           // Task (thread) ID that ran exec
    pub tgid: u32,          // Thread-group ID
    pub uid: u32,           // Real UID of the task
    pub filter_result: u32, // FILTER_COARSE_MATCH or FILTER_MISMATCH_BPF
    pub comm: [u8; TASK_COMM_LEN], // New image's comm, NUL-padded
}

/// Coarse filter parameters, written once by userspace before the probe
/// attaches and read-only afterwards
///
/// `comm_prefix` holds at most `TASK_COMM_LEN - 1` meaningful bytes: the
/// kernel truncates program names to 15 bytes + NUL, which is why the
/// kernel-side match is a prefix match rather than an equality check.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MatchFilter {
    pub comm_prefix: [u8; TASK_COMM_LEN],
    pub comm_prefix_len: u32,
    pub uid: u32,
    pub uid_filter: u32, // 0 = match any uid, 1 = require `uid`
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
}

/// Tracepoint arguments for `syscalls:sys_exit_execve` / `sys_exit_execveat`
/// Layout from `/sys/kernel/tracing/events/syscalls/sys_exit_execve/format`
#[repr(C)]
pub struct SysExitArgs {
    #[allow(clippy::pub_underscore_fields)]
    pub __unused__: u64,
    pub syscall_nr: i32,
    #[allow(clippy::pub_underscore_fields)]
    pub _pad: i32,
    pub ret: i64,
}

#[cfg(feature = "user")]
use aya::Pod;

// These unsafe impls are required for eBPF <-> userspace communication
// Pod trait ensures types can be safely transmitted as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ExecEvent {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for MatchFilter {}
