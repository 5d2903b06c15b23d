//! # gdb-pounce - eBPF Kernel-Side Exec Watcher
//!
//! This program runs **inside the Linux kernel**, attached to the syscall-exit
//! tracepoints for `execve` and `execveat`. It fires in the execing task's own
//! kernel context, after the kernel has committed the new program image but
//! before the task returns to userspace - the only instant at which the task
//! can be stopped without racing its first instruction.
//!
//! ## What happens on each successful exec
//!
//! 1. Read the syscall return value; a failed exec keeps the old image and is
//!    ignored.
//! 2. Read the new image's `comm` (kernel-truncated to 15 bytes + NUL) and the
//!    task's real uid.
//! 3. Consult the read-only `FILTER` map: comm prefix + optional uid. This is
//!    the *coarse* filter - the verifier cannot prove argv or `/proc` reads
//!    safe in this context, so full matching happens in userspace.
//! 4. Reserve ring-buffer space. Reservation comes FIRST: if the buffer is
//!    full the event is dropped and SIGSTOP must not be sent, otherwise the
//!    task would stay frozen with no userspace record of it.
//! 5. On a coarse match, `bpf_send_signal(SIGSTOP)` freezes the current task.
//!    The pending signal is processed on return to userspace, before the new
//!    image executes its first instruction.
//! 6. Submit the event. Coarse mismatches are submitted too (unfrozen), so
//!    userspace can report kernel-stage rejections.
//!
//! ## Maps
//!
//! - **`EVENTS` (RingBuf, 256KB)**: one `ExecEvent` per observed exec.
//! - **`FILTER` (HashMap, 1 entry)**: `MatchFilter` written once by userspace
//!   before attach; read-only afterwards. Safe to read lock-free from any CPU.
//! - **`DROPPED_EVENTS` (HashMap, 1 entry)**: count of events lost to a full
//!   ring buffer, reported by userspace at shutdown.
//!
//! ## Compilation
//!
//! Built with `cargo xtask build-ebpf` for the `bpfel-unknown-none` target,
//! always in release mode, and embedded into the userspace binary.

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid},
    macros::{map, tracepoint},
    maps::{HashMap, RingBuf},
    programs::TracePointContext,
    EbpfContext,
};
use aya_log_ebpf::debug;
use gdb_pounce_common::{
    ExecEvent, MatchFilter, SysExitArgs, DROP_COUNTER_KEY, FILTER_COARSE_MATCH, FILTER_KEY,
    FILTER_MISMATCH_BPF, TASK_COMM_LEN,
};

// bpf_send_signal has no curated wrapper in aya-ebpf yet
use aya_ebpf_bindings::helpers::bpf_send_signal;

const SIGSTOP: u32 = 19;

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Ring buffer for sending exec events to userspace (lock-free, SMP-safe)
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0); // 256KB buffer

/// Coarse filter parameters: comm prefix and optional uid
///
/// Populated once by userspace before the tracepoints attach, never written
/// afterwards. Different tasks may exec in parallel on multiple CPUs, so this
/// read-only discipline is what makes lock-free access sound.
#[map]
static FILTER: HashMap<u32, MatchFilter> = HashMap::with_max_entries(1, 0);

/// Count of events dropped because the ring buffer was full
#[map]
static DROPPED_EVENTS: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

// ============================================================================
// eBPF Program Hooks
// ============================================================================

/// Hook: syscalls:sys_exit_execve
#[tracepoint]
pub fn execve_exit(ctx: TracePointContext) -> u32 {
    match try_exec_exit(&ctx) {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Hook: syscalls:sys_exit_execveat
#[tracepoint]
pub fn execveat_exit(ctx: TracePointContext) -> u32 {
    match try_exec_exit(&ctx) {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

fn try_exec_exit(ctx: &TracePointContext) -> Result<(), i64> {
    // Read the tracepoint arguments
    // Layout from /sys/kernel/tracing/events/syscalls/sys_exit_execve/format
    let args: *const SysExitArgs = ctx.as_ptr() as *const SysExitArgs;
    let ret = unsafe { (*args).ret };

    // A failed exec keeps the old image running; nothing to catch
    if ret != 0 {
        return Ok(());
    }

    // Filter not populated yet means userspace is still setting up
    let Some(filter) = (unsafe { FILTER.get(&FILTER_KEY).copied() }) else {
        return Ok(());
    };

    // comm is already the NEW image's name at syscall exit
    let comm = bpf_get_current_comm()?;
    let uid = (unsafe { bpf_get_current_uid_gid() }) as u32;
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };

    let matched = comm_prefix_matches(&comm, &filter) && uid_matches(uid, &filter);

    // Reserve ring space BEFORE freezing. If the buffer is full the event is
    // dropped and the SIGSTOP must not be issued - a frozen task with no
    // userspace record would never be released.
    let Some(mut entry) = EVENTS.reserve::<ExecEvent>(0) else {
        count_drop();
        debug!(ctx, "ring buffer full, dropping exec event for pid {}", pid_tgid as u32);
        return Err(1);
    };

    if matched {
        let rc = unsafe { bpf_send_signal(SIGSTOP) };
        if rc != 0 {
            // The task is not frozen; an event claiming otherwise would make
            // userspace release or attach to a still-running task
            entry.discard(0);
            return Err(rc);
        }
    }

    entry.write(ExecEvent {
        pid: pid_tgid as u32,
        tgid: (pid_tgid >> 32) as u32,
        uid,
        filter_result: if matched { FILTER_COARSE_MATCH } else { FILTER_MISMATCH_BPF },
        comm,
    });
    entry.submit(0);

    Ok(())
}

// Helper: comm starts with the configured prefix over comm_prefix_len bytes
fn comm_prefix_matches(comm: &[u8; TASK_COMM_LEN], filter: &MatchFilter) -> bool {
    let len = filter.comm_prefix_len as usize;
    // Userspace clamps the prefix to 15 bytes; the bound keeps the loop
    // provable for the verifier
    if len > TASK_COMM_LEN - 1 {
        return false;
    }
    for i in 0..TASK_COMM_LEN - 1 {
        if i >= len {
            break;
        }
        if comm[i] != filter.comm_prefix[i] {
            return false;
        }
    }
    true
}

// Helper: uid filter absent, or task uid equals the configured uid
fn uid_matches(uid: u32, filter: &MatchFilter) -> bool {
    filter.uid_filter == 0 || uid == filter.uid
}

fn count_drop() {
    unsafe {
        let current = DROPPED_EVENTS.get(&DROP_COUNTER_KEY).copied().unwrap_or(0);
        let _ = DROPPED_EVENTS.insert(&DROP_COUNTER_KEY, &(current + 1), 0);
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
