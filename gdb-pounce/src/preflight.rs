//! Pre-flight checks for gdb-pounce
//!
//! Catching an exec takes more than a loadable probe: the kernel must offer
//! the BPF ring buffer and the signal-sending helper, the exec tracepoints
//! must be visible, and only root gets to wire any of it up. Checking up
//! front turns obscure load/attach failures into actionable messages.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::probe::EXEC_TRACEPOINTS;

/// The BPF ring buffer (5.8) is the newest kernel feature in use;
/// `bpf_send_signal` (5.3) and the exec exit tracepoints are older
const MIN_KERNEL: (u32, u32) = (5, 8);

const TRACEFS_MOUNT_POINTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Run all pre-flight checks before eBPF loading
pub fn run_preflight_checks() -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_exec_tracepoints()?;
    Ok(())
}

/// Loading the probe, freezing arbitrary tasks and reading any pid's
/// `/proc` entries all take root; unprivileged BPF would not get past the
/// first of those
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        bail!(
            "gdb-pounce must run as root: it loads an eBPF program and sends\n\
             signals to arbitrary processes.\n\
             Try: sudo gdb-pounce ..."
        );
    }
    Ok(())
}

/// Reject kernels that predate the BPF ring buffer
fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("Failed to read /proc/sys/kernel/osrelease")?;

    match parse_release(&release) {
        Some(version) if version < MIN_KERNEL => bail!(
            "Kernel {} lacks the BPF ring buffer (gdb-pounce needs Linux {}.{} or newer).",
            release.trim(),
            MIN_KERNEL.0,
            MIN_KERNEL.1
        ),
        // An unparseable release string gets the benefit of the doubt; a
        // kernel that is actually too old fails at probe load with its own
        // error
        _ => Ok(()),
    }
}

/// `"6.1.0-arch1-1"` -> `(6, 1)`
fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check that the exec syscall-exit tracepoints exist on this kernel
fn check_exec_tracepoints() -> Result<()> {
    for &(_, category, name) in EXEC_TRACEPOINTS {
        if !tracepoint_exists(category, name) {
            bail!(
                "Tracepoint {category}:{name} not available.\n\
                 gdb-pounce requires the syscall exit tracepoints.\n\
                 Is tracefs mounted? Check: ls /sys/kernel/tracing/events/{category}"
            );
        }
    }
    Ok(())
}

fn tracepoint_exists(category: &str, name: &str) -> bool {
    TRACEFS_MOUNT_POINTS
        .iter()
        .any(|base| Path::new(base).join("events").join(category).join(name).exists())
}
