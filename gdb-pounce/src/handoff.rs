//! Debugger handoff: spawn gdb (or strace) against a frozen pid, reap it,
//! and make sure the freeze is resolved exactly once.
//!
//! The controller walks IDLE → SPAWNING → RUNNING → REAPING → DONE for each
//! matched candidate. From SPAWNING onward the debugger owns the target:
//! attaching makes it responsible for continuing the task, and the controller
//! only steps back in if the debugger exits with the target still stopped.

use anyhow::{Context, Result};
use log::debug;
use nix::sys::signal::{kill, Signal};
use tokio::process::Command;

use crate::domain::Pid;
use crate::proc;

/// gdb prelude that keeps the debugger from halting on the very SIGSTOP used
/// to freeze the target
pub const GDB_SIGSTOP_PRELUDE: &str = "handle SIGSTOP nostop noprint nopass";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerKind {
    Gdb,
    Strace,
}

impl DebuggerKind {
    #[must_use]
    pub fn executable(self) -> &'static str {
        match self {
            Self::Gdb => "gdb",
            Self::Strace => "strace",
        }
    }

    /// Name used in the stderr contract lines
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gdb => "GDB",
            Self::Strace => "strace",
        }
    }
}

/// Composes and runs the debugger child for matched candidates
pub struct HandoffController {
    kind: DebuggerKind,
    extra_args: Vec<String>,
}

impl HandoffController {
    #[must_use]
    pub fn new(kind: DebuggerKind, extra_args: Vec<String>) -> Self {
        Self { kind, extra_args }
    }

    /// Full argv for the debugger child (without the executable itself)
    #[must_use]
    pub fn debugger_args(&self, pid: Pid) -> Vec<String> {
        let mut args = vec!["-p".to_string(), pid.to_string()];
        if self.kind == DebuggerKind::Gdb {
            args.push("-ex".to_string());
            args.push(GDB_SIGSTOP_PRELUDE.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// The `Starting ...` stderr line; the prelude argument is displayed
    /// single-quoted
    #[must_use]
    pub fn banner(&self, pid: Pid) -> String {
        let mut line = match self.kind {
            DebuggerKind::Gdb => format!("Starting gdb -p {pid} -ex '{GDB_SIGSTOP_PRELUDE}'"),
            DebuggerKind::Strace => format!("Starting strace -p {pid}"),
        };
        for arg in &self.extra_args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push_str("...");
        line
    }

    /// Run the full handoff for one matched, frozen candidate.
    ///
    /// On return the freeze is resolved: either the debugger continued the
    /// target, or a SIGCONT was sent from here.
    ///
    /// # Errors
    /// Returns an error if the debugger could not be spawned or reaped; the
    /// target is released first in either case.
    pub async fn run(&self, pid: Pid) -> Result<()> {
        eprintln!("{}", self.banner(pid));

        let child = Command::new(self.kind.executable()).args(self.debugger_args(pid)).spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                // Nothing attached, so the freeze is still ours to undo
                release(pid);
                return Err(e)
                    .with_context(|| format!("Failed to start {}", self.kind.executable()));
            }
        };

        // The debugger owns the target now. A shutdown request must not cut
        // this short: the child always runs to completion.
        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                release(pid);
                return Err(e).context("Failed to reap debugger");
            }
        };
        debug!("debugger exited with {status}");
        eprintln!("{} exited.", self.kind.display_name());

        // A debugger that quits without continuing the target (e.g. `q`
        // right after attach) leaves it stopped; one SIGCONT resolves that
        if proc::is_stopped(pid) {
            eprintln!(
                "{} left the process stopped - sending SIGCONT...",
                self.kind.display_name()
            );
            release(pid);
        }

        Ok(())
    }
}

/// Send SIGCONT, tolerating a target that has already exited
pub fn release(pid: Pid) {
    if let Err(e) = kill(nix::unistd::Pid::from_raw(pid.0), Signal::SIGCONT) {
        debug!("SIGCONT to {pid} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_gdb_banner_matches_contract() {
        let controller = HandoffController::new(
            DebuggerKind::Gdb,
            strings(&["-nx", "-batch", "-ex", "c", "-ex", "q"]),
        );
        assert_eq!(
            controller.banner(Pid(1234)),
            "Starting gdb -p 1234 -ex 'handle SIGSTOP nostop noprint nopass' \
             -nx -batch -ex c -ex q..."
        );
    }

    #[test]
    fn test_gdb_banner_without_extra_args() {
        let controller = HandoffController::new(DebuggerKind::Gdb, vec![]);
        assert_eq!(
            controller.banner(Pid(7)),
            "Starting gdb -p 7 -ex 'handle SIGSTOP nostop noprint nopass'..."
        );
    }

    #[test]
    fn test_strace_banner_omits_prelude() {
        let controller = HandoffController::new(DebuggerKind::Strace, vec![]);
        assert_eq!(controller.banner(Pid(42)), "Starting strace -p 42...");
    }

    #[test]
    fn test_gdb_args_carry_unquoted_prelude() {
        let controller = HandoffController::new(DebuggerKind::Gdb, strings(&["-nx"]));
        assert_eq!(
            controller.debugger_args(Pid(5)),
            strings(&["-p", "5", "-ex", GDB_SIGSTOP_PRELUDE, "-nx"])
        );
    }

    #[test]
    fn test_strace_args_have_no_gdb_prelude() {
        let controller = HandoffController::new(DebuggerKind::Strace, vec![]);
        assert_eq!(controller.debugger_args(Pid(5)), strings(&["-p", "5"]));
    }
}
