//! Candidate verification: consumes exec events, applies the authoritative
//! match predicate, and routes each frozen task to handoff or release.
//!
//! The loop guarantee: every `FILTER_COARSE_MATCH` event leaves here with its
//! freeze resolved - handed to a debugger, released with SIGCONT, or the
//! target has already exited. Mismatch events carry no freeze at all.

use log::{debug, error};

use gdb_pounce_common::{ExecEvent, FILTER_COARSE_MATCH, FILTER_MISMATCH_BPF};

use crate::domain::Pid;
use crate::handoff::{release, HandoffController};
use crate::matcher::{MatchSpec, Verdict};
use crate::proc;

/// Per-event decision state: the match spec and the first-match latch
pub struct Verifier {
    spec: MatchSpec,
    follow_forks: bool,
    matched_once: bool,
}

impl Verifier {
    #[must_use]
    pub fn new(spec: MatchSpec, follow_forks: bool) -> Self {
        Self { spec, follow_forks, matched_once: false }
    }

    /// Handle one event end-to-end. Per-event failures are absorbed here so
    /// the engine stays live.
    pub async fn process(&mut self, event: &ExecEvent, handoff: &HandoffController) {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid(event.pid as i32);
        match event.filter_result {
            FILTER_MISMATCH_BPF => {
                // Task was never frozen; nothing to release
                eprintln!("Skipping non-matching pid {pid} (filtered by BPF)...");
            }
            FILTER_COARSE_MATCH => self.process_frozen(pid, handoff).await,
            other => debug!("unknown filter_result {other} for pid {pid}"),
        }
    }

    async fn process_frozen(&mut self, pid: Pid, handoff: &HandoffController) {
        if self.matched_once && !self.follow_forks {
            // Already attached once; later candidates are just let go
            release(pid);
            debug!("released pid {pid}: first match already handled");
            return;
        }

        let cmdline = match proc::read_cmdline(pid) {
            Ok(cmdline) => cmdline,
            Err(e) => {
                self.absorb_proc_error(pid, &e);
                return;
            }
        };
        let exe = match proc::exe_basename(pid) {
            Ok(exe) => exe,
            Err(e) => {
                self.absorb_proc_error(pid, &e);
                return;
            }
        };

        match self.spec.fine_match(&cmdline, &exe) {
            Verdict::Attach => {
                self.matched_once = true;
                if let Err(e) = handoff.run(pid).await {
                    error!("{e:#}");
                }
            }
            Verdict::RejectedArgv => {
                eprintln!("Skipping non-matching pid {pid} (filtered by BPF)...");
                release(pid);
            }
            Verdict::RejectedBasename => {
                eprintln!("Skipping non-matching pid {pid} (filtered by Python)...");
                release(pid);
            }
        }
    }

    /// A `/proc` read failed mid-decision. A vanished target took its freeze
    /// with it; anything else is released, since an undecidable candidate
    /// must not stay stopped.
    fn absorb_proc_error(&self, pid: Pid, err: &std::io::Error) {
        if proc::vanished(err) {
            debug!("pid {pid} exited before verification");
        } else {
            debug!("cannot verify pid {pid}: {err}");
            release(pid);
        }
    }

    /// Shutdown path for events drained after SIGINT: only the release half
    /// of the decision, no matching, no contract output
    pub fn release_frozen(&self, event: &ExecEvent) {
        if event.filter_result == FILTER_COARSE_MATCH {
            #[allow(clippy::cast_possible_wrap)]
            release(Pid(event.pid as i32));
        }
    }
}
