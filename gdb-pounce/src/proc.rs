//! `/proc` access for candidate verification.
//!
//! Everything here reads the *new* image's view: the syscall-exit tracepoint
//! fires after the kernel has committed the exec, so `cmdline` and `exe` are
//! already those of the program being caught.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;

use crate::domain::Pid;

/// Read `/proc/<pid>/cmdline`: the NUL-separated argv of the new image
///
/// # Errors
/// Propagates the read error; a vanished target surfaces as
/// `NotFound`/`ESRCH` (see [`vanished`]).
pub fn read_cmdline(pid: Pid) -> io::Result<Vec<Vec<u8>>> {
    let bytes = fs::read(format!("/proc/{pid}/cmdline"))?;
    let mut tokens: Vec<Vec<u8>> = bytes.split(|&b| b == 0).map(<[u8]>::to_vec).collect();
    // argv is NUL-terminated, so the split leaves one empty trailing token
    if tokens.last().is_some_and(Vec::is_empty) {
        tokens.pop();
    }
    Ok(tokens)
}

/// Basename of the canonical executable path behind `/proc/<pid>/exe`
///
/// The kernel resolves the link target itself, so a program started through
/// a symlink reports the real path here.
///
/// # Errors
/// Propagates the `readlink` error, or `InvalidData` for a path without a
/// final component.
pub fn exe_basename(pid: Pid) -> io::Result<OsString> {
    let path = fs::read_link(format!("/proc/{pid}/exe"))?;
    path.file_name()
        .map(OsStr::to_os_string)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "exe path has no basename"))
}

/// Whether the target is currently in a stopped state (`T`, or `t` while
/// under a tracer)
#[must_use]
pub fn is_stopped(pid: Pid) -> bool {
    matches!(task_state(pid), Ok('T' | 't'))
}

/// Task state letter from `/proc/<pid>/stat`
///
/// # Errors
/// Propagates the read error, or `InvalidData` for an unparseable line.
pub fn task_state(pid: Pid) -> io::Result<char> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat"))?;
    parse_state(&stat)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparseable stat line"))
}

/// The state field follows the parenthesized comm; comm may itself contain
/// `)` and spaces, so scan from the last `)`
fn parse_state(stat: &str) -> Option<char> {
    let close = stat.rfind(')')?;
    stat[close + 1..].split_whitespace().next()?.chars().next()
}

/// True when an error means the target is gone rather than unreadable
#[must_use]
pub fn vanished(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESRCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_simple() {
        let stat = "1234 (hello) T 1 1234 1234 0 -1 4194304";
        assert_eq!(parse_state(stat), Some('T'));
    }

    #[test]
    fn test_parse_state_comm_with_parens_and_spaces() {
        // Command names can contain parentheses
        let stat = "1234 (app (v2) x) S 1 1234";
        assert_eq!(parse_state(stat), Some('S'));
    }

    #[test]
    fn test_parse_state_garbage() {
        assert_eq!(parse_state("not a stat line"), None);
    }

    #[test]
    fn test_read_cmdline_of_self() {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid(std::process::id() as i32);
        let cmdline = read_cmdline(pid).unwrap();
        assert!(!cmdline.is_empty());
        // argv[0] of a test binary always names the test executable
        assert!(!cmdline[0].is_empty());
    }

    #[test]
    fn test_exe_basename_of_self() {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid(std::process::id() as i32);
        let exe = exe_basename(pid).unwrap();
        assert!(!exe.is_empty());
    }

    #[test]
    fn test_task_state_of_self_is_not_stopped() {
        // The group leader may be running or sleeping while the test thread
        // does the read, but it is certainly not stopped
        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid(std::process::id() as i32);
        assert!(matches!(task_state(pid).unwrap(), 'R' | 'S'));
        assert!(!is_stopped(pid));
    }

    #[test]
    fn test_vanished_on_missing_pid() {
        let err = read_cmdline(Pid(i32::MAX - 1)).unwrap_err();
        assert!(vanished(&err));
    }
}
