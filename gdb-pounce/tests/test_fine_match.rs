//! Fine-match pipeline exercised against a real process: the test binary
//! itself, observed through the same `/proc` reads the verifier uses.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

use gdb_pounce::domain::Pid;
use gdb_pounce::matcher::{MatchSpec, Verdict};
use gdb_pounce::proc;

fn self_pid() -> Pid {
    #[allow(clippy::cast_possible_wrap)]
    let pid = std::process::id() as i32;
    Pid(pid)
}

#[test]
fn test_fine_match_attaches_to_this_process() {
    let pid = self_pid();
    let exe = proc::exe_basename(pid).expect("Failed to resolve own exe");
    let cmdline = proc::read_cmdline(pid).expect("Failed to read own cmdline");

    let spec = MatchSpec::new(exe.to_str().expect("non-UTF-8 test binary name"), vec![], None);
    assert_eq!(spec.fine_match(&cmdline, &exe), Verdict::Attach);
}

#[test]
fn test_fine_match_rejects_wrong_basename() {
    let pid = self_pid();
    let exe = proc::exe_basename(pid).expect("Failed to resolve own exe");
    let cmdline = proc::read_cmdline(pid).expect("Failed to read own cmdline");

    let spec = MatchSpec::new("definitely-not-this-binary", vec![], None);
    assert_eq!(spec.fine_match(&cmdline, &exe), Verdict::RejectedBasename);
}

#[test]
fn test_fine_match_rejects_missing_argv_tail() {
    let pid = self_pid();
    let exe = proc::exe_basename(pid).expect("Failed to resolve own exe");
    let cmdline = proc::read_cmdline(pid).expect("Failed to read own cmdline");

    let spec = MatchSpec::new(
        exe.to_str().expect("non-UTF-8 test binary name"),
        vec!["no-such-trailing-arg".to_string()],
        None,
    );
    assert_eq!(spec.fine_match(&cmdline, &exe), Verdict::RejectedArgv);
}

#[test]
fn test_symlinked_invocation_resolves_to_real_basename() {
    // The kernel resolves /proc/<pid>/exe to the real file even when the
    // process was started through a symlink. Model the resolution with
    // canonicalize and check the verdict against the real basename.
    let real_exe = std::env::current_exe().expect("Failed to find own exe");
    let real_basename = real_exe.file_name().expect("exe has no basename").to_os_string();

    let dir = tempfile::tempdir().expect("Failed to create tempdir");
    let link = dir.path().join("hello2");
    std::os::unix::fs::symlink(&real_exe, &link).expect("Failed to create symlink");

    let resolved = std::fs::canonicalize(&link).expect("Failed to canonicalize symlink");
    let resolved_basename = resolved.file_name().expect("resolved path has no basename");
    assert_eq!(resolved_basename, real_basename.as_os_str());

    // A spec naming the real program matches the symlinked invocation
    let spec = MatchSpec::new(
        real_basename.to_str().expect("non-UTF-8 test binary name"),
        vec![],
        None,
    );
    let cmdline = vec![OsStr::new("hello2").as_bytes().to_vec()];
    assert_eq!(spec.fine_match(&cmdline, resolved_basename), Verdict::Attach);
}
