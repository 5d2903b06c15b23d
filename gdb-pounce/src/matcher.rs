//! Match predicate: the `MatchSpec` built once at startup and the fine-match
//! decision applied to every frozen candidate.
//!
//! Matching is split in two. The kernel probe applies the *coarse* half (comm
//! prefix + uid) because that is all its restricted environment can prove
//! safe; the coarse match set is a superset of the true match set. The fine
//! half here reads the candidate's argv and resolved executable path from
//! `/proc` and is authoritative.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use gdb_pounce_common::{MatchFilter, TASK_COMM_LEN};
use nix::unistd::User;

use crate::domain::{PounceError, Uid};

/// Immutable description of what to pounce on
#[derive(Debug, Clone)]
pub struct MatchSpec {
    /// First free CLI token, matched against the resolved basename of
    /// `/proc/<pid>/exe`
    pub exe_basename: OsString,
    /// Trailing argv tokens that must appear, in order, at the end of the
    /// target's argv; empty means any argv
    pub argv_suffix: Vec<OsString>,
    /// Optional uid restriction
    pub uid: Option<Uid>,
}

/// Outcome of fine matching a frozen candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// All predicates hold; hand the task to the debugger
    Attach,
    /// The argv tail does not match. Reported with the kernel-stage label
    /// ("filtered by BPF")
    RejectedArgv,
    /// The resolved executable basename does not match. Resolving the
    /// `/proc/<pid>/exe` symlink is a userspace-only capability, so this is
    /// reported with the userspace-stage label ("filtered by Python")
    RejectedBasename,
}

impl MatchSpec {
    #[must_use]
    pub fn new(program: &str, argv_suffix: Vec<String>, uid: Option<Uid>) -> Self {
        Self {
            exe_basename: OsString::from(program),
            argv_suffix: argv_suffix.into_iter().map(OsString::from).collect(),
            uid,
        }
    }

    /// Kernel-side coarse filter derived from this spec
    ///
    /// The prefix is the first 15 bytes of the program name: comm itself is
    /// truncated there by the kernel, so prefix matching is the strongest
    /// check available in-kernel.
    #[must_use]
    pub fn kernel_filter(&self) -> MatchFilter {
        let bytes = self.exe_basename.as_bytes();
        let len = bytes.len().min(TASK_COMM_LEN - 1);
        let mut comm_prefix = [0u8; TASK_COMM_LEN];
        comm_prefix[..len].copy_from_slice(&bytes[..len]);

        #[allow(clippy::cast_possible_truncation)]
        let comm_prefix_len = len as u32;
        MatchFilter {
            comm_prefix,
            comm_prefix_len,
            uid: self.uid.map_or(0, |uid| uid.0),
            uid_filter: u32::from(self.uid.is_some()),
            _padding: 0,
        }
    }

    /// Apply the full predicate to the candidate's argv and resolved
    /// executable basename. The argv predicate is checked first: when both
    /// fail, the rejection is attributed to the kernel stage.
    #[must_use]
    pub fn fine_match(&self, cmdline: &[Vec<u8>], exe_basename: &OsStr) -> Verdict {
        if !self.argv_tail_matches(cmdline) {
            return Verdict::RejectedArgv;
        }
        if exe_basename.as_bytes() != self.exe_basename.as_bytes() {
            return Verdict::RejectedBasename;
        }
        Verdict::Attach
    }

    fn argv_tail_matches(&self, cmdline: &[Vec<u8>]) -> bool {
        if self.argv_suffix.is_empty() {
            return true;
        }
        if cmdline.len() < self.argv_suffix.len() {
            return false;
        }
        let tail = &cmdline[cmdline.len() - self.argv_suffix.len()..];
        tail.iter().zip(&self.argv_suffix).all(|(got, want)| got.as_slice() == want.as_bytes())
    }
}

/// Resolve `--uid`: a numeric id, or a name looked up in the user database
///
/// # Errors
/// Returns [`PounceError::UnknownUser`] when the value is neither numeric nor
/// a known user name.
pub fn resolve_uid(value: &str) -> Result<Uid, PounceError> {
    if let Ok(numeric) = value.parse::<u32>() {
        return Ok(Uid(numeric));
    }
    match User::from_name(value) {
        Ok(Some(user)) => Ok(Uid(user.uid.as_raw())),
        _ => Err(PounceError::UnknownUser(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<Vec<u8>> {
        tokens.iter().map(|t| t.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_comm_prefix_is_first_fifteen_bytes() {
        let spec = MatchSpec::new("AAAAAAAAAAAAAAAA", vec![], None); // 16 bytes
        let filter = spec.kernel_filter();
        assert_eq!(filter.comm_prefix_len, 15);
        assert_eq!(&filter.comm_prefix[..15], "AAAAAAAAAAAAAAA".as_bytes());
        assert_eq!(filter.comm_prefix[15], 0);
    }

    #[test]
    fn test_short_name_keeps_full_prefix() {
        let spec = MatchSpec::new("vim", vec![], None);
        let filter = spec.kernel_filter();
        assert_eq!(filter.comm_prefix_len, 3);
        assert_eq!(&filter.comm_prefix[..3], b"vim");
    }

    #[test]
    fn test_uid_filter_encoding() {
        let without = MatchSpec::new("vim", vec![], None).kernel_filter();
        assert_eq!(without.uid_filter, 0);

        let with = MatchSpec::new("vim", vec![], Some(Uid(1000))).kernel_filter();
        assert_eq!(with.uid_filter, 1);
        assert_eq!(with.uid, 1000);
    }

    #[test]
    fn test_empty_suffix_matches_any_argv() {
        let spec = MatchSpec::new("hello", vec![], None);
        let verdict = spec.fine_match(&argv(&["hello", "foo", "bar", "baz"]), OsStr::new("hello"));
        assert_eq!(verdict, Verdict::Attach);
    }

    #[test]
    fn test_argv_tail_must_match_in_order() {
        let spec = MatchSpec::new("hello", vec!["bar".into(), "baz".into()], None);
        assert_eq!(
            spec.fine_match(&argv(&["hello", "foo", "bar", "baz"]), OsStr::new("hello")),
            Verdict::Attach
        );
        assert_eq!(
            spec.fine_match(&argv(&["hello", "baz", "bar"]), OsStr::new("hello")),
            Verdict::RejectedArgv
        );
    }

    #[test]
    fn test_argv_suffix_longer_than_argv_rejects() {
        let spec = MatchSpec::new("hello", vec!["a".into(), "b".into(), "c".into()], None);
        assert_eq!(
            spec.fine_match(&argv(&["hello", "c"]), OsStr::new("hello")),
            Verdict::RejectedArgv
        );
    }

    #[test]
    fn test_basename_mismatch_is_userspace_stage() {
        // 15-byte spec vs a 16-byte on-disk name: coarse comm check passes,
        // only the resolved basename can tell them apart
        let spec = MatchSpec::new("AAAAAAAAAAAAAAA", vec![], None);
        assert_eq!(
            spec.fine_match(&argv(&["AAAAAAAAAAAAAAAA"]), OsStr::new("AAAAAAAAAAAAAAAA")),
            Verdict::RejectedBasename
        );
    }

    #[test]
    fn test_argv_attribution_wins_over_basename() {
        let spec = MatchSpec::new("hello", vec!["quux".into()], None);
        assert_eq!(
            spec.fine_match(&argv(&["other", "foo"]), OsStr::new("other")),
            Verdict::RejectedArgv
        );
    }

    #[test]
    fn test_resolve_uid_numeric() {
        assert_eq!(resolve_uid("1000").unwrap(), Uid(1000));
    }

    #[test]
    fn test_resolve_uid_root_by_name() {
        assert_eq!(resolve_uid("root").unwrap(), Uid(0));
    }

    #[test]
    fn test_resolve_uid_unknown_name() {
        assert!(resolve_uid("no-such-user-zz9").is_err());
    }
}
