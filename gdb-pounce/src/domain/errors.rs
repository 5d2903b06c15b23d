//! Structured error types for gdb-pounce
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PounceError {
    #[error("eBPF map {0} not found")]
    MapMissing(&'static str),

    #[error("eBPF program {0} not found")]
    ProgramMissing(&'static str),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Aya(#[from] aya::EbpfError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_missing_display() {
        let err = PounceError::MapMissing("EVENTS");
        assert_eq!(err.to_string(), "eBPF map EVENTS not found");
    }

    #[test]
    fn test_unknown_user_display() {
        let err = PounceError::UnknownUser("nosuchuser".to_string());
        assert!(err.to_string().contains("nosuchuser"));
    }
}
