// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod handoff;
pub mod matcher;
pub mod preflight;
pub mod probe;
pub mod proc;
pub mod verifier;
