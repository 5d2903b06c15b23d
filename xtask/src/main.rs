//! Build helper for the kernel-side probe, which a plain `cargo build`
//! cannot produce: it targets `bpfel-unknown-none` and needs core rebuilt
//! for that target.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::Command;

#[derive(Parser)]
enum Cmd {
    /// Compile the eBPF probe and leave the bytecode under target/
    BuildEbpf {
        /// BPF target triple
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Probe package to build
        #[arg(long, default_value = "gdb-pounce-ebpf")]
        package: String,
    },
}

fn main() -> Result<()> {
    match Cmd::parse() {
        Cmd::BuildEbpf { target, package } => build_ebpf(&target, &package),
    }
}

fn build_ebpf(target: &str, package: &str) -> Result<()> {
    // --release unconditionally: debug builds drag in core formatting
    // machinery the BPF linker cannot handle, and LTO strips the dead code
    // that would otherwise reach the in-kernel verifier
    let status = Command::new("cargo")
        .args([
            "+nightly",
            "build",
            "--release",
            "--package",
            package,
            "--target",
            target,
            "-Z",
            "build-std=core",
        ])
        .status()
        .context("Failed to run cargo for the eBPF probe")?;

    if !status.success() {
        bail!("eBPF probe build failed (package {package}, target {target})");
    }

    println!("Probe bytecode ready under target/{target}/release/");
    Ok(())
}
