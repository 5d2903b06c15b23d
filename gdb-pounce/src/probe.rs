//! # eBPF Probe Loading and Attachment
//!
//! Loads the compiled probe bytecode, populates the coarse filter map, and
//! attaches the exec syscall-exit tracepoints.
//!
//! Setup order matters: the `FILTER` map is written *before* any tracepoint
//! attaches, so the probe never observes a half-configured filter, and the
//! map is read-only from that point on.

use aya::maps::{HashMap, MapData, RingBuf};
use aya::programs::TracePoint;
use aya::Ebpf;
use aya_log::EbpfLogger;
use gdb_pounce_common::{MatchFilter, DROP_COUNTER_KEY, FILTER_KEY};
use log::{info, warn};

use crate::domain::PounceError;

/// Exec syscall-exit tracepoints the probe attaches to, paired with the
/// probe program handling each
pub const EXEC_TRACEPOINTS: &[(&str, &str, &str)] = &[
    ("execve_exit", "syscalls", "sys_exit_execve"),
    ("execveat_exit", "syscalls", "sys_exit_execveat"),
];

/// Default location of the probe bytecode produced by `cargo xtask build-ebpf`
/// (always the release build: debug builds with recent Rust nightlies pull in
/// formatting code that's incompatible with the BPF linker)
const DEFAULT_PROBE_PATH: &str = "target/bpfel-unknown-none/release/gdb-pounce";

/// Load the eBPF probe bytecode
///
/// The path can be overridden with `GDB_POUNCE_PROBE` for installed setups
/// where the bytecode does not sit next to a cargo target directory.
///
/// # Errors
/// Returns an error if the eBPF bytecode cannot be read or loaded
pub fn load_probe() -> Result<Ebpf, PounceError> {
    let path = std::env::var("GDB_POUNCE_PROBE")
        .unwrap_or_else(|_| DEFAULT_PROBE_PATH.to_string());
    let bpf = Ebpf::load_file(&path)?;
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_probe_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Write the coarse filter. This is the single write the map ever sees.
///
/// # Errors
/// Returns an error if the `FILTER` map is missing or the insert fails
pub fn write_filter(bpf: &mut Ebpf, filter: MatchFilter) -> Result<(), PounceError> {
    let mut map: HashMap<_, u32, MatchFilter> =
        HashMap::try_from(bpf.map_mut("FILTER").ok_or(PounceError::MapMissing("FILTER"))?)?;
    map.insert(FILTER_KEY, filter, 0)?;
    info!("✓ Wrote coarse filter ({}-byte comm prefix)", filter.comm_prefix_len);
    Ok(())
}

/// Attach both exec syscall-exit tracepoints
///
/// # Errors
/// Returns an error if a probe program is missing or attachment fails
pub fn attach_exec_tracepoints(bpf: &mut Ebpf) -> Result<(), PounceError> {
    for &(program_name, category, name) in EXEC_TRACEPOINTS {
        let program: &mut TracePoint = bpf
            .program_mut(program_name)
            .ok_or(PounceError::ProgramMissing(program_name))?
            .try_into()?;
        program.load()?;
        program.attach(category, name)?;
        info!("✓ Attached tracepoint: {category}/{name}");
    }
    Ok(())
}

/// Take ownership of the event ring buffer
///
/// # Errors
/// Returns an error if the `EVENTS` map is missing or is not a ring buffer
pub fn take_event_ring(bpf: &mut Ebpf) -> Result<RingBuf<MapData>, PounceError> {
    let ring = RingBuf::try_from(bpf.take_map("EVENTS").ok_or(PounceError::MapMissing("EVENTS"))?)?;
    Ok(ring)
}

/// Report kernel-side drops once, at shutdown
///
/// A full ring buffer makes the probe drop the event *instead of* freezing
/// the task, so a nonzero count means missed catches, not stuck processes.
pub fn report_drop_counter(bpf: &Ebpf) {
    let Some(map) = bpf.map("DROPPED_EVENTS") else { return };
    let Ok(map) = HashMap::<_, u32, u64>::try_from(map) else { return };
    match map.get(&DROP_COUNTER_KEY, 0) {
        Ok(count) if count > 0 => warn!("{count} exec event(s) dropped: ring buffer full"),
        _ => {}
    }
}
