use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

use gdb_pounce::cli::{self, Args};
use gdb_pounce::handoff::{DebuggerKind, HandoffController};
use gdb_pounce::matcher::{resolve_uid, MatchSpec};
use gdb_pounce::preflight::run_preflight_checks;
use gdb_pounce::probe;
use gdb_pounce::verifier::Verifier;
use gdb_pounce_common::ExecEvent;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let invocation = cli::split_rest(&args.rest, args.strace)?;

    let uid = args.uid.as_deref().map(resolve_uid).transpose()?;
    let spec = MatchSpec::new(&invocation.program, invocation.argv_suffix, uid);

    run_preflight_checks()?;

    // SIGINT handling is installed before the probe goes live; repeated
    // SIGINTs during shutdown land in the stream instead of killing us
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let mut bpf = probe::load_probe()?;
    probe::init_probe_logger(&mut bpf);
    probe::write_filter(&mut bpf, spec.kernel_filter())?;
    probe::attach_exec_tracepoints(&mut bpf)?;
    let mut ring_buf = probe::take_event_ring(&mut bpf)?;

    let kind = if args.strace { DebuggerKind::Strace } else { DebuggerKind::Gdb };
    let handoff = HandoffController::new(kind, invocation.debugger_args);
    let mut verifier = Verifier::new(spec, args.fork);

    eprintln!("Running, press Ctrl+C to stop...");

    // Main event processing loop. Blocking points: the poll sleep and the
    // debugger wait inside the handoff; a SIGINT during the latter is
    // observed at the next loop turn, after the child has been reaped.
    'engine: loop {
        while let Some(item) = ring_buf.next() {
            let Some(event) = decode_event(&item) else {
                log::warn!("Received incomplete event");
                continue;
            };
            verifier.process(&event, &handoff).await;
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = sigint.recv() => {
                debug!("SIGINT received, shutting down");
                break 'engine;
            }
        }
    }

    // Stop accepting events; anything still frozen in the ring is released
    // so no task is left stopped behind us
    while let Some(item) = ring_buf.next() {
        if let Some(event) = decode_event(&item) {
            verifier.release_frozen(&event);
        }
    }

    probe::report_drop_counter(&bpf);
    info!("detaching probe");
    drop(bpf); // detaches the tracepoints and closes the maps

    Ok(())
}

fn decode_event(bytes: &[u8]) -> Option<ExecEvent> {
    if bytes.len() < std::mem::size_of::<ExecEvent>() {
        return None;
    }
    // SAFETY: size verified above, and the probe only ever writes valid
    // ExecEvent records into the ring
    #[allow(unsafe_code)]
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<ExecEvent>()) })
}
