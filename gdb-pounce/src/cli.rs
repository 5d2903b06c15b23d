//! CLI argument definitions and the debugger-args / program / argv-suffix split

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "gdb-pounce",
    about = "Attach gdb to a process right after a successful execve() / execveat()",
    after_help = "\
EXAMPLES:
    sudo gdb-pounce vim                     Attach gdb to the next vim
    sudo gdb-pounce --uid alice bash        Only bash processes run by alice
    sudo gdb-pounce -nx -batch -ex c -ex q sed -i s/a/b/ f
                                            Extra gdb args pass through; sed must
                                            run with the given argv tail
    sudo gdb-pounce --strace ls             Trace with strace instead of gdb"
)]
pub struct Args {
    /// Only catch processes with this uid (numeric or username)
    #[arg(long)]
    pub uid: Option<String>,

    /// Keep catching further execs after the first match
    #[arg(long)]
    pub fork: bool,

    /// Launch strace -p <pid> instead of gdb -p <pid>
    #[arg(long)]
    pub strace: bool,

    /// Debugger arguments, then the program name, then its argv tail
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub rest: Vec<String>,
}

/// The free-token tail of the command line, split into its three roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Passed through to the spawned debugger, before `-p <pid>` handling
    pub debugger_args: Vec<String>,
    /// Program name: matched against the resolved basename of the target's
    /// executable, and the source of the kernel-side comm prefix
    pub program: String,
    /// Trailing argv tokens the target must have been started with
    pub argv_suffix: Vec<String>,
}

/// gdb options that consume the following token
const GDB_VALUE_OPTS: &[&str] =
    &["-ex", "-iex", "-x", "-ix", "-d", "-cd", "-s", "-e", "-se", "-c"];

/// strace options that consume the following token
const STRACE_VALUE_OPTS: &[&str] = &["-e", "-o", "-s", "-a", "-b", "-I", "-P", "-U", "-X", "-p"];

/// Split the free tokens: leading `-` tokens (plus the values of value-taking
/// debugger options) belong to the debugger; the first token not consumed
/// that way is the program; everything after it is the argv suffix.
pub fn split_rest(rest: &[String], strace: bool) -> Result<Invocation> {
    let value_opts = if strace { STRACE_VALUE_OPTS } else { GDB_VALUE_OPTS };

    let mut debugger_args = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let token = &rest[i];
        if token.starts_with('-') {
            debugger_args.push(token.clone());
            if value_opts.contains(&token.as_str()) {
                i += 1;
                match rest.get(i) {
                    Some(value) => debugger_args.push(value.clone()),
                    None => bail!("debugger option {token} expects a value"),
                }
            }
            i += 1;
        } else {
            return Ok(Invocation {
                debugger_args,
                program: token.clone(),
                argv_suffix: rest[i + 1..].to_vec(),
            });
        }
    }

    bail!("missing program name")
}
