//! CLI command definitions

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Options shared by every command that talks to a running host
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Port of the relay host (default: LLDB_RELAY_PORT, then the port file, then the config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Print raw JSON instead of formatted text
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay host, optionally with a debug session
    Host {
        /// Program to launch under the debugger
        #[arg(long, conflicts_with = "pid")]
        program: Option<PathBuf>,

        /// Arguments to pass to the program
        #[arg(last = true, requires = "program")]
        args: Vec<String>,

        /// Process ID to attach to
        #[arg(long)]
        pid: Option<u32>,

        /// Debug adapter to use (default: lldb-dap)
        #[arg(long)]
        adapter: Option<String>,

        /// Stop at program entry point
        #[arg(long, requires = "program")]
        stop_on_entry: bool,

        /// Port to listen on (0 lets the OS pick)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a raw LLDB command in the debug session
    Exec {
        /// The command, e.g. "frame variable" or "register read"
        command: String,

        #[command(flatten)]
        connect: ConnectOptions,
    },

    /// Print a thread's call stack
    #[command(alias = "bt")]
    Stack {
        /// Thread to inspect
        #[arg(long, short)]
        thread: i64,

        #[command(flatten)]
        connect: ConnectOptions,
    },

    /// Print the children of a variables reference
    Vars {
        /// Non-zero variablesReference from a stack frame or variable
        reference: i64,

        #[command(flatten)]
        connect: ConnectOptions,
    },

    /// Connect and print the session snapshot
    Status {
        #[command(flatten)]
        connect: ConnectOptions,
    },

    /// Stream stop and continue events until interrupted
    Watch {
        #[command(flatten)]
        connect: ConnectOptions,
    },
}
