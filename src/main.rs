//! lldb-relay - relay debugger inspection requests from an AI agent to a
//! live LLDB debug session

use clap::Parser;
use commands::Commands;
use lldb_relay::common::logging;
use lldb_relay::host::{self, HostOptions, Target};
use lldb_relay::{cli, commands};

#[derive(Parser)]
#[command(name = "lldb-relay", about = "Relay between AI agents and a live LLDB session")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Host {
            program,
            args,
            pid,
            adapter,
            stop_on_entry,
            port,
        } => {
            let (log_file, _guard) = logging::init_host();
            if let Some(path) = log_file {
                eprintln!("Host log: {}", path.display());
            }

            let target = match (program, pid) {
                (Some(program), _) => Some(Target::Launch {
                    program: program.canonicalize().unwrap_or(program),
                    args,
                    stop_on_entry,
                }),
                (None, Some(pid)) => Some(Target::Attach { pid }),
                (None, None) => None,
            };

            host::run(HostOptions {
                target,
                adapter,
                port,
            })
            .await
        }
        command => {
            logging::init_cli();
            cli::dispatch(command).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
