//! `remesh-loop <maxTimeStep> <motion case id>`
//!
//! Command-line errors are reported before the communicator starts. Under
//! an MPI launcher only the process the launcher names rank 0 prints them;
//! every process still exits with status 1.

use clap::Parser;
use clap::error::ErrorKind;
use remesh_loop::app::{self, Cli, Invocation};
use remesh_loop::loop_error::LoopError;
use std::process::ExitCode;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let program = argv
        .first()
        .cloned()
        .unwrap_or_else(|| "remesh-loop".to_string());

    let cli = match Cli::try_parse_from(&argv) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            if app::reports_usage() {
                eprintln!("{e}");
                eprintln!("{}", LoopError::Usage { program });
            }
            return ExitCode::FAILURE;
        }
    };
    app::init_logging(cli.log_level.as_deref());

    let invocation = match Invocation::from_cli(cli, &program) {
        Ok(invocation) => invocation,
        Err(e) => {
            if app::reports_usage() {
                eprintln!("{e}");
            }
            return ExitCode::FAILURE;
        }
    };

    #[cfg(feature = "mpi-support")]
    let comm = match remesh_loop::algs::communicator::MpiComm::new() {
        Ok(comm) => comm,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    #[cfg(not(feature = "mpi-support"))]
    let comm = remesh_loop::algs::communicator::NoComm;

    match app::run(&invocation, &comm) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => app::fail(e, &comm),
    }
}
