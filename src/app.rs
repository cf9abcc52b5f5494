//! Process-level wiring for the `remesh-loop` binary.
//!
//! Argument checking happens before anything else is touched, so a bad
//! command line leaves no journal, checkpoint or log file behind.

use crate::algs::communicator::Communicator;
use crate::config::{AdaptConfig, SolverInput};
use crate::context::EngineContext;
use crate::driver::{LoopDriver, LoopParams, LoopReport};
use crate::engines::MeshSource;
use crate::loop_error::{ErrorClass, LoopError};
use crate::reference::{self, FileMeshSource, GridMeshSource, RunJournal, StreamPreprocessor};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Adaptation configuration file, relative to the working directory.
pub const ADAPT_INPUT: &str = "adapt.inp";
/// Solver input file.
pub const SOLVER_INPUT: &str = "solver.inp";
/// Solver defaults file.
pub const SOLVER_DEFAULTS: &str = "input.config";

#[derive(Parser, Debug)]
#[command(name = "remesh-loop", version)]
#[command(about = "Alternate a transient solver with mesh adaptation until a target step", long_about = None)]
pub struct Cli {
    /// <maxTimeStep> <motion case id>
    #[arg(num_args = 0.., allow_negative_numbers = true)]
    pub positional: Vec<String>,

    /// Directory holding adapt.inp, solver.inp and the mesh
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,

    /// Generate an N x N triangle grid per rank instead of reading the mesh file
    #[arg(long)]
    pub grid: Option<usize>,
}

/// A checked command line.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub params: LoopParams,
    pub workdir: PathBuf,
    pub grid: Option<usize>,
}

impl Invocation {
    /// Check arity and parse the two positional arguments.
    ///
    /// # Errors
    /// `Usage` unless exactly two positionals are given; `InvalidArgument`
    /// if either is not an integer or the step is negative.
    pub fn from_cli(cli: Cli, program: &str) -> Result<Self, LoopError> {
        let [max_step, case_id] = cli.positional.as_slice() else {
            return Err(LoopError::Usage {
                program: program.to_string(),
            });
        };
        let max_step = max_step
            .parse::<u32>()
            .map_err(|_| LoopError::InvalidArgument {
                name: "maxTimeStep",
                value: max_step.clone(),
            })?;
        let case_id = case_id
            .parse::<i32>()
            .map_err(|_| LoopError::InvalidArgument {
                name: "motion case id",
                value: case_id.clone(),
            })?;
        Ok(Self {
            params: LoopParams { max_step, case_id },
            workdir: cli.workdir,
            grid: cli.grid,
        })
    }
}

/// Install `env_logger`; `level` wins over `RUST_LOG`, default `info`.
pub fn init_logging(level: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.format_timestamp_millis();
    // a second init (tests) keeps the first logger
    let _ = builder.try_init();
}

/// Load inputs, start engines and run the loop on this worker.
pub fn run<C: Communicator>(invocation: &Invocation, comm: &C) -> Result<LoopReport, LoopError> {
    let workdir = &invocation.workdir;
    let mut engines = EngineContext::new();
    if comm.rank() == 0 {
        engines.start(Box::new(RunJournal::new(workdir)))?;
    }

    let mut config = AdaptConfig::load(workdir.join(ADAPT_INPUT))?;
    if config.checkpoint_dir.is_relative() {
        config.checkpoint_dir = workdir.join(&config.checkpoint_dir);
    }
    let input = SolverInput::load(workdir.join(SOLVER_INPUT), workdir.join(SOLVER_DEFAULTS))?;
    rank0_info!(
        comm,
        "max step {} motion case {} on {} ranks, trigger {}",
        invocation.params.max_step,
        invocation.params.case_id,
        comm.size(),
        config.adapt_trigger
    );

    let source: Box<dyn MeshSource<C>> = match invocation.grid {
        Some(cells) => Box::new(GridMeshSource { cells }),
        None => Box::new(FileMeshSource::new(workdir)),
    };
    let parts = reference::collaborators(source, StreamPreprocessor::with_geombc_dir(workdir));
    let report = LoopDriver::new(comm, invocation.params, config, input, parts).run()?;
    drop(engines);
    Ok(report)
}

/// How a failed worker leaves the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Return exit status 1 from this process only.
    Exit,
    /// Stop every worker of the group with status 1.
    AbortGroup,
}

/// Choose the outcome for an error of `class` in a group of `group_size`.
///
/// Usage errors are raised before the group exists. Invariant violations
/// always abort. Any other failure aborts as soon as a peer could be left
/// waiting in a collective.
pub fn outcome(class: ErrorClass, group_size: usize) -> Outcome {
    match class {
        ErrorClass::Usage => Outcome::Exit,
        ErrorClass::Invariant => Outcome::AbortGroup,
        ErrorClass::Protocol | ErrorClass::Environment if group_size > 1 => Outcome::AbortGroup,
        ErrorClass::Protocol | ErrorClass::Environment => Outcome::Exit,
    }
}

/// Map a failure onto the process outcome.
pub fn fail<C: Communicator>(err: LoopError, comm: &C) -> ExitCode {
    let class = err.class();
    if class == ErrorClass::Usage {
        eprintln!("{err}");
    } else {
        log::error!("rank {}: {err}", comm.rank());
    }
    match outcome(class, comm.size()) {
        Outcome::Exit => ExitCode::FAILURE,
        Outcome::AbortGroup => comm.abort(1),
    }
}

/// Rank-announcing variables set by common MPI launchers.
pub const LAUNCHER_RANK_VARS: [&str; 4] = [
    "OMPI_COMM_WORLD_RANK",
    "PMI_RANK",
    "PMIX_RANK",
    "MV2_COMM_WORLD_RANK",
];

/// Rank assigned by the launcher, read through `lookup` before any
/// communicator exists.
pub fn launcher_rank(lookup: impl Fn(&str) -> Option<String>) -> Option<usize> {
    LAUNCHER_RANK_VARS
        .into_iter()
        .find_map(|var| lookup(var).and_then(|v| v.trim().parse().ok()))
}

/// Whether this process reports command-line errors.
///
/// Under a launcher only rank 0 prints; a plain invocation always does.
pub fn reports_usage() -> bool {
    launcher_rank(|var| std::env::var(var).ok()).is_none_or(|rank| rank == 0)
}
