//! halogrid: distributed Sobel edge-gradient benchmark.
//!
//! Splits an N x N image over a near-square grid of ranks, runs
//! distribute -> halo exchange -> Sobel -> collect for the requested number
//! of iterations, and prints one line on stdout:
//!
//! ```text
//! RANKS=<p> SIZE=<N> RUNS=<iterations> AVG_TIME=<ms> ms
//! ```
//!
//! # Usage
//!
//! ```text
//! halogrid [SIZE] [RUNS] [OPTIONS]              # ranks are threads
//! mpirun -n 4 halogrid [SIZE] [RUNS] --backend mpi
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` or pass `-v`/`-vv`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use halogrid_comm::LocalCluster;
use halogrid_core::{
    COORDINATOR, Communicator, GlobalImage, GridGeometry, Parallelism, RunConfig, RunError,
    RunReport, StdClock, StencilKind, expected_output, run,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Distributed Sobel stencil over a 2D-partitioned pixel grid.
///
/// Prints `RANKS=<p> SIZE=<N> RUNS=<iterations> AVG_TIME=<ms> ms` on the
/// coordinator.
#[derive(Parser)]
#[command(name = "halogrid", version)]
struct Cli {
    /// Image side length N (ignored with --input).
    #[arg(default_value_t = 512, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(3..))]
    size: usize,

    /// Number of iterations.
    #[arg(default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Number of ranks for the local back end.
    #[arg(short, long, env = "HALOGRID_WORKERS", default_value_t = 4, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: usize,

    /// Transport between ranks.
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    /// Per-tile kernel.
    #[arg(long, value_enum, default_value_t = Kernel::Sobel)]
    kernel: Kernel,

    /// Spread each tile's rows over a thread pool.
    #[arg(long)]
    threaded: bool,

    /// Generated input when --input is not given.
    #[arg(long, value_enum, default_value_t = Pattern::Modulo)]
    pattern: Pattern,

    /// Square input image (PNG, JPEG, BMP, WebP), converted to 8-bit gray.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Write the gathered result as a grayscale PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also print the full run report as JSON after the result line.
    #[arg(long)]
    json: bool,

    /// Compare the result with a single-process computation.
    #[arg(long)]
    verify: bool,

    /// Log more (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Transport selection.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One thread per rank in this process.
    Local,
    /// MPI world communicator (build with `--features mpi`, launch with
    /// `mpirun`).
    Mpi,
}

/// Kernel selection.
#[derive(Clone, Copy, ValueEnum)]
enum Kernel {
    /// Sobel gradient magnitude.
    Sobel,
    /// Copy the input through unchanged.
    Identity,
}

impl From<Kernel> for StencilKind {
    fn from(kernel: Kernel) -> Self {
        match kernel {
            Kernel::Sobel => Self::Sobel,
            Kernel::Identity => Self::Identity,
        }
    }
}

/// Generated input selection.
#[derive(Clone, Copy, ValueEnum)]
enum Pattern {
    /// `pixel[k] = k mod 256` in row-major order.
    Modulo,
    /// `pixel[i][j] = (31 i + 17 j) mod 256`.
    Diagonal,
}

/// Errors surfaced to the user.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("verification failed: {mismatched} of {total} pixels differ from the reference")]
    Verification { mismatched: usize, total: usize },

    #[error("this build has no MPI support; rebuild with `--features mpi`")]
    #[cfg_attr(feature = "mpi", allow(dead_code))]
    MpiUnavailable,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("halogrid: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn execute(cli: &Cli) -> Result<(), CliError> {
    let config = RunConfig {
        iterations: cli.runs,
        stencil: cli.kernel.into(),
        parallelism: if cli.threaded {
            Parallelism::Rows
        } else {
            Parallelism::Sequential
        },
    };
    let input = load_input(cli)?;

    let gathered = match cli.backend {
        Backend::Local => run_local(cli.workers, &config, &input)?,
        Backend::Mpi => run_mpi(&config, &input)?,
    };
    match gathered {
        Some((report, output)) => finish(cli, &config, &input, &report, &output),
        None => Ok(()),
    }
}

fn load_input(cli: &Cli) -> Result<GlobalImage, CliError> {
    let Some(path) = &cli.input else {
        return Ok(match cli.pattern {
            Pattern::Modulo => GlobalImage::modulo_pattern(cli.size),
            Pattern::Diagonal => GlobalImage::test_pattern(cli.size),
        });
    };
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })?;
    let image = GlobalImage::decode(&bytes).map_err(RunError::from)?;
    if image.size() != cli.size {
        info!(size = image.size(), "image size taken from input");
    }
    Ok(image)
}

/// Run every rank as a thread; returns the coordinator's report and image.
fn run_local(
    workers: usize,
    config: &RunConfig,
    input: &GlobalImage,
) -> Result<Option<(RunReport, GlobalImage)>, CliError> {
    let geometry = GridGeometry::resolve(workers, input.size()).map_err(RunError::from)?;
    let results = LocalCluster::run(workers, |comm| {
        let mut image = (comm.rank() == COORDINATOR).then(|| input.clone());
        run(comm, &StdClock, &geometry, config, image.as_mut()).map(|report| report.zip(image))
    })
    .map_err(RunError::from)?;

    let mut gathered = None;
    for result in results {
        if let Some(coordinator) = result? {
            gathered = Some(coordinator);
        }
    }
    Ok(gathered)
}

/// Run this process as one MPI rank; only the coordinator gets a result.
#[cfg(feature = "mpi")]
fn run_mpi(
    config: &RunConfig,
    input: &GlobalImage,
) -> Result<Option<(RunReport, GlobalImage)>, CliError> {
    let comm = halogrid_comm::MpiComm::init().map_err(RunError::from)?;
    let geometry = GridGeometry::resolve(comm.size(), input.size()).map_err(RunError::from)?;
    let mut image = (comm.rank() == COORDINATOR).then(|| input.clone());
    let report = run(&comm, &StdClock, &geometry, config, image.as_mut())?;
    Ok(report.zip(image))
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(
    _config: &RunConfig,
    _input: &GlobalImage,
) -> Result<Option<(RunReport, GlobalImage)>, CliError> {
    Err(CliError::MpiUnavailable)
}

/// Coordinator-side output: result line, optional report, image, check.
fn finish(
    cli: &Cli,
    config: &RunConfig,
    input: &GlobalImage,
    report: &RunReport,
    output: &GlobalImage,
) -> Result<(), CliError> {
    println!("{}", report.contract_line());
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    if cli.verbose > 0 {
        eprintln!("{}", report.report());
    }

    if let Some(path) = &cli.output {
        write_output(path, output)?;
        info!(path = %path.display(), "wrote output image");
    }

    if cli.verify {
        let expected = expected_output(input, config);
        let mismatched = expected
            .as_slice()
            .iter()
            .zip(output.as_slice())
            .filter(|(a, b)| a != b)
            .count();
        if mismatched > 0 {
            warn!(mismatched, "result differs from the single-process reference");
            return Err(CliError::Verification {
                mismatched,
                total: expected.as_slice().len(),
            });
        }
        info!("result matches the single-process reference");
    }
    Ok(())
}

fn write_output(path: &Path, output: &GlobalImage) -> Result<(), CliError> {
    let png = output.encode_png().map_err(RunError::from)?;
    std::fs::write(path, png).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}
