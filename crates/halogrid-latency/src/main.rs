//! halogrid-latency: ping-pong latency and bandwidth between two ranks.
//!
//! Prints a header on stderr and one line per message size on stdout:
//!
//! ```text
//! <size>\t\t<one-way latency us>\t\t<bandwidth MB/s>
//! ```
//!
//! # Usage
//!
//! ```text
//! halogrid-latency                               # two threads
//! mpirun -n 2 halogrid-latency --backend mpi
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use halogrid_comm::LocalCluster;
use halogrid_core::{LatencyConfig, LatencySample, RunError, StdClock, run_latency};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Point-to-point round-trip benchmark between ranks 0 and 1.
#[derive(Parser)]
#[command(name = "halogrid-latency", version)]
struct Cli {
    /// Message sizes in bytes (default: 1 to 1000000 in decades).
    #[arg(short, long, value_delimiter = ',')]
    sizes: Vec<usize>,

    /// Transport between ranks.
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    /// Number of ranks for the local back end.
    #[arg(short, long, default_value_t = 2, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(2..))]
    workers: usize,

    /// Print the samples as JSON instead of the table.
    #[arg(long)]
    json: bool,

    /// Log more (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Transport selection.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One thread per rank in this process.
    Local,
    /// MPI world communicator (build with `--features mpi`).
    Mpi,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("failed to serialize samples: {0}")]
    Json(#[from] serde_json::Error),

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
            eprintln!("halogrid-latency: {e}");
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
    let config = if cli.sizes.is_empty() {
        LatencyConfig::default()
    } else {
        LatencyConfig {
            sizes: cli.sizes.clone(),
        }
    };

    let samples = match cli.backend {
        Backend::Local => run_local(cli.workers, &config)?,
        Backend::Mpi => run_mpi(&config)?,
    };
    if let Some((ranks, samples)) = samples {
        info!(ranks, sizes = samples.len(), "latency benchmark complete");
        print_samples(cli, ranks, &samples)?;
    }
    Ok(())
}

/// Samples from the coordinator, with the group size.
type Measured = Option<(usize, Vec<LatencySample>)>;

fn run_local(workers: usize, config: &LatencyConfig) -> Result<Measured, CliError> {
    if workers > 2 {
        info!(workers, "ranks beyond 0 and 1 only join the barriers");
    }
    let results = LocalCluster::run(workers, |comm| run_latency(comm, &StdClock, config))
        .map_err(RunError::from)?;
    let mut coordinator = None;
    for result in results {
        let samples = result?;
        coordinator.get_or_insert(samples);
    }
    Ok(coordinator.map(|samples| (workers, samples)))
}

#[cfg(feature = "mpi")]
fn run_mpi(config: &LatencyConfig) -> Result<Measured, CliError> {
    use halogrid_core::{COORDINATOR, Communicator};

    let comm = halogrid_comm::MpiComm::init().map_err(RunError::from)?;
    let samples = run_latency(&comm, &StdClock, config)?;
    Ok((comm.rank() == COORDINATOR).then(|| (comm.size(), samples)))
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_config: &LatencyConfig) -> Result<Measured, CliError> {
    Err(CliError::MpiUnavailable)
}

fn print_samples(cli: &Cli, ranks: usize, samples: &[LatencySample]) -> Result<(), CliError> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(samples)?);
        return Ok(());
    }
    eprintln!("Latency and bandwidth, {ranks} ranks");
    eprintln!("Message Size (B)\tLatency (us)\tBandwidth (MB/s)");
    for sample in samples {
        println!("{}", sample.contract_line());
    }
    Ok(())
}
