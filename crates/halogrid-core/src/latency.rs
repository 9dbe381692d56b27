//! Point-to-point latency and bandwidth between ranks 0 and 1.
//!
//! For each message size the initiator (the lower rank) sends a buffer and
//! waits for it to come back, `iterations` times. One-way latency is half
//! the mean round trip. Ranks other than 0 and 1 only take part in the
//! barriers around each size.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comm::{Communicator, Slice, SliceMut, Tag};
use crate::diagnostics::{Clock, duration_serde};
use crate::types::{COORDINATOR, CommError, Rank, RunError};

/// Default message sizes in bytes.
pub const SIZES: [usize; 7] = [1, 10, 100, 1_000, 10_000, 100_000, 1_000_000];

/// Fill byte for ping-pong buffers.
const FILL: u8 = b'A';

/// Round trips measured for a message of `size` bytes: fewer for larger
/// messages.
#[must_use]
pub const fn iterations_for(size: usize) -> usize {
    if size <= 100 {
        10_000
    } else if size <= 10_000 {
        1_000
    } else {
        100
    }
}

/// Message sizes to measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Sizes in bytes, measured in order.
    pub sizes: Vec<usize>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            sizes: SIZES.to_vec(),
        }
    }
}

/// Result for one message size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Message size in bytes.
    pub size: usize,
    /// Round trips measured.
    pub iterations: usize,
    /// Time for all round trips (seconds).
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Half the mean round trip, in microseconds.
    pub one_way_latency_us: f64,
    /// `size` bytes over the one-way latency, in MB/s (10^6 bytes).
    pub bandwidth_mb_s: f64,
}

impl LatencySample {
    /// Derive latency and bandwidth from the total time of `iterations`
    /// round trips.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_round_trips(size: usize, iterations: usize, elapsed: Duration) -> Self {
        let one_way_secs = if iterations == 0 {
            0.0
        } else {
            elapsed.as_secs_f64() / (2.0 * iterations as f64)
        };
        let bandwidth_mb_s = if one_way_secs > 0.0 {
            size as f64 / one_way_secs / 1e6
        } else {
            0.0
        };
        Self {
            size,
            iterations,
            elapsed,
            one_way_latency_us: one_way_secs * 1e6,
            bandwidth_mb_s,
        }
    }

    /// The result line printed on stdout:
    /// `<size>\t\t<latency_us>\t\t<MB/s>`.
    #[must_use]
    pub fn contract_line(&self) -> String {
        format!(
            "{}\t\t{:.3}\t\t{:.3}",
            self.size, self.one_way_latency_us, self.bandwidth_mb_s
        )
    }
}

/// Bounce a `size`-byte message between this rank and `peer`
/// `iterations` times.
///
/// The lower rank initiates, times the exchange with `clock` and returns
/// the sample; the other rank echoes and returns `None`.
///
/// # Errors
///
/// Any [`CommError`] from the transfers.
pub fn ping_pong<C, K>(
    comm: &C,
    clock: &K,
    peer: Rank,
    size: usize,
    iterations: usize,
) -> Result<Option<LatencySample>, CommError>
where
    C: Communicator + ?Sized,
    K: Clock + ?Sized,
{
    let mut buffer = vec![FILL; size];
    if comm.rank() > peer {
        for _ in 0..iterations {
            comm.recv(peer, Tag::PING, SliceMut::Bytes(&mut buffer))?;
            comm.send(peer, Tag::PING, Slice::Bytes(&buffer))?;
        }
        return Ok(None);
    }

    let start = clock.now();
    for _ in 0..iterations {
        comm.send(peer, Tag::PING, Slice::Bytes(&buffer))?;
        comm.recv(peer, Tag::PING, SliceMut::Bytes(&mut buffer))?;
    }
    let elapsed = clock.elapsed(&start);
    Ok(Some(LatencySample::from_round_trips(size, iterations, elapsed)))
}

/// Measure every size in `config` between ranks 0 and 1.
///
/// Every rank of `comm` calls this. The coordinator gets one sample per
/// size; every other rank gets an empty list.
///
/// # Errors
///
/// [`RunError::TooFewRanks`] for a group of one, or any communication
/// failure.
pub fn run_latency<C, K>(
    comm: &C,
    clock: &K,
    config: &LatencyConfig,
) -> Result<Vec<LatencySample>, RunError>
where
    C: Communicator + ?Sized,
    K: Clock + ?Sized,
{
    if comm.size() < 2 {
        return Err(RunError::TooFewRanks {
            needed: 2,
            found: comm.size(),
        });
    }
    let rank = comm.rank();
    let mut samples = Vec::new();
    for &size in &config.sizes {
        let iterations = iterations_for(size);
        comm.barrier()?;
        if rank <= 1 {
            if let Some(sample) = ping_pong(comm, clock, 1 - rank, size, iterations)? {
                debug!(size, latency_us = sample.one_way_latency_us, "measured");
                samples.push(sample);
            }
        }
        comm.barrier()?;
    }
    debug_assert!(rank == COORDINATOR || samples.is_empty());
    Ok(samples)
}
