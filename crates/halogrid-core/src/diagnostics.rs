//! Run diagnostics: per-iteration stage timings and the summary printed
//! at the coordinator.
//!
//! Timestamps come from a [`Clock`] supplied by the caller so the harness
//! itself never touches the system timer. Durations are serialized as
//! fractional seconds (`f64`) for JSON compatibility, since
//! `std::time::Duration` does not implement serde traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::geometry::GridGeometry;
use crate::harness::RunConfig;

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for the harness and the latency benchmark.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Wall-clock time of one iteration, as seen by one rank.
///
/// `total` runs from the start of distribution to the end of collection.
/// The barriers are included in `distribute` and `collect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IterationTiming {
    /// Distribute through collect (seconds).
    #[serde(with = "duration_serde")]
    pub total: Duration,
    /// Distributor plus the barrier after it (seconds).
    #[serde(with = "duration_serde")]
    pub distribute: Duration,
    /// Boundary exchange (seconds).
    #[serde(with = "duration_serde")]
    pub exchange: Duration,
    /// Stencil kernel (seconds).
    #[serde(with = "duration_serde")]
    pub compute: Duration,
    /// Collector plus the barrier after it (seconds).
    #[serde(with = "duration_serde")]
    pub collect: Duration,
}

/// Aggregates over every iteration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of iterations aggregated.
    pub iterations: usize,
    /// Fastest iteration (seconds).
    #[serde(with = "duration_serde")]
    pub min: Duration,
    /// Mean iteration time (seconds).
    #[serde(with = "duration_serde")]
    pub mean: Duration,
    /// Slowest iteration (seconds).
    #[serde(with = "duration_serde")]
    pub max: Duration,
    /// Mean boundary exchange time (seconds).
    #[serde(with = "duration_serde")]
    pub mean_exchange: Duration,
}

impl RunSummary {
    /// Summarize `timings`. Returns `None` for an empty slice.
    #[must_use]
    pub fn from_timings(timings: &[IterationTiming]) -> Option<Self> {
        let min = timings.iter().map(|t| t.total).min()?;
        let max = timings.iter().map(|t| t.total).max()?;
        let count = timings.len();
        let total: Duration = timings.iter().map(|t| t.total).sum();
        let exchange: Duration = timings.iter().map(|t| t.exchange).sum();
        Some(Self {
            iterations: count,
            min,
            mean: mean(total, count),
            max,
            mean_exchange: mean(exchange, count),
        })
    }
}

/// `total / count` for a non-zero `count`, exact while `count` fits a `u32`.
#[allow(clippy::cast_precision_loss)]
fn mean(total: Duration, count: usize) -> Duration {
    u32::try_from(count).map_or_else(|_| total.div_f64(count as f64), |n| total / n)
}

/// Everything the coordinator knows about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The resolved process grid.
    pub geometry: GridGeometry,
    /// The configuration the run used.
    pub config: RunConfig,
    /// Coordinator-side timing of every iteration, in order.
    pub iterations: Vec<IterationTiming>,
    /// Aggregates over `iterations`.
    pub summary: RunSummary,
}

impl RunReport {
    /// The one-line result printed on stdout:
    /// `RANKS=<p> SIZE=<N> RUNS=<iterations> AVG_TIME=<ms> ms`.
    #[must_use]
    pub fn contract_line(&self) -> String {
        format!(
            "RANKS={} SIZE={} RUNS={} AVG_TIME={:.3} ms",
            self.geometry.workers(),
            self.geometry.size(),
            self.summary.iterations,
            duration_ms(self.summary.mean),
        )
    }

    /// Format the report as a human-readable table.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Run Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {n}x{n}  |  Ranks: {}  |  Grid: {}x{}{}",
            self.geometry.workers(),
            self.geometry.grid_rows(),
            self.geometry.grid_cols(),
            if self.geometry.is_balanced() {
                ""
            } else {
                " (uneven)"
            },
            n = self.geometry.size(),
        ));
        lines.push(format!(
            "Stencil: {:?}  |  Kernel rows: {:?}",
            self.config.stencil, self.config.parallelism,
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:>5} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "Iter", "Total", "Distribute", "Exchange", "Compute", "Collect"
        ));
        lines.push("-".repeat(70));
        for (i, t) in self.iterations.iter().enumerate() {
            lines.push(format!(
                "{:>5} {:>10.3}ms {:>10.3}ms {:>10.3}ms {:>10.3}ms {:>10.3}ms",
                i + 1,
                duration_ms(t.total),
                duration_ms(t.distribute),
                duration_ms(t.exchange),
                duration_ms(t.compute),
                duration_ms(t.collect),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "min {:.3}ms  mean {:.3}ms  max {:.3}ms  |  mean exchange {:.3}ms",
            duration_ms(self.summary.min),
            duration_ms(self.summary.mean),
            duration_ms(self.summary.max),
            duration_ms(self.summary.mean_exchange),
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn timing(total_ms: u64, exchange_ms: u64) -> IterationTiming {
        IterationTiming {
            total: Duration::from_millis(total_ms),
            exchange: Duration::from_millis(exchange_ms),
            ..IterationTiming::default()
        }
    }

    fn sample_report() -> RunReport {
        let iterations = vec![timing(10, 2), timing(14, 4), timing(12, 3)];
        RunReport {
            geometry: GridGeometry::resolve(4, 512).unwrap(),
            config: RunConfig::default(),
            summary: RunSummary::from_timings(&iterations).unwrap(),
            iterations,
        }
    }

    #[test]
    fn summary_aggregates_totals_and_exchange() {
        let summary = sample_report().summary;
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.min, Duration::from_millis(10));
        assert_eq!(summary.max, Duration::from_millis(14));
        assert_eq!(summary.mean, Duration::from_millis(12));
        assert_eq!(summary.mean_exchange, Duration::from_millis(3));
    }

    #[test]
    fn summary_of_nothing_is_none() {
        assert!(RunSummary::from_timings(&[]).is_none());
    }

    #[test]
    fn mean_handles_counts_beyond_u32() {
        let count = usize::try_from(u64::from(u32::MAX) * 2 + 2).unwrap();
        assert_eq!(
            mean(Duration::from_secs(u64::from(u32::MAX) * 2 + 2), count),
            Duration::from_secs(1)
        );
        assert_eq!(mean(Duration::from_millis(36), 3), Duration::from_millis(12));
    }

    #[test]
    fn contract_line_has_fixed_tokens() {
        assert_eq!(
            sample_report().contract_line(),
            "RANKS=4 SIZE=512 RUNS=3 AVG_TIME=12.000 ms"
        );
    }

    #[test]
    fn contract_line_rounds_to_three_decimals() {
        let mut report = sample_report();
        report.summary.mean = Duration::from_nanos(1_234_567);
        assert!(report.contract_line().ends_with("AVG_TIME=1.235 ms"));
    }

    #[test]
    fn report_lists_every_iteration() {
        let text = sample_report().report();
        assert!(text.contains("Grid: 2x2"), "got:\n{text}");
        assert!(text.contains("14.000ms"), "got:\n{text}");
        assert!(text.contains("mean exchange 3.000ms"), "got:\n{text}");
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(timing(1500, 250)).unwrap();
        assert!((json["total"].as_f64().unwrap() - 1.5).abs() < 1e-12);
        assert!((json["exchange"].as_f64().unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn report_survives_json_round_trip() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary, report.summary);
        assert_eq!(back.geometry, report.geometry);
    }

    #[test]
    fn std_clock_moves_forward() {
        let clock = StdClock;
        let start = clock.now();
        assert!(clock.elapsed(&start) < Duration::from_secs(60));
    }
}
