//! Warm-up and measurement window for repeated kernels.
//!
//! A kernel is run a few times untimed, then repeatedly timed until both a
//! minimum iteration count and a minimum wall time are reached, or either
//! maximum is hit. The slowest 10% of samples are dropped before the median
//! is taken.

use std::time::{Duration, Instant};

/// Configuration for the measurement loop.
#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Untimed iterations run first
    pub warmup_iters: usize,
    /// Minimum number of timed iterations
    pub min_iters: usize,
    /// Maximum number of timed iterations
    pub max_iters: usize,
    /// Minimum total measurement time
    pub min_time: Duration,
    /// Maximum total measurement time
    pub max_time: Duration,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        MeasureConfig {
            warmup_iters: 2,
            min_iters: 5,
            max_iters: 100,
            min_time: Duration::from_millis(50),
            max_time: Duration::from_secs(2),
        }
    }
}

impl MeasureConfig {
    /// Single warm-up and a handful of short iterations, for tests
    pub fn quick() -> Self {
        MeasureConfig {
            warmup_iters: 1,
            min_iters: 3,
            max_iters: 5,
            min_time: Duration::ZERO,
            max_time: Duration::from_millis(200),
        }
    }
}

/// Statistics over the timed iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Median time in nanoseconds
    pub median_ns: f64,
    /// Minimum observed time in nanoseconds
    pub min_ns: f64,
    /// Number of samples kept after outlier removal
    pub samples: usize,
}

/// Run `f` under the warm-up and measurement window.
///
/// The closure receives the iteration index and should perform exactly one
/// kernel invocation.
pub fn measure<F>(config: &MeasureConfig, mut f: F) -> Sample
where
    F: FnMut(usize),
{
    for i in 0..config.warmup_iters {
        f(i);
    }

    let mut times_ns = Vec::with_capacity(config.max_iters.max(1));
    let wall_start = Instant::now();
    let mut iter = 0usize;

    loop {
        let t0 = Instant::now();
        f(iter);
        times_ns.push(t0.elapsed().as_nanos() as f64);
        iter += 1;

        let total_wall = wall_start.elapsed();
        if iter >= config.min_iters && total_wall >= config.min_time {
            break;
        }
        if iter >= config.max_iters || total_wall >= config.max_time {
            break;
        }
    }

    compute_stats(&mut times_ns)
}

fn compute_stats(times: &mut [f64]) -> Sample {
    if times.is_empty() {
        return Sample {
            median_ns: 0.0,
            min_ns: 0.0,
            samples: 0,
        };
    }

    times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // discard the slowest 10% (scheduler preemption, page faults)
    let keep = (times.len() - times.len() / 10).max(1);
    let kept = &times[..keep];

    let mid = kept.len() / 2;
    let median_ns = if kept.len() % 2 == 0 {
        (kept[mid - 1] + kept[mid]) / 2.0
    } else {
        kept[mid]
    };

    Sample {
        median_ns,
        min_ns: kept[0],
        samples: kept.len(),
    }
}
