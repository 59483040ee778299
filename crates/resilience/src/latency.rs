//! Bounded latency sample window with nearest-rank percentiles.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Ring buffer of the most recent call latencies.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    /// A capacity of zero is bumped to one so the window is never inert.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Compute p50/p95/p99 over the current samples.
    pub fn summary(&self) -> LatencySummary {
        if self.samples.is_empty() {
            return LatencySummary::default();
        }

        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let total: Duration = sorted.iter().sum();
        let mean = total / sorted.len() as u32;

        LatencySummary {
            samples: sorted.len(),
            p50_ms: as_millis_f64(percentile(&sorted, 50.0)),
            p95_ms: as_millis_f64(percentile(&sorted, 95.0)),
            p99_ms: as_millis_f64(percentile(&sorted, 99.0)),
            mean_ms: as_millis_f64(mean),
            max_ms: as_millis_f64(sorted[sorted.len() - 1]),
        }
    }
}

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

/// Nearest-rank percentile; `sorted` must be non-empty and ascending.
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.clamp(1, sorted.len()) - 1;
    sorted[idx]
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zeroes() {
        let window = LatencyWindow::new(8);
        assert_eq!(window.summary(), LatencySummary::default());
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let mut window = LatencyWindow::new(100);
        for ms in 1..=100 {
            window.record(Duration::from_millis(ms));
        }

        let summary = window.summary();
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.p50_ms, 50.0);
        assert_eq!(summary.p95_ms, 95.0);
        assert_eq!(summary.p99_ms, 99.0);
        assert_eq!(summary.max_ms, 100.0);
    }

    #[test]
    fn window_drops_oldest_sample() {
        let mut window = LatencyWindow::new(3);
        for ms in [500, 10, 20, 30] {
            window.record(Duration::from_millis(ms));
        }

        assert_eq!(window.len(), 3);
        // The 500ms outlier fell out of the window
        assert_eq!(window.summary().max_ms, 30.0);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let mut window = LatencyWindow::new(0);
        window.record(Duration::from_millis(7));
        let summary = window.summary();
        assert_eq!(summary.p50_ms, 7.0);
        assert_eq!(summary.p99_ms, 7.0);
    }
}
