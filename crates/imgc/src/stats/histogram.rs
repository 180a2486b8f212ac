//! Histogram - Pause Time Histogram
//!
//! Logarithmic buckets over microseconds: bucket `b` holds values in
//! `[2^(b-1), 2^b)`, bucket 0 holds zero. Good enough to tell a 50 us
//! pause from a 5 ms one, which is what tuning the step budgets needs.

use serde::Serialize;

const BUCKETS: usize = 64;

/// Pause time distribution
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: [u64; BUCKETS],
    count: u64,
    sum: u64,
    max: u64,
}

/// Copyable digest of a [`Histogram`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub mean_us: f64,
    pub max_us: u64,
    /// Upper bound of the bucket holding the median
    pub p50_us: u64,
    /// Upper bound of the bucket holding the 99th percentile
    pub p99_us: u64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; BUCKETS],
            count: 0,
            sum: 0,
            max: 0,
        }
    }

    /// Record value
    pub fn record(&mut self, value: u64) {
        self.buckets[Self::bucket(value)] += 1;
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
        self.max = self.max.max(value);
    }

    fn bucket(value: u64) -> usize {
        if value == 0 {
            0
        } else {
            (64 - value.leading_zeros() as usize).min(BUCKETS - 1)
        }
    }

    /// Upper bound of the bucket reaching percentile `p` (0.0..=1.0)
    pub fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let target = ((self.count as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0;
        for (bucket, &count) in self.buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return if bucket == 0 { 0 } else { (1u64 << bucket) - 1 };
            }
        }
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            count: self.count,
            mean_us: self.mean(),
            max_us: self.max,
            p50_us: self.percentile(0.50),
            p99_us: self.percentile(0.99),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
