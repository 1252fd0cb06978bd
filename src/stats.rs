use std::cmp::Ordering;
use std::time::Duration;

use crate::errors::BenchError;
use crate::types::{MedianSummary, Sample};

/// Values that can be totally ordered and averaged pairwise.
pub trait Midpoint: Copy {
    fn total_order(&self, other: &Self) -> Ordering;

    /// Average of `self` and `other`, where `self <= other`.
    fn midpoint(self, other: Self) -> Self;
}

impl Midpoint for Duration {
    fn total_order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn midpoint(self, other: Self) -> Self {
        self + (other - self) / 2
    }
}

impl Midpoint for u64 {
    fn total_order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn midpoint(self, other: Self) -> Self {
        self + (other - self) / 2
    }
}

impl Midpoint for i64 {
    fn total_order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn midpoint(self, other: Self) -> Self {
        ((self as i128 + other as i128) / 2) as i64
    }
}

impl Midpoint for f64 {
    fn total_order(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn midpoint(self, other: Self) -> Self {
        self / 2.0 + other / 2.0
    }
}

/// Returns a sorted copy of `values`. Stable; the input is untouched.
pub fn sort_ascending<T: Midpoint>(values: &[T]) -> Vec<T> {
    let mut sorted = values.to_vec();
    sorted.sort_by(T::total_order);
    sorted
}

/// Median of `values`. Even-length inputs average the two central elements.
pub fn median<T: Midpoint>(values: &[T]) -> Result<T, BenchError> {
    if values.is_empty() {
        return Err(BenchError::EmptyInput);
    }
    let sorted = sort_ascending(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok(sorted[mid - 1].midpoint(sorted[mid]))
    } else {
        Ok(sorted[mid])
    }
}

/// Nearest-rank percentile, `p` clamped to `[0, 100]`.
pub fn percentile<T: Midpoint>(values: &[T], p: f64) -> Result<T, BenchError> {
    if values.is_empty() {
        return Err(BenchError::EmptyInput);
    }
    let sorted = sort_ascending(values);
    let n = sorted.len();
    let rank = ((p.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
    Ok(sorted[rank.clamp(1, n) - 1])
}

impl MedianSummary {
    /// Reduces a completed batch of samples. Optional dimensions are
    /// summarized over the samples that carry them.
    pub fn from_samples(samples: &[Sample]) -> Result<Self, BenchError> {
        let elapsed: Vec<Duration> = samples.iter().map(|s| s.elapsed).collect();

        Ok(MedianSummary {
            elapsed: median(&elapsed)?,
            elapsed_p95: percentile(&elapsed, 95.0)?,
            cpu_time: optional_median(samples, |s| s.cpu_time)?,
            plan_time: optional_median(samples, |s| s.plan_time)?,
            rows_scanned: optional_median(samples, |s| s.rows_scanned)?,
            rows_returned: optional_median(samples, |s| s.rows_returned)?,
            samples: samples.len(),
        })
    }
}

fn optional_median<T, F>(samples: &[Sample], field: F) -> Result<Option<T>, BenchError>
where
    T: Midpoint,
    F: Fn(&Sample) -> Option<T>,
{
    let values: Vec<T> = samples.iter().filter_map(field).collect();
    if values.is_empty() {
        return Ok(None);
    }
    median(&values).map(Some)
}
