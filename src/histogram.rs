use std::fmt;
use std::time::Duration;

use crate::stats::sort_ascending;

/// Default number of regular buckets. A closing bucket is always added.
pub const NUM_BUCKETS: usize = 5;

/// Minimum number of samples needed to build a histogram.
pub const MIN_SAMPLES: usize = 2;

/// Width in characters of the longest bar.
pub const BAR_WIDTH: usize = 20;

const BAR_CHAR: char = '■';

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Inclusive upper bound of the bucket.
    pub mark: Duration,
    pub count: usize,
    pub frequency: f64,
}

/// Fixed-bucket latency distribution of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    buckets: Vec<Bucket>,
    total: usize,
}

impl Histogram {
    /// Builds a histogram with [`NUM_BUCKETS`] buckets.
    ///
    /// Returns `None` when fewer than [`MIN_SAMPLES`] samples are given.
    pub fn new(samples: &[Duration]) -> Option<Self> {
        Self::with_buckets(samples, NUM_BUCKETS)
    }

    pub fn with_buckets(samples: &[Duration], num_buckets: usize) -> Option<Self> {
        if samples.len() < MIN_SAMPLES {
            return None;
        }
        let num_buckets = num_buckets.max(1);

        let sorted = sort_ascending(samples);
        let fastest = sorted[0];
        let slowest = sorted[sorted.len() - 1];

        let width = (slowest - fastest).as_nanos() as f64 / num_buckets as f64;
        let mut marks: Vec<Duration> = (0..num_buckets)
            .map(|i| fastest + Duration::from_nanos((i as f64 * width) as u64))
            .collect();
        // Exact maximum, not fastest + n*width, so rounding never drops it.
        marks.push(slowest);

        let mut counts = vec![0usize; marks.len()];
        let mut bi = 0;
        let mut i = 0;
        while i < sorted.len() {
            if sorted[i] <= marks[bi] || bi == marks.len() - 1 {
                counts[bi] += 1;
                i += 1;
            } else {
                bi += 1;
            }
        }

        let total = sorted.len();
        let buckets = marks
            .into_iter()
            .zip(counts)
            .map(|(mark, count)| Bucket {
                mark,
                count,
                frequency: count as f64 / total as f64,
            })
            .collect();

        Some(Histogram { buckets, total })
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Number of samples the histogram was built from.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Renders one line per bucket: `<mark> (<count>) : <bar>`.
    ///
    /// Bars are scaled so the fullest bucket is `bar_width` characters;
    /// any non-empty bucket gets at least one character.
    pub fn render(&self, bar_width: usize) -> String {
        let max = self.buckets.iter().map(|b| b.count).max().unwrap_or(0);

        let mut out = String::new();
        for bucket in &self.buckets {
            let mut bar_len = if max > 0 {
                (bucket.count * bar_width + max / 2) / max
            } else {
                0
            };
            if bucket.count > 0 && bar_len == 0 {
                bar_len = 1;
            }

            let mark = format!("{:?}", bucket.mark);
            let bar: String = std::iter::repeat_n(BAR_CHAR, bar_len).collect();
            let line = format!("  {:<12} ({}) : {}", mark, bucket.count, bar);
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(BAR_WIDTH))
    }
}
