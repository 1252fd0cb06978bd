use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::histogram::Histogram;

/// Default number of successful trials per benchmark.
pub const DEFAULT_TRIALS: usize = 20;

/// Total attempts allowed per successful trial.
pub const ATTEMPT_BUDGET_FACTOR: usize = 2;

/// Measurement produced by one successful trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    pub elapsed: Duration,
    pub cpu_time: Option<Duration>,
    pub plan_time: Option<Duration>,
    pub rows_scanned: Option<u64>,
    pub rows_returned: Option<u64>,
}

impl Sample {
    pub fn new(elapsed: Duration) -> Self {
        Sample {
            elapsed,
            ..Default::default()
        }
    }

    pub fn with_cpu_time(mut self, cpu_time: Duration) -> Self {
        self.cpu_time = Some(cpu_time);
        self
    }

    pub fn with_plan_time(mut self, plan_time: Duration) -> Self {
        self.plan_time = Some(plan_time);
        self
    }

    pub fn with_rows(mut self, scanned: u64, returned: u64) -> Self {
        self.rows_scanned = Some(scanned);
        self.rows_returned = Some(returned);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl TransactionMode {
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            TransactionMode::ReadOnly
        } else {
            TransactionMode::ReadWrite
        }
    }

    /// Short label passed to the client program.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionMode::ReadOnly => "ro",
            TransactionMode::ReadWrite => "rw",
        }
    }
}

/// Read staleness bound for read-only transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Max(Duration),
    Exact(Duration),
}

impl Staleness {
    pub fn duration(self) -> Duration {
        match self {
            Staleness::Max(d) | Staleness::Exact(d) => d,
        }
    }
}

/// A named benchmark, fully resolved from the config file.
#[derive(Debug, Clone)]
pub struct BenchmarkDefinition {
    pub name: String,
    pub sql: String,
    pub trials: usize,
    pub mode: TransactionMode,
    /// Optimizer versions to compare. An empty string selects the
    /// backend default.
    pub optimizers: Vec<String>,
    pub staleness: Option<Staleness>,
}

impl BenchmarkDefinition {
    pub fn attempt_budget(&self) -> usize {
        self.trials * ATTEMPT_BUDGET_FACTOR
    }

    /// SQL body split into statements on `;`, blank statements dropped.
    pub fn statements(&self) -> Vec<String> {
        split_statements(&self.sql)
    }
}

pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    #[default]
    Median,
    Histogram,
}

/// Per-dimension medians of one completed run. Dimensions no sample
/// reported are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianSummary {
    pub elapsed: Duration,
    pub elapsed_p95: Duration,
    pub cpu_time: Option<Duration>,
    pub plan_time: Option<Duration>,
    pub rows_scanned: Option<u64>,
    pub rows_returned: Option<u64>,
    pub samples: usize,
}

#[derive(Debug, Clone)]
pub enum SummaryStatistic {
    Median(MedianSummary),
    /// `None` when there were too few samples to bucket.
    Histogram(Option<Histogram>),
}
