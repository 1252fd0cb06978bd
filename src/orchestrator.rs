use std::io::Write;
use std::thread;

use anyhow::Result;
use tracing::{info, info_span};

use crate::config::Config;
use crate::errors::BenchError;
use crate::executor::{Query, QueryExecutor};
use crate::histogram::Histogram;
use crate::report;
use crate::runner::{CancelToken, TrialRunner};
use crate::types::{
    BenchmarkDefinition, MedianSummary, ReportMode, Sample, SummaryStatistic, TransactionMode,
};

/// Result of running one benchmark with one optimizer version on one worker.
#[derive(Debug, Clone)]
pub struct TrialResult {
    pub optimizer: String,
    /// `None` when the benchmark ran on the calling thread.
    pub worker: Option<usize>,
    pub samples: usize,
    pub attempts: usize,
    pub summary: SummaryStatistic,
}

impl TrialResult {
    /// Label printed in front of the result line.
    pub fn label(&self) -> String {
        let optimizer = if self.optimizer.is_empty() {
            "default"
        } else {
            self.optimizer.as_str()
        };
        match self.worker {
            Some(w) => format!("{} [worker {}]", optimizer, w),
            None => optimizer.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub name: String,
    pub trials: usize,
    pub mode: TransactionMode,
    pub results: Vec<TrialResult>,
}

/// Reduces a completed batch of samples into the configured statistic.
pub fn summarize(samples: &[Sample], mode: ReportMode) -> Result<SummaryStatistic, BenchError> {
    match mode {
        ReportMode::Median => MedianSummary::from_samples(samples).map(SummaryStatistic::Median),
        ReportMode::Histogram => {
            let elapsed: Vec<_> = samples.iter().map(|s| s.elapsed).collect();
            Ok(SummaryStatistic::Histogram(Histogram::new(&elapsed)))
        }
    }
}

/// Runs every benchmark of a config against one shared executor.
pub struct Orchestrator<'a> {
    config: &'a Config,
    executor: &'a dyn QueryExecutor,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, executor: &'a dyn QueryExecutor) -> Self {
        Orchestrator {
            config,
            executor,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the benchmarks in order, writing each text report to `out` as
    /// soon as it completes. Stops at the first fatal error; a failed
    /// benchmark writes nothing.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<Vec<BenchmarkReport>> {
        let mut reports = Vec::with_capacity(self.config.benchmarks.len());
        for def in &self.config.benchmarks {
            let report = self.run_benchmark(def)?;
            out.write_all(report::format_benchmark(&report, self.config.report).as_bytes())?;
            out.flush()?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn run_benchmark(&self, def: &BenchmarkDefinition) -> Result<BenchmarkReport, BenchError> {
        let _span = info_span!("benchmark", name = %def.name).entered();
        info!(
            trials = def.trials,
            mode = def.mode.as_str(),
            workers = self.config.workers,
            "starting benchmark"
        );

        let statements = def.statements();
        let mut results = Vec::new();
        for optimizer in &def.optimizers {
            let query = self.make_query(def, &statements, optimizer);
            if self.config.workers > 1 {
                results.extend(self.run_workers(def, &query)?);
            } else {
                results.push(self.run_trials(def, &query, None)?);
            }
        }

        Ok(BenchmarkReport {
            name: def.name.clone(),
            trials: def.trials,
            mode: def.mode,
            results,
        })
    }

    fn make_query<'q>(
        &self,
        def: &BenchmarkDefinition,
        statements: &'q [String],
        optimizer: &'q str,
    ) -> Query<'q> {
        match def.mode {
            TransactionMode::ReadOnly => Query {
                statements,
                optimizer,
                mode: TransactionMode::ReadOnly,
                staleness: def.staleness,
            },
            // Staleness bounds only apply to reads.
            TransactionMode::ReadWrite => Query {
                statements,
                optimizer,
                mode: TransactionMode::ReadWrite,
                staleness: None,
            },
        }
    }

    fn run_trials(
        &self,
        def: &BenchmarkDefinition,
        query: &Query<'_>,
        worker: Option<usize>,
    ) -> Result<TrialResult, BenchError> {
        let label = match worker {
            Some(w) => format!("{}/{}#{}", def.name, query.optimizer, w),
            None => format!("{}/{}", def.name, query.optimizer),
        };
        let run = TrialRunner::new(def.trials)?
            .with_label(label)
            .with_cancel(self.cancel.clone())
            .run(|| self.executor.execute(query))?;
        debug_assert_eq!(run.samples.len(), def.trials);

        Ok(TrialResult {
            optimizer: query.optimizer.to_string(),
            worker,
            samples: run.samples.len(),
            attempts: run.attempts,
            summary: summarize(&run.samples, self.config.report)?,
        })
    }

    /// One runner per worker thread. The first fatal error cancels the
    /// remaining workers and is returned.
    fn run_workers(
        &self,
        def: &BenchmarkDefinition,
        query: &Query<'_>,
    ) -> Result<Vec<TrialResult>, BenchError> {
        let outcomes: Vec<Result<TrialResult, BenchError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..self.config.workers)
                .map(|w| {
                    s.spawn(move || {
                        let result = self.run_trials(def, query, Some(w));
                        if result.is_err() {
                            self.cancel.cancel();
                        }
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(w, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        self.cancel.cancel();
                        Err(BenchError::WorkerPanicked {
                            worker: w,
                            benchmark: def.name.clone(),
                        })
                    })
                })
                .collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        let mut first_error: Option<BenchError> = None;
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                // A worker cancelled by a sibling's failure is not the cause.
                Err(BenchError::Cancelled { .. }) if first_error.is_some() => {}
                Err(err @ BenchError::Cancelled { .. }) => first_error = Some(err),
                Err(err) => {
                    if matches!(first_error, None | Some(BenchError::Cancelled { .. })) {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}
