use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::errors::BenchError;
use crate::types::{ATTEMPT_BUDGET_FACTOR, Sample};

/// Shared abort flag, checked before every attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    FatallyFailed,
}

/// Samples collected by a completed run, in the order trials succeeded.
#[derive(Debug, Clone)]
pub struct TrialRun {
    pub samples: Vec<Sample>,
    pub attempts: usize,
}

/// Drives an operation until `trials` successes, retrying failures up to
/// an attempt budget of `2 * trials`.
///
/// `run` consumes the runner, so a runner cannot be reused or shared
/// between threads mid-run. Independent runners may run concurrently.
#[derive(Debug)]
pub struct TrialRunner {
    label: String,
    trials: usize,
    cancel: CancelToken,
    state: RunState,
}

impl TrialRunner {
    pub fn new(trials: usize) -> Result<Self, BenchError> {
        if trials == 0 {
            return Err(BenchError::InvalidTrialCount { trials });
        }
        Ok(TrialRunner {
            label: String::new(),
            trials,
            cancel: CancelToken::new(),
            state: RunState::Idle,
        })
    }

    /// Name used in log events.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn attempt_budget(&self) -> usize {
        self.trials * ATTEMPT_BUDGET_FACTOR
    }

    pub fn run<F>(mut self, mut op: F) -> Result<TrialRun, BenchError>
    where
        F: FnMut() -> anyhow::Result<Sample>,
    {
        let budget = self.attempt_budget();
        let mut samples = Vec::with_capacity(self.trials);
        let mut attempts = 0;
        let mut last_error: Option<anyhow::Error> = None;

        self.transition(RunState::Running);

        while samples.len() < self.trials {
            if self.cancel.is_cancelled() {
                warn!(benchmark = %self.label, completed = samples.len(), "run cancelled");
                self.transition(RunState::FatallyFailed);
                return Err(BenchError::Cancelled {
                    completed: samples.len(),
                    target: self.trials,
                });
            }

            if attempts >= budget {
                let last_error = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                error!(
                    benchmark = %self.label,
                    attempts,
                    successes = samples.len(),
                    error = %last_error,
                    "attempt budget exhausted"
                );
                self.transition(RunState::FatallyFailed);
                return Err(BenchError::AttemptBudgetExceeded {
                    attempts,
                    target: self.trials,
                    last_error,
                });
            }

            attempts += 1;
            match op() {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    let err = match err.downcast::<BenchError>() {
                        Ok(fatal) if fatal.aborts_run() => {
                            error!(
                                benchmark = %self.label,
                                attempt = attempts,
                                error = %fatal,
                                "trial cannot be retried"
                            );
                            self.transition(RunState::FatallyFailed);
                            return Err(fatal);
                        }
                        Ok(other) => anyhow::Error::new(other),
                        Err(err) => err,
                    };
                    debug!(benchmark = %self.label, attempt = attempts, error = %err, "trial failed");
                    last_error = Some(err);
                }
            }
        }

        self.transition(RunState::Completed);
        info!(benchmark = %self.label, trials = self.trials, attempts, "run completed");

        Ok(TrialRun { samples, attempts })
    }

    fn transition(&mut self, next: RunState) {
        debug!(benchmark = %self.label, from = ?self.state, to = ?next, "runner state");
        self.state = next;
    }
}
