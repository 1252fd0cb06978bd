use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("Query failed too many times ({attempts} attempts for {target} trials): {last_error}")]
    AttemptBudgetExceeded {
        attempts: usize,
        target: usize,
        last_error: String,
    },

    #[error("Cannot summarize an empty set of samples")]
    EmptyInput,

    #[error("Trial count must be at least 1, got {trials}")]
    InvalidTrialCount { trials: usize },

    #[error("Run cancelled after {completed} of {target} trials")]
    Cancelled { completed: usize, target: usize },

    #[error("Failed to read the config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse the config file {path}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    #[error("Invalid config: {detail}")]
    InvalidConfig { detail: String },

    #[error("Failed to start client program '{program}': {source}")]
    ExecutorSpawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Worker {worker} panicked while running '{benchmark}'")]
    WorkerPanicked { worker: usize, benchmark: String },
}

impl BenchError {
    /// True for conditions that must abort the whole run with the
    /// dedicated exit status.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, BenchError::AttemptBudgetExceeded { .. })
    }

    /// True for operation errors that retrying cannot fix, such as a
    /// client program that cannot be started.
    pub fn aborts_run(&self) -> bool {
        matches!(self, BenchError::ExecutorSpawn { .. })
    }
}
