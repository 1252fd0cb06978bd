pub mod config;
pub mod errors;
pub mod executor;
pub mod histogram;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod stats;
pub mod types;
