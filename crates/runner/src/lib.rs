#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Run orchestration for shipwright
//!
//! This crate turns an execution plan into a finished release run. The
//! driver walks the plan's levels, the executor runs each stage instance
//! in a fresh work directory against the run's artifact store, and the
//! ledger checkpoints every status transition so interrupted runs can be
//! resumed.

mod driver;
mod environment;
mod executor;
mod state;

pub use driver::{
    plan_pipeline, RunDriver, RunOptions, RunSummary, PIPELINE_COPY, SETTINGS_COPY,
};
pub use environment::{RunContext, StageEnvironment};
pub use executor::StageExecutor;
pub use state::{
    InstanceRecord, RunState, StatusCounts, SKIP_CONDITION, SKIP_INTERRUPTED, SKIP_UPSTREAM,
    STATE_FILE,
};
