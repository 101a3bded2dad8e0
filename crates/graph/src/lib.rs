#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Pipeline declaration and execution planning
//!
//! A pipeline is a static TOML declaration of stages with named-artifact
//! handoff. Planning expands it for one release tag: conditions gate stages
//! by channel, matrix axes fan out per-variant instances, validation rejects
//! duplicate names, missing producers, and cycles, and the result is a
//! topologically-levelled plan the run driver walks level by level.

mod condition;
mod expand;
mod plan;
mod spec;

pub use condition::StageCondition;
pub use expand::{ArtifactBinding, InstanceKind, StageInstance};
pub use plan::ExecutionPlan;
pub use spec::{AxisValueSpec, ConditionSpec, PipelineSpec, StageSpec};
