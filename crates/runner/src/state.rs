//! Per-run ledger
//!
//! One JSON file per run records the status of every stage instance. The
//! driver checkpoints it after each transition with a temp-file rename, so
//! a crash never leaves a torn ledger and `resume` can trust what it reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shipwright_errors::{Error, RunError};
use shipwright_graph::ExecutionPlan;
use shipwright_types::{InstanceStatus, ReleaseTag, RunId};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Ledger file name inside a run directory
pub const STATE_FILE: &str = "state.json";

/// Skip reason for instances gated off by their stage condition
pub const SKIP_CONDITION: &str = "condition";
/// Skip reason for transitive dependents of a failed instance
pub const SKIP_UPSTREAM: &str = "upstream-failed";
/// Skip reason applied when a crashed run left an instance mid-flight
pub const SKIP_INTERRUPTED: &str = "interrupted";

/// Status record for one stage instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub status: InstanceStatus,
    /// Why the instance failed or was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    fn pending() -> Self {
        Self {
            status: InstanceStatus::Pending,
            reason: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Counts per status, for summaries and the status command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.skipped
    }
}

/// Checkpointed record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub pipeline: String,
    pub tag: ReleaseTag,
    /// Credential group the run was started with
    pub signing_group: String,
    pub created_at: DateTime<Utc>,
    /// Set once every instance completed; a finished run refuses to resume
    pub finished: bool,
    pub instances: BTreeMap<String, InstanceRecord>,
}

impl RunState {
    /// Seed a fresh ledger from a plan
    ///
    /// Enabled instances start pending; instances gated off by their
    /// stage condition are recorded skipped up front so the ledger shows
    /// the full picture of the release.
    #[must_use]
    pub fn new(
        run_id: RunId,
        pipeline: String,
        tag: ReleaseTag,
        signing_group: String,
        plan: &ExecutionPlan,
    ) -> Self {
        let mut instances = BTreeMap::new();
        for name in plan.instances.keys() {
            instances.insert(name.clone(), InstanceRecord::pending());
        }
        for name in &plan.gated_off {
            instances.insert(
                name.clone(),
                InstanceRecord {
                    status: InstanceStatus::Skipped,
                    reason: Some(SKIP_CONDITION.to_string()),
                    started_at: None,
                    finished_at: None,
                },
            );
        }
        Self {
            run_id,
            pipeline,
            tag,
            signing_group,
            created_at: Utc::now(),
            finished: false,
            instances,
        }
    }

    /// Load a ledger from disk
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is unreadable and
    /// `LedgerCorrupted` if it does not parse.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        serde_json::from_str(&content).map_err(|e| {
            Error::from(RunError::LedgerCorrupted {
                message: e.to_string(),
            })
        })
    }

    /// Write the ledger to disk atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written or renamed.
    pub async fn checkpoint(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| Error::io_with_path(&e, &tmp))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        Ok(())
    }

    fn record_mut(&mut self, name: &str) -> &mut InstanceRecord {
        self.instances
            .entry(name.to_string())
            .or_insert_with(InstanceRecord::pending)
    }

    pub fn mark_running(&mut self, name: &str) {
        let record = self.record_mut(name);
        record.status = InstanceStatus::Running;
        record.reason = None;
        record.started_at = Some(Utc::now());
        record.finished_at = None;
    }

    pub fn mark_completed(&mut self, name: &str) {
        let record = self.record_mut(name);
        record.status = InstanceStatus::Completed;
        record.reason = None;
        record.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, name: &str, reason: impl Into<String>) {
        let record = self.record_mut(name);
        record.status = InstanceStatus::Failed;
        record.reason = Some(reason.into());
        record.finished_at = Some(Utc::now());
    }

    pub fn mark_skipped(&mut self, name: &str, reason: impl Into<String>) {
        let record = self.record_mut(name);
        record.status = InstanceStatus::Skipped;
        record.reason = Some(reason.into());
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<InstanceStatus> {
        self.instances.get(name).map(|r| r.status)
    }

    /// Whether an instance still needs work on this or a resumed run
    #[must_use]
    pub fn needs_run(&self, name: &str) -> bool {
        self.status(name).is_none_or(InstanceStatus::needs_run)
    }

    /// Demote instances that were mid-flight when the process died
    ///
    /// A `running` record in a loaded ledger means the previous process
    /// crashed before settling it. The instance re-runs from scratch.
    pub fn normalize_interrupted(&mut self) {
        for record in self.instances.values_mut() {
            if record.status == InstanceStatus::Running {
                record.status = InstanceStatus::Pending;
                record.reason = Some(SKIP_INTERRUPTED.to_string());
            }
        }
    }

    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.instances.values() {
            match record.status {
                InstanceStatus::Pending => counts.pending += 1,
                InstanceStatus::Running => counts.running += 1,
                InstanceStatus::Completed => counts.completed += 1,
                InstanceStatus::Failed => counts.failed += 1,
                InstanceStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_graph::PipelineSpec;
    use tempfile::tempdir;
    use uuid::Uuid;

    const PIPELINE: &str = r#"
name = "demo"

[stages.build]
produces = ["bin"]
commands = [["make"]]

[stages.publish]
consumes = ["bin"]
commands = [["upload.sh"]]
condition = "stable-only"
"#;

    fn sample_state(tag: &str) -> RunState {
        let spec = PipelineSpec::from_toml_str(PIPELINE).unwrap();
        let tag: ReleaseTag = tag.parse().unwrap();
        let plan = ExecutionPlan::build(&spec, &tag).unwrap();
        RunState::new(
            Uuid::new_v4(),
            "demo".to_string(),
            tag,
            "unsigned".to_string(),
            &plan,
        )
    }

    #[test]
    fn test_new_seeds_pending_and_gated() {
        let state = sample_state("3.14.0a1");
        assert_eq!(state.status("build"), Some(InstanceStatus::Pending));
        assert_eq!(state.status("publish"), Some(InstanceStatus::Skipped));
        assert_eq!(
            state.instances["publish"].reason.as_deref(),
            Some(SKIP_CONDITION)
        );
        assert!(!state.finished);
    }

    #[test]
    fn test_transitions_and_counts() {
        let mut state = sample_state("3.13.0");
        assert!(state.needs_run("build"));

        state.mark_running("build");
        assert_eq!(state.status("build"), Some(InstanceStatus::Running));
        assert!(state.instances["build"].started_at.is_some());
        assert!(!state.needs_run("build"));

        state.mark_completed("build");
        assert!(!state.needs_run("build"));
        assert!(state.instances["build"].finished_at.is_some());

        state.mark_failed("publish", "command exited with status 1");
        assert!(state.needs_run("publish"));

        let counts = state.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_normalize_interrupted_demotes_running() {
        let mut state = sample_state("3.13.0");
        state.mark_running("build");

        state.normalize_interrupted();
        assert_eq!(state.status("build"), Some(InstanceStatus::Pending));
        assert_eq!(
            state.instances["build"].reason.as_deref(),
            Some(SKIP_INTERRUPTED)
        );
        assert!(state.needs_run("build"));
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);

        let mut state = sample_state("3.13.0rc1");
        state.mark_running("build");
        state.mark_completed("build");
        state.checkpoint(&path).await.unwrap();

        let loaded = RunState::load(&path).await.unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.tag, state.tag);
        assert_eq!(loaded.status("build"), Some(InstanceStatus::Completed));
        assert_eq!(loaded.signing_group, "unsigned");
    }

    #[tokio::test]
    async fn test_corrupted_ledger_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = RunState::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("ledger is corrupted"));
    }
}
