//! Run orchestration
//!
//! The driver executes a plan level by level. Within a level, instances
//! run concurrently up to the configured job limit; after any failure the
//! level's running siblings settle, every transitive dependent is marked
//! skipped, and the run stops. The ledger is checkpointed after every
//! transition so an interrupted run resumes exactly where it stopped.

use shipwright_config::{calculate_jobs, load_settings_file, Config, SigningConfig};
use shipwright_errors::{Error, RunError, StageError, UserFacingError};
use shipwright_events::{AppEvent, EventEmitter, EventSender, FailureContext, PipelineEvent};
use shipwright_graph::{ExecutionPlan, InstanceKind, PipelineSpec, StageInstance};
use shipwright_signing::CredentialGroup;
use shipwright_store::ArtifactStore;
use shipwright_types::{InstanceStatus, ReleaseTag, RunId};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::environment::RunContext;
use crate::executor::StageExecutor;
use crate::state::{RunState, StatusCounts, SKIP_CONDITION, SKIP_UPSTREAM, STATE_FILE};

/// Copy of the pipeline declaration inside a run directory
pub const PIPELINE_COPY: &str = "pipeline.toml";
/// Copy of the settings file inside a run directory
pub const SETTINGS_COPY: &str = "settings.env";
const STORE_DIR: &str = "store";
const WORK_DIR: &str = "work";

/// Options for starting a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Settings file whose entries seed every stage environment
    pub settings_path: Option<PathBuf>,
    /// Credential group; the configured default applies when unset
    pub signing_group: Option<String>,
}

/// Outcome of one driver execution
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub success: bool,
    pub counts: StatusCounts,
    pub duration: Duration,
}

/// Build a plan and report it through events
///
/// # Errors
///
/// Returns the validation error when the pipeline is rejected.
pub fn plan_pipeline(
    spec: &PipelineSpec,
    tag: &ReleaseTag,
    tx: &EventSender,
) -> Result<ExecutionPlan, Error> {
    tx.emit(AppEvent::Pipeline(PipelineEvent::PlanStarted {
        pipeline: spec.name.clone(),
        tag: tag.clone(),
    }));
    match ExecutionPlan::build(spec, tag) {
        Ok(plan) => {
            tx.emit(AppEvent::Pipeline(PipelineEvent::PlanCompleted {
                pipeline: spec.name.clone(),
                instances: plan.instance_count(),
                gated_off: plan.gated_off.len(),
                levels: plan.levels.len(),
            }));
            Ok(plan)
        }
        Err(error) => {
            tx.emit(AppEvent::Pipeline(PipelineEvent::PlanInvalid {
                pipeline: spec.name.clone(),
                failure: FailureContext::from_error(&error),
            }));
            Err(error)
        }
    }
}

/// Orchestrates one run of a plan
#[derive(Debug)]
pub struct RunDriver {
    plan: ExecutionPlan,
    state: RunState,
    state_path: PathBuf,
    executor: Arc<StageExecutor>,
    jobs: usize,
    tx: EventSender,
}

impl RunDriver {
    /// Plan a pipeline for a tag and set up a fresh run directory
    ///
    /// The run directory keeps its own copies of the pipeline and settings
    /// so a later resume sees exactly what this run was started with.
    ///
    /// # Errors
    ///
    /// Returns plan validation errors, signing group resolution errors,
    /// and I/O errors from setting up the run directory.
    pub async fn create(
        config: &Config,
        spec: &PipelineSpec,
        tag: ReleaseTag,
        options: RunOptions,
        tx: EventSender,
    ) -> Result<Self, Error> {
        let plan = plan_pipeline(spec, &tag, &tx)?;

        let signing_group = options
            .signing_group
            .clone()
            .unwrap_or_else(|| config.signing.default_group.clone());
        validate_signing_groups(&plan, &config.signing, &signing_group)?;

        let run_id = Uuid::new_v4();
        let run_dir = config.work_root().join(run_id.to_string());
        fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &run_dir))?;

        let pipeline_toml = toml::to_string(spec)
            .map_err(|e| Error::internal(format!("pipeline serialization: {e}")))?;
        let pipeline_copy = run_dir.join(PIPELINE_COPY);
        fs::write(&pipeline_copy, pipeline_toml)
            .await
            .map_err(|e| Error::io_with_path(&e, &pipeline_copy))?;

        let settings = match &options.settings_path {
            Some(path) => {
                let settings = load_settings_file(path).await?;
                fs::copy(path, run_dir.join(SETTINGS_COPY))
                    .await
                    .map_err(|e| Error::io_with_path(&e, path))?;
                settings
            }
            None => BTreeMap::new(),
        };

        let store = ArtifactStore::create(run_dir.join(STORE_DIR)).await?;

        let state = RunState::new(
            run_id,
            spec.name.clone(),
            tag.clone(),
            signing_group.clone(),
            &plan,
        );
        let state_path = run_dir.join(STATE_FILE);
        state.checkpoint(&state_path).await?;

        let executor = Arc::new(StageExecutor::new(
            store,
            RunContext { run_id, tag },
            settings,
            config.signing.clone(),
            signing_group,
            run_dir.join(WORK_DIR),
            tx.clone(),
        ));

        Ok(Self {
            plan,
            state,
            state_path,
            executor,
            jobs: calculate_jobs(config.general.jobs),
            tx,
        })
    }

    /// Reopen a checkpointed run from its directory under the work root
    ///
    /// Completed instances keep their published artifacts; everything
    /// else re-runs. A finished run refuses to resume.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown run id, `AlreadyFinished` for a
    /// finished run, and errors from rebuilding the plan or reopening the
    /// store.
    pub async fn resume(config: &Config, run_id: &str, tx: EventSender) -> Result<Self, Error> {
        let run_dir = config.work_root().join(run_id);
        if !fs::try_exists(&run_dir).await.unwrap_or(false) {
            return Err(RunError::NotFound {
                run_id: run_id.to_string(),
                path: config.work_root().display().to_string(),
            }
            .into());
        }

        let state_path = run_dir.join(STATE_FILE);
        let mut state = RunState::load(&state_path).await?;
        if state.finished {
            return Err(RunError::AlreadyFinished {
                run_id: run_id.to_string(),
            }
            .into());
        }
        state.normalize_interrupted();

        let pipeline_path = run_dir.join(PIPELINE_COPY);
        if !fs::try_exists(&pipeline_path).await.unwrap_or(false) {
            return Err(RunError::PipelineCopyMissing {
                run_id: run_id.to_string(),
                path: pipeline_path.display().to_string(),
            }
            .into());
        }
        let spec = PipelineSpec::load(&pipeline_path).await?;
        let plan = plan_pipeline(&spec, &state.tag, &tx)?;
        validate_signing_groups(&plan, &config.signing, &state.signing_group)?;

        let settings_path = run_dir.join(SETTINGS_COPY);
        let settings = if fs::try_exists(&settings_path).await.unwrap_or(false) {
            load_settings_file(&settings_path).await?
        } else {
            BTreeMap::new()
        };

        let store = ArtifactStore::open(run_dir.join(STORE_DIR)).await?;

        let remaining = plan
            .levels
            .iter()
            .flatten()
            .filter(|name| state.needs_run(name))
            .count();
        tx.emit(AppEvent::Pipeline(PipelineEvent::RunResumed {
            run_id: state.run_id,
            remaining,
            completed: state.counts().completed,
        }));

        let executor = Arc::new(StageExecutor::new(
            store,
            RunContext {
                run_id: state.run_id,
                tag: state.tag.clone(),
            },
            settings,
            config.signing.clone(),
            state.signing_group.clone(),
            run_dir.join(WORK_DIR),
            tx.clone(),
        ));

        Ok(Self {
            plan,
            state,
            state_path,
            executor,
            jobs: calculate_jobs(config.general.jobs),
            tx,
        })
    }

    #[must_use]
    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.state.run_id
    }

    /// Execute the plan level by level
    ///
    /// Stage failures do not error this method; they are recorded in the
    /// ledger and reflected in the summary.
    ///
    /// # Errors
    ///
    /// Returns tool preflight failures, ledger checkpoint I/O errors, and
    /// panics propagated from stage tasks.
    pub async fn execute(mut self) -> Result<RunSummary, Error> {
        let started = Instant::now();
        self.preflight_tools()?;

        self.tx.emit(AppEvent::Pipeline(PipelineEvent::RunStarted {
            run_id: self.state.run_id,
            pipeline: self.state.pipeline.clone(),
            tag: self.state.tag.clone(),
            instances: self.plan.instance_count(),
        }));
        for name in &self.plan.gated_off {
            self.tx.emit_stage_skipped(name, SKIP_CONDITION);
        }

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let levels = self.plan.levels.clone();

        for (level_index, level) in levels.iter().enumerate() {
            let runnable: Vec<StageInstance> = level
                .iter()
                .filter(|name| self.state.needs_run(name))
                .filter_map(|name| self.plan.instance(name).cloned())
                .collect();
            if runnable.is_empty() {
                continue;
            }

            self.tx.emit(AppEvent::Pipeline(PipelineEvent::LevelStarted {
                level: level_index,
                instances: runnable.len(),
            }));
            let level_started = Instant::now();

            for instance in &runnable {
                self.state.mark_running(&instance.name);
            }
            self.state.checkpoint(&self.state_path).await?;

            let mut tasks = JoinSet::new();
            for instance in runnable {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::internal(format!("semaphore closed: {e}")))?;
                let executor = Arc::clone(&self.executor);
                tasks.spawn(async move {
                    let _permit = permit;
                    let result = executor.execute(&instance).await;
                    (instance.name, result)
                });
            }

            let mut failed: Vec<String> = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((name, Ok(_artifacts))) => {
                        self.state.mark_completed(&name);
                    }
                    Ok((name, Err(error))) => {
                        self.tx
                            .emit_stage_failed(&name, FailureContext::from_error(&error));
                        self.state
                            .mark_failed(&name, error.user_message().into_owned());
                        failed.push(name);
                    }
                    Err(join_error) => {
                        return Err(Error::internal(format!(
                            "stage task panicked: {join_error}"
                        )));
                    }
                }
                self.state.checkpoint(&self.state_path).await?;
            }

            self.tx.emit(AppEvent::Pipeline(PipelineEvent::LevelCompleted {
                level: level_index,
                duration: level_started.elapsed(),
            }));

            if !failed.is_empty() {
                self.abandon_dependents(&failed).await?;
                break;
            }
        }

        let counts = self.state.counts();
        let success = counts.failed == 0 && counts.pending == 0 && counts.running == 0;
        if success {
            self.state.finished = true;
        }
        self.state.checkpoint(&self.state_path).await?;

        let summary = RunSummary {
            run_id: self.state.run_id,
            success,
            counts,
            duration: started.elapsed(),
        };
        self.tx.emit(AppEvent::Pipeline(PipelineEvent::RunCompleted {
            run_id: summary.run_id,
            success,
            completed: counts.completed,
            failed: counts.failed,
            skipped: counts.skipped,
            duration: summary.duration,
        }));
        Ok(summary)
    }

    /// Resolve every program the remaining run instances will spawn
    ///
    /// Programs with a path separator resolve relative to their work
    /// directory and templated programs resolve at execution time, so
    /// only bare names are checked against `PATH`.
    fn preflight_tools(&self) -> Result<(), Error> {
        let mut checked: BTreeSet<&str> = BTreeSet::new();
        let mut resolved: Vec<String> = Vec::new();

        for level in &self.plan.levels {
            for name in level {
                if !self.state.needs_run(name) {
                    continue;
                }
                let Some(instance) = self.plan.instance(name) else {
                    continue;
                };
                if instance.kind != InstanceKind::Run {
                    continue;
                }
                for argv in &instance.commands {
                    let Some(tool) = argv.first() else {
                        continue;
                    };
                    if tool.contains('/') || tool.contains("${") {
                        continue;
                    }
                    if !checked.insert(tool) {
                        continue;
                    }
                    if tool_on_path(tool) {
                        resolved.push(tool.clone());
                    } else {
                        self.tx.emit(AppEvent::Pipeline(PipelineEvent::ToolMissing {
                            stage: instance.name.clone(),
                            tool: tool.clone(),
                        }));
                        return Err(StageError::ToolNotFound {
                            stage: instance.name.clone(),
                            tool: tool.clone(),
                        }
                        .into());
                    }
                }
            }
        }

        if !resolved.is_empty() {
            self.tx
                .emit(AppEvent::Pipeline(PipelineEvent::ToolsResolved {
                    tools: resolved,
                }));
        }
        Ok(())
    }

    async fn abandon_dependents(&mut self, failed: &[String]) -> Result<(), Error> {
        let mut stranded: BTreeSet<String> = BTreeSet::new();
        for name in failed {
            stranded.extend(self.plan.transitive_dependents(name));
        }
        for name in &stranded {
            if self.state.status(name) == Some(InstanceStatus::Pending) {
                self.state.mark_skipped(name, SKIP_UPSTREAM);
                self.tx.emit_stage_skipped(name, SKIP_UPSTREAM);
            }
        }
        self.state.checkpoint(&self.state_path).await
    }
}

fn validate_signing_groups(
    plan: &ExecutionPlan,
    signing: &SigningConfig,
    default_group: &str,
) -> Result<(), Error> {
    let mut groups: BTreeSet<&str> = BTreeSet::from([default_group]);
    for instance in plan.instances.values() {
        if instance.kind == InstanceKind::Sign {
            if let Some(group) = &instance.signing_group {
                groups.insert(group);
            }
        }
    }
    for group in groups {
        CredentialGroup::resolve(group, signing)?;
    }
    Ok(())
}

fn tool_on_path(tool: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(tool).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_events::channel;
    use std::path::Path;
    use tempfile::tempdir;

    const COLUMN_PIPELINE: &str = r#"
name = "columns"

[axes]
arch = ["a1", "a2"]

[stages.build]
matrix = ["arch"]
produces = ["bin"]
commands = [
    ["sh", "-c", "echo ${arch} >> ${RUN_LOG}; test ${arch} = a2 -o -f ${MARKER}"],
    ["sh", "-c", "echo built-${arch} > ${OUT_bin}/app.txt"],
]

[stages.pack]
matrix = ["arch"]
consumes = ["bin"]
produces = ["pkg"]
commands = [["sh", "-c", "cp ${IN_bin}/app.txt ${OUT_pkg}/app-${VERSION}.txt"]]

[stages.merge]
consumes = ["pkg_a1", "pkg_a2"]
produces = ["release_tree"]
commands = [["sh", "-c", "cat ${IN_pkg_a1}/*.txt ${IN_pkg_a2}/*.txt > ${OUT_release_tree}/all.txt"]]
"#;

    fn test_config(work_root: &Path) -> Config {
        let mut config = Config {
            paths: shipwright_config::PathConfig {
                work_root: Some(work_root.to_path_buf()),
                ..Default::default()
            },
            ..Default::default()
        };
        config.general.jobs = 2;
        config
    }

    async fn write_settings(dir: &Path, marker: &Path, log: &Path) -> PathBuf {
        let path = dir.join("settings.env");
        let content = format!("MARKER={}\nRUN_LOG={}\n", marker.display(), log.display());
        fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_failed_column_strands_dependents_and_resume_recovers() {
        let temp = tempdir().unwrap();
        let config = test_config(&temp.path().join("runs"));
        let marker = temp.path().join("fixed");
        let log = temp.path().join("run.log");
        let settings = write_settings(temp.path(), &marker, &log).await;

        let spec = PipelineSpec::from_toml_str(COLUMN_PIPELINE).unwrap();
        let tag: ReleaseTag = "3.13.0".parse().unwrap();
        let options = RunOptions {
            settings_path: Some(settings),
            signing_group: None,
        };

        let (tx, mut rx) = channel();
        let driver = RunDriver::create(&config, &spec, tag, options, tx)
            .await
            .unwrap();
        let run_id = driver.run_id().to_string();

        // First run: build_a1 fails because the marker file is missing
        let summary = driver.execute().await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.counts.failed, 1);

        let state_path = config
            .work_root()
            .join(&run_id)
            .join(STATE_FILE);
        let state = RunState::load(&state_path).await.unwrap();
        assert_eq!(state.status("build_a1"), Some(InstanceStatus::Failed));
        assert_eq!(state.status("build_a2"), Some(InstanceStatus::Completed));
        assert_eq!(state.status("pack_a1"), Some(InstanceStatus::Skipped));
        assert_eq!(
            state.instances["pack_a1"].reason.as_deref(),
            Some(SKIP_UPSTREAM)
        );
        assert_eq!(state.status("merge"), Some(InstanceStatus::Skipped));
        // Not a dependent of the failure: left pending for the next attempt
        assert_eq!(state.status("pack_a2"), Some(InstanceStatus::Pending));
        assert!(!state.finished);

        while rx.try_recv().is_ok() {}

        // Second run: the marker exists, only non-completed instances re-run
        fs::write(&marker, b"").await.unwrap();
        let (tx, _rx) = channel();
        let driver = RunDriver::resume(&config, &run_id, tx).await.unwrap();
        let summary = driver.execute().await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.counts.completed, 5);
        assert_eq!(summary.counts.failed, 0);

        // build_a1 ran twice, build_a2 only once
        let log_content = fs::read_to_string(&log).await.unwrap();
        let runs: Vec<&str> = log_content.lines().collect();
        assert_eq!(runs.iter().filter(|l| **l == "a1").count(), 2);
        assert_eq!(runs.iter().filter(|l| **l == "a2").count(), 1);

        let state = RunState::load(&state_path).await.unwrap();
        assert!(state.finished);

        // A finished run refuses to resume
        let (tx, _rx) = channel();
        let err = RunDriver::resume(&config, &run_id, tx).await.unwrap_err();
        assert!(err.to_string().contains("already finished"));
    }

    #[tokio::test]
    async fn test_successful_run_merges_columns() {
        let temp = tempdir().unwrap();
        let config = test_config(&temp.path().join("runs"));
        let marker = temp.path().join("fixed");
        let log = temp.path().join("run.log");
        fs::write(&marker, b"").await.unwrap();
        let settings = write_settings(temp.path(), &marker, &log).await;

        let spec = PipelineSpec::from_toml_str(COLUMN_PIPELINE).unwrap();
        let tag: ReleaseTag = "3.13.0rc1".parse().unwrap();
        let (tx, mut rx) = channel();
        let driver = RunDriver::create(
            &config,
            &spec,
            tag,
            RunOptions {
                settings_path: Some(settings),
                signing_group: None,
            },
            tx,
        )
        .await
        .unwrap();
        let run_id = driver.run_id().to_string();

        let summary = driver.execute().await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.counts.completed, 5);

        // The merge output combines both columns
        let store = ArtifactStore::open(
            config.work_root().join(&run_id).join("store"),
        )
        .await
        .unwrap();
        let dest = temp.path().join("check");
        store.fetch("release_tree", &dest).await.unwrap();
        let merged = fs::read_to_string(dest.join("all.txt")).await.unwrap();
        assert!(merged.contains("built-a1"));
        assert!(merged.contains("built-a2"));

        let mut saw_run_completed = false;
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Pipeline(PipelineEvent::RunCompleted { success, .. }) = event {
                saw_run_completed = true;
                assert!(success);
            }
        }
        assert!(saw_run_completed);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_preflight() {
        let temp = tempdir().unwrap();
        let config = test_config(&temp.path().join("runs"));

        let pipeline = r#"
name = "demo"

[stages.build]
produces = ["bin"]
commands = [["definitely-not-a-real-tool-9000"]]
"#;
        let spec = PipelineSpec::from_toml_str(pipeline).unwrap();
        let tag: ReleaseTag = "3.13.0".parse().unwrap();
        let (tx, _rx) = channel();
        let driver = RunDriver::create(&config, &spec, tag, RunOptions::default(), tx)
            .await
            .unwrap();

        let err = driver.execute().await.unwrap_err();
        assert!(err.to_string().contains("tool not found"));
        assert!(err
            .to_string()
            .contains("definitely-not-a-real-tool-9000"));
    }

    #[tokio::test]
    async fn test_unknown_signing_group_is_fatal_before_any_stage_runs() {
        let temp = tempdir().unwrap();
        let config = test_config(&temp.path().join("runs"));

        let pipeline = r#"
name = "demo"

[stages.build]
produces = ["unsigned_bin"]
commands = [["true"]]

[stages.sign]
consumes = ["unsigned_bin"]
produces = ["bin"]
sign = true
"#;
        let spec = PipelineSpec::from_toml_str(pipeline).unwrap();
        let tag: ReleaseTag = "3.13.0".parse().unwrap();
        let (tx, _rx) = channel();
        let err = RunDriver::create(
            &config,
            &spec,
            tag,
            RunOptions {
                settings_path: None,
                signing_group: Some("no-such-group".to_string()),
            },
            tx,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no-such-group"));
    }

    #[tokio::test]
    async fn test_resume_unknown_run_is_rejected() {
        let temp = tempdir().unwrap();
        let config = test_config(&temp.path().join("runs"));
        fs::create_dir_all(config.work_root()).await.unwrap();

        let (tx, _rx) = channel();
        let err = RunDriver::resume(&config, "no-such-run", tx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
