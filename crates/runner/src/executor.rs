//! Stage instance execution
//!
//! Each instance runs in a fresh work directory: consumed artifacts are
//! materialized under `in/<base>/`, one directory per declared output is
//! created under `out/<base>/`, and on success every output directory is
//! published to the store under its expanded name. Run instances execute
//! their command list fail-fast; sign instances copy inputs to outputs
//! and route the files through the signing gate.

use shipwright_config::SigningConfig;
use shipwright_errors::{Error, StageError, StoreError};
use shipwright_events::{AppEvent, EventEmitter, EventSender, StageEvent, StoreEvent};
use shipwright_graph::{ArtifactBinding, InstanceKind, StageInstance};
use shipwright_signing::SigningGate;
use shipwright_store::ArtifactStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::process::Command;

use crate::environment::{RunContext, StageEnvironment};

const IN_DIR: &str = "in";
const OUT_DIR: &str = "out";
const STDERR_TAIL_LINES: usize = 20;

/// Executes stage instances against one run's store
#[derive(Debug)]
pub struct StageExecutor {
    store: ArtifactStore,
    context: RunContext,
    settings: BTreeMap<String, String>,
    signing: SigningConfig,
    default_group: String,
    work_root: PathBuf,
    tx: EventSender,
}

impl StageExecutor {
    #[must_use]
    pub fn new(
        store: ArtifactStore,
        context: RunContext,
        settings: BTreeMap<String, String>,
        signing: SigningConfig,
        default_group: String,
        work_root: PathBuf,
        tx: EventSender,
    ) -> Self {
        Self {
            store,
            context,
            settings,
            signing,
            default_group,
            work_root,
            tx,
        }
    }

    /// Execute one instance and publish its outputs
    ///
    /// Returns the expanded names of the published artifacts.
    ///
    /// # Errors
    ///
    /// Returns a stage error when an input is missing, a command fails,
    /// signing fails, or a declared output directory stays empty.
    pub async fn execute(&self, instance: &StageInstance) -> Result<Vec<String>, Error> {
        let started = Instant::now();
        let work_dir = self.work_root.join(&instance.name);
        prepare_work_dir(&work_dir).await?;

        self.tx.emit_stage_started(
            &instance.name,
            &instance.stage,
            instance.variant.suffix(),
            work_dir.clone(),
        );

        let inputs = self.materialize_inputs(instance, &work_dir).await?;
        let outputs = self.prepare_outputs(instance, &work_dir).await?;

        match instance.kind {
            InstanceKind::Run => {
                let env = StageEnvironment::build(
                    &self.settings,
                    &self.context,
                    instance,
                    &inputs,
                    &outputs,
                );
                self.run_commands(instance, &work_dir, &env).await?;
            }
            InstanceKind::Sign => self.sign_artifacts(instance, &inputs, &outputs).await?,
        }

        let published = self.publish_outputs(instance, &outputs).await?;
        self.tx
            .emit_stage_completed(&instance.name, published.clone(), started.elapsed());
        Ok(published)
    }

    async fn materialize_inputs(
        &self,
        instance: &StageInstance,
        work_dir: &Path,
    ) -> Result<BTreeMap<String, PathBuf>, Error> {
        let in_root = work_dir.join(IN_DIR);
        let mut inputs = BTreeMap::new();
        for binding in &instance.consumes {
            let dest = in_root.join(&binding.base);
            self.store
                .fetch(&binding.name, &dest)
                .await
                .map_err(|e| match e {
                    Error::Store(StoreError::ArtifactNotFound { .. }) => {
                        Error::from(StageError::MissingInput {
                            stage: instance.name.clone(),
                            artifact: binding.name.clone(),
                        })
                    }
                    other => other,
                })?;
            self.tx.emit(AppEvent::Store(StoreEvent::ArtifactFetched {
                name: binding.name.clone(),
                consumer: instance.name.clone(),
            }));
            inputs.insert(binding.base.clone(), dest);
        }
        if !inputs.is_empty() {
            self.tx.emit(AppEvent::Stage(StageEvent::InputsMaterialized {
                instance: instance.name.clone(),
                artifacts: inputs.len(),
            }));
        }
        Ok(inputs)
    }

    async fn prepare_outputs(
        &self,
        instance: &StageInstance,
        work_dir: &Path,
    ) -> Result<BTreeMap<String, PathBuf>, Error> {
        let out_root = work_dir.join(OUT_DIR);
        let mut outputs = BTreeMap::new();
        for binding in &instance.produces {
            let dir = out_root.join(&binding.base);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::io_with_path(&e, &dir))?;
            outputs.insert(binding.base.clone(), dir);
        }
        Ok(outputs)
    }

    async fn run_commands(
        &self,
        instance: &StageInstance,
        work_dir: &Path,
        env: &StageEnvironment,
    ) -> Result<(), Error> {
        for (index, template) in instance.commands.iter().enumerate() {
            let argv = env.expand_argv(&instance.name, template)?;
            let command_id = index.to_string();
            self.tx.emit(AppEvent::Stage(StageEvent::CommandStarted {
                instance: instance.name.clone(),
                command_id: command_id.clone(),
                program: argv[0].clone(),
                args: argv[1..].to_vec(),
            }));

            let started = Instant::now();
            let output = Command::new(&argv[0])
                .args(&argv[1..])
                .envs(env.exported())
                .current_dir(work_dir)
                .output()
                .await
                .map_err(|e| StageError::SpawnFailed {
                    stage: instance.name.clone(),
                    message: format!("{}: {e}", argv[0]),
                })?;

            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            self.emit_output_lines(instance, &command_id, &output.stdout, false);
            self.emit_output_lines(instance, &command_id, output.stderr.as_slice(), true);

            let Some(code) = output.status.code() else {
                return Err(StageError::CommandKilled {
                    stage: instance.name.clone(),
                }
                .into());
            };
            self.tx.emit(AppEvent::Stage(StageEvent::CommandCompleted {
                instance: instance.name.clone(),
                command_id,
                exit_code: code,
                duration: started.elapsed(),
            }));

            if code != 0 {
                let tail = tail_lines(&stderr, STDERR_TAIL_LINES);
                return Err(if tail.is_empty() {
                    Error::from(StageError::CommandFailed {
                        stage: instance.name.clone(),
                        code,
                    })
                } else {
                    Error::from(StageError::Failed {
                        stage: instance.name.clone(),
                        message: format!("`{}` exited with status {code}: {tail}", argv[0]),
                    })
                });
            }
        }
        Ok(())
    }

    fn emit_output_lines(
        &self,
        instance: &StageInstance,
        command_id: &str,
        bytes: &[u8],
        is_stderr: bool,
    ) {
        for line in String::from_utf8_lossy(bytes).lines() {
            self.tx.emit(AppEvent::Stage(StageEvent::CommandOutput {
                instance: instance.name.clone(),
                command_id: command_id.to_string(),
                line: line.to_string(),
                is_stderr,
            }));
        }
    }

    /// Copy each consumed artifact to its paired output, then route every
    /// file through the signing gate
    async fn sign_artifacts(
        &self,
        instance: &StageInstance,
        inputs: &BTreeMap<String, PathBuf>,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Result<(), Error> {
        let mut files = Vec::new();
        for (consumed, produced) in instance.consumes.iter().zip(&instance.produces) {
            let src = &inputs[&consumed.base];
            let dest = &outputs[&produced.base];
            copy_dir(src, dest).await?;
            collect_files(dest, &mut files).await?;
        }
        files.sort();

        let group = instance
            .signing_group
            .as_deref()
            .unwrap_or(&self.default_group);
        let gate = SigningGate::from_config(group, &self.signing, self.tx.clone())?;
        gate.sign_files(&instance.name, &files).await?;
        Ok(())
    }

    async fn publish_outputs(
        &self,
        instance: &StageInstance,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Result<Vec<String>, Error> {
        let mut published = Vec::with_capacity(instance.produces.len());
        for binding in &instance.produces {
            let src = &outputs[&binding.base];
            ensure_nonempty(instance, binding, src).await?;

            // Leftover from an interrupted earlier attempt of this instance
            if self.store.has_artifact(&binding.name) {
                self.store.retract(&binding.name, &instance.name).await?;
            }

            let receipt = self.store.publish(&binding.name, &instance.name, src).await?;
            self.tx.emit(AppEvent::Store(StoreEvent::ArtifactPublished {
                name: binding.name.clone(),
                producer: instance.name.clone(),
                files: receipt.file_count(),
                total_size: receipt.total_size(),
            }));
            published.push(binding.name.clone());
        }
        Ok(published)
    }
}

async fn prepare_work_dir(work_dir: &Path) -> Result<(), Error> {
    if fs::try_exists(work_dir).await.unwrap_or(false) {
        fs::remove_dir_all(work_dir)
            .await
            .map_err(|e| Error::io_with_path(&e, work_dir))?;
    }
    for sub in [IN_DIR, OUT_DIR] {
        let dir = work_dir.join(sub);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
    }
    Ok(())
}

async fn ensure_nonempty(
    instance: &StageInstance,
    binding: &ArtifactBinding,
    dir: &Path,
) -> Result<(), Error> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?;
    if entries.next_entry().await?.is_none() {
        return Err(StageError::MissingOutput {
            stage: instance.name.clone(),
            artifact: binding.name.clone(),
            path: dir.display().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Recursively copy a directory tree, preserving symlinks
async fn copy_dir(src: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    let mut entries = fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path).await?;

        if metadata.is_dir() {
            Box::pin(copy_dir(&src_path, &dest_path)).await?;
        } else if metadata.is_symlink() {
            let target = fs::read_link(&src_path).await?;
            #[cfg(unix)]
            {
                fs::symlink(&target, &dest_path).await?;
            }
            #[cfg(not(unix))]
            {
                let _ = target;
            }
        } else {
            fs::copy(&src_path, &dest_path).await?;
        }
    }
    Ok(())
}

async fn collect_files(root: &Path, files: &mut Vec<PathBuf>) -> Result<(), Error> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    Ok(())
}

fn tail_lines(text: &str, limit: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(limit);
    lines[start..].join("\n").trim().to_string()
}
