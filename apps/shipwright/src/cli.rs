//! Command line interface definition

use clap::{Parser, Subcommand};
use shipwright_types::{ColorChoice, ReleaseTag};
use std::path::{Path, PathBuf};

/// shipwright - Release pipeline orchestrator
#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release pipeline orchestrator")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to .shipwright/logs/
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Expand and validate a pipeline for a tag and print the plan
    Plan {
        /// Path to the pipeline declaration (.toml)
        pipeline: PathBuf,

        /// Release tag to plan for (e.g. 3.14.0rc1)
        tag: ReleaseTag,
    },

    /// Execute a pipeline for a release tag
    Run {
        /// Path to the pipeline declaration (.toml)
        pipeline: PathBuf,

        /// Release tag to build (e.g. 3.14.0rc1)
        tag: ReleaseTag,

        /// KEY=value settings file seeding every stage environment
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,

        /// Credential group for sign stages (config default when omitted)
        #[arg(long, value_name = "GROUP")]
        signing_group: Option<String>,

        /// Parallel stage instances per level (0=auto)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Continue a checkpointed run
    Resume {
        /// Run identifier printed when the run started
        run_id: String,

        /// Parallel stage instances per level (0=auto)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Show the ledger of one run, or list all known runs
    #[command(alias = "st")]
    Status {
        /// Run identifier (empty = list all runs)
        run_id: Option<String>,
    },

    /// Hash packages, merge the release index, upload, and purge
    Publish {
        /// Release tag the packages belong to
        tag: ReleaseTag,

        /// Directory holding install descriptors and package files
        packages: PathBuf,
    },

    /// Stand-alone CDN purge for a release
    Purge {
        /// Release tag to purge
        tag: ReleaseTag,

        /// Base URL to purge under (defaults to the configured CDN base)
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },
}

impl Commands {
    /// Get command name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Plan { .. } => "plan",
            Commands::Run { .. } => "run",
            Commands::Resume { .. } => "resume",
            Commands::Status { .. } => "status",
            Commands::Publish { .. } => "publish",
            Commands::Purge { .. } => "purge",
        }
    }

    /// Validate command arguments
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Commands::Plan { pipeline, .. } => validate_pipeline_path(pipeline),
            Commands::Run {
                pipeline, settings, ..
            } => {
                validate_pipeline_path(pipeline)?;
                if let Some(settings) = settings {
                    if !settings.exists() {
                        return Err(format!(
                            "Settings file not found: {}",
                            settings.display()
                        ));
                    }
                }
                Ok(())
            }
            Commands::Resume { run_id, .. } if run_id.is_empty() => {
                Err("Run identifier cannot be empty".to_string())
            }
            Commands::Publish { packages, .. } => {
                if packages.is_dir() {
                    Ok(())
                } else {
                    Err(format!(
                        "Package directory not found: {}",
                        packages.display()
                    ))
                }
            }
            _ => Ok(()),
        }
    }
}

fn validate_pipeline_path(pipeline: &Path) -> Result<(), String> {
    if !pipeline.exists() {
        Err(format!("Pipeline file not found: {}", pipeline.display()))
    } else if pipeline.extension().is_none_or(|ext| ext != "toml") {
        Err("Pipeline file must have .toml extension".to_string())
    } else {
        Ok(())
    }
}
