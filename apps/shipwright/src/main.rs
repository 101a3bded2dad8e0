//! shipwright - Release pipeline orchestrator
//!
//! This is the main CLI application that drives pipeline planning, runs,
//! resumption, publication, and CDN purges through the workspace crates.

mod cli;
mod display;
mod error;
mod events;

use crate::cli::{Cli, Commands};
use crate::display::{CommandOutcome, OutputRenderer, PurgeReport, RunEntry};
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use shipwright_config::Config;
use shipwright_events::{EventReceiver, EventSender};
use shipwright_graph::PipelineSpec;
use shipwright_publish::{publish_release, release_purge_urls, CdnPurger};
use shipwright_runner::{plan_pipeline, RunDriver, RunOptions, RunState, STATE_FILE};
use std::process;
use tokio::select;
use tracing::{error, info};

/// Directory where debug log files land
const LOG_DIR: &str = ".shipwright/logs";

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    // Initialize tracing with JSON awareness
    init_tracing(json_mode, cli.global.debug);

    // Run the application and handle errors
    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting shipwright v{}", env!("CARGO_PKG_VERSION"));
    info!("Command: {}", cli.command.name());

    cli.command.validate().map_err(CliError::InvalidArguments)?;

    // Load configuration with proper precedence:
    // 1. Start with file config (or defaults)
    let mut config = Config::load_or_default(&cli.global.config).await?;

    // 2. Merge environment variables
    config.merge_env()?;

    // 3. Apply CLI flags (highest precedence)
    apply_cli_config(&mut config, &cli.global, &cli.command);

    // Create event channel
    let (event_sender, event_receiver) = shipwright_events::channel();

    // Create output renderer
    let color_choice = cli.global.color.unwrap_or(config.general.color);
    let renderer = OutputRenderer::new(cli.global.json, color_choice);

    // Create event handler; feedback lines draw on stderr
    let colors_enabled = match color_choice {
        shipwright_types::ColorChoice::Always => true,
        shipwright_types::ColorChoice::Never => false,
        shipwright_types::ColorChoice::Auto => {
            console::Term::stderr().features().colors_supported()
        }
    };
    let mut event_handler = EventHandler::new(colors_enabled, cli.global.debug);

    // Execute command with event handling
    let outcome = execute_command_with_events(
        cli.command,
        config,
        event_sender,
        event_receiver,
        &mut event_handler,
    )
    .await?;

    // Render final result
    renderer.render(&outcome)?;

    // A run with recorded failures still renders its summary, but the
    // process must exit non-zero
    if let CommandOutcome::Run(summary) = &outcome {
        if !summary.success {
            return Err(CliError::RunFailed {
                run_id: summary.run_id.to_string(),
            });
        }
    }

    info!("Command completed successfully");
    Ok(())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    config: Config,
    event_sender: EventSender,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<CommandOutcome, CliError> {
    let mut command_future = Box::pin(execute_command(command, config, event_sender));

    // Handle events concurrently with command execution
    loop {
        select! {
            // Command completed
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            // Event received
            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    config: Config,
    tx: EventSender,
) -> Result<CommandOutcome, CliError> {
    match command {
        Commands::Plan { pipeline, tag } => {
            let spec = PipelineSpec::load(&pipeline).await?;
            let plan = plan_pipeline(&spec, &tag, &tx)?;
            Ok(CommandOutcome::Plan(plan))
        }

        Commands::Run {
            pipeline,
            tag,
            settings,
            signing_group,
            jobs: _,
        } => {
            let spec = PipelineSpec::load(&pipeline).await?;
            let options = RunOptions {
                settings_path: settings,
                signing_group,
            };
            let driver = RunDriver::create(&config, &spec, tag, options, tx).await?;
            let summary = driver.execute().await?;
            Ok(CommandOutcome::Run(summary))
        }

        Commands::Resume { run_id, jobs: _ } => {
            let driver = RunDriver::resume(&config, &run_id, tx).await?;
            let summary = driver.execute().await?;
            Ok(CommandOutcome::Run(summary))
        }

        Commands::Status { run_id } => match run_id {
            Some(run_id) => {
                let path = config.work_root().join(&run_id).join(STATE_FILE);
                let state = RunState::load(&path).await?;
                Ok(CommandOutcome::Ledger(state))
            }
            None => {
                let entries = list_runs(&config).await?;
                Ok(CommandOutcome::Runs(entries))
            }
        },

        Commands::Publish { tag, packages } => {
            let summary = publish_release(&config, &tag, &packages, &tx).await?;
            Ok(CommandOutcome::Publish(summary))
        }

        Commands::Purge { tag, base_url } => {
            let base = base_url
                .or_else(|| config.publish.cdn_base_url.clone())
                .unwrap_or_else(|| config.publish.download_url_prefix.clone());
            let urls = release_purge_urls(&base, &tag, &config.publish);
            let purger = CdnPurger::new(&config.network, tx)?;
            purger.purge_all(&urls).await?;
            Ok(CommandOutcome::Purge(PurgeReport {
                base,
                purged: urls.len(),
            }))
        }
    }
}

/// Collect every run ledger under the work root, newest first
async fn list_runs(config: &Config) -> Result<Vec<RunEntry>, CliError> {
    let work_root = config.work_root();
    let mut read_dir = match tokio::fs::read_dir(&work_root).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CliError::Io(e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(CliError::Io)? {
        let state_path = entry.path().join(STATE_FILE);
        // Directories without a ledger are not runs
        if let Ok(state) = RunState::load(&state_path).await {
            entries.push(RunEntry::from(&state));
        }
    }

    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(entries)
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs, command: &Commands) {
    // Global CLI flags override everything
    if let Some(color) = &global.color {
        config.general.color = *color;
    }

    // Command-specific CLI flags
    if let Commands::Run {
        jobs: Some(jobs), ..
    }
    | Commands::Resume {
        jobs: Some(jobs), ..
    } = command
    {
        config.general.jobs = *jobs;
    }
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    // Check if debug logging is enabled
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if json_mode {
        // JSON mode: suppress all console output to avoid contaminating JSON
        if debug_enabled {
            // In debug mode with JSON, still log to file
            let log_dir = std::path::Path::new(LOG_DIR);
            if std::fs::create_dir_all(log_dir).is_ok() {
                let log_file = log_dir.join(format!(
                    "shipwright-{}.log",
                    chrono::Utc::now().format("%Y%m%d-%H%M%S")
                ));

                if let Ok(file) = std::fs::File::create(&log_file) {
                    tracing_subscriber::fmt()
                        .json()
                        .with_writer(file)
                        .with_env_filter(
                            tracing_subscriber::EnvFilter::try_from_default_env()
                                .unwrap_or_else(|_| {
                                    tracing_subscriber::EnvFilter::new("info,shipwright=debug")
                                }),
                        )
                        .init();
                    return;
                }
            }
        }
        // Fallback: disable all logging in JSON mode
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if debug_enabled {
        // Debug mode: structured JSON logs to file
        let log_dir = std::path::Path::new(LOG_DIR);
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        }

        let log_file = log_dir.join(format!(
            "shipwright-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| {
                                tracing_subscriber::EnvFilter::new("info,shipwright=debug")
                            }),
                    )
                    .init();

                eprintln!("Debug logging enabled: {}", log_file.display());
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file: {e}");
                // Fallback to stderr
                tracing_subscriber::fmt()
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| {
                                tracing_subscriber::EnvFilter::new("info,shipwright=info")
                            }),
                    )
                    .init();
            }
        }
    } else {
        // Normal mode: minimal logging to stderr
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,shipwright=warn")),
            )
            .init();
    }
}
