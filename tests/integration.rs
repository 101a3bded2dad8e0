//! Cross-crate integration tests
//!
//! These tests exercise the seams between the workspace crates without
//! driving a full release run: pipeline loading and planning, settings
//! files feeding stage environments, configuration parsing, the event
//! channel, and the artifact store under concurrent producers. Full
//! run-to-publish flows live in `release_flow.rs`.

mod utils {
    use shipwright_config::Config;
    use shipwright_events::{EventReceiver, EventSender};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Test environment with an isolated work root and event channel
    #[allow(dead_code)]
    pub struct TestEnvironment {
        pub temp_dir: TempDir,
        pub config: Config,
        pub event_sender: EventSender,
        pub event_receiver: EventReceiver,
    }

    impl TestEnvironment {
        pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
            let temp_dir = TempDir::new()?;

            let mut config = Config::default();
            config.general.jobs = 2;
            config.signing.retry_delay_ms = 10;
            config.paths.work_root = Some(temp_dir.path().join("runs"));
            config.paths.index_path = Some(temp_dir.path().join("index.json"));

            tokio::fs::create_dir_all(config.work_root()).await?;

            let (event_sender, event_receiver) = shipwright_events::channel();

            Ok(Self {
                temp_dir,
                config,
                event_sender,
                event_receiver,
            })
        }

        /// Write a pipeline declaration into the test directory
        pub async fn write_pipeline(
            &self,
            name: &str,
            content: &str,
        ) -> Result<PathBuf, Box<dyn std::error::Error>> {
            let path = self.temp_dir.path().join(name);
            tokio::fs::write(&path, content).await?;
            Ok(path)
        }
    }
}

use shipwright_config::{Config, SigningGroupKind};
use shipwright_events::{
    AppEvent, EventEmitter, GeneralEvent, PipelineEvent, SigningEvent, StageEvent,
};
use shipwright_graph::{ExecutionPlan, InstanceKind, PipelineSpec};
use shipwright_hash::Hash;
use shipwright_runner::{RunContext, StageEnvironment};
use shipwright_signing::CredentialGroup;
use shipwright_store::ArtifactStore;
use shipwright_types::{ColorChoice, ReleaseTag, RunId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::Level;

/// A small release pipeline: source export fans out into per-arch builds
/// and a docs build, and a site stage joins everything back together.
const RELEASE_PIPELINE: &str = r#"
name = "cpython-release"

[axes]
arch = ["amd64", "arm64"]

[stages.export]
produces = ["src"]
commands = [["true"]]

[stages.build]
matrix = ["arch"]
consumes = ["src"]
produces = ["bin"]
commands = [["true"]]

[stages.docs]
consumes = ["src"]
produces = ["html"]
commands = [["true"]]

[stages.site]
consumes = ["bin_amd64", "bin_arm64", "html"]
produces = ["release_tree"]
commands = [["true"]]
"#;

#[tokio::test]
async fn test_environment_initialization() -> Result<(), Box<dyn std::error::Error>> {
    let env = utils::TestEnvironment::new().await?;

    assert!(env.config.work_root().is_dir());
    assert_eq!(env.config.general.jobs, 2);
    assert_eq!(env.config.signing.default_group, "unsigned");

    // The built-in unsigned group resolves without any configuration
    let group = CredentialGroup::resolve("unsigned", &env.config.signing)?;
    assert!(group.is_unsigned());

    Ok(())
}

#[tokio::test]
async fn test_pipeline_loading_and_planning() -> Result<(), Box<dyn std::error::Error>> {
    let env = utils::TestEnvironment::new().await?;
    let path = env.write_pipeline("release.toml", RELEASE_PIPELINE).await?;

    let spec = PipelineSpec::load(&path).await?;
    assert_eq!(spec.name, "cpython-release");
    assert_eq!(spec.stages.len(), 4);

    let tag: ReleaseTag = "3.14.0rc1".parse().unwrap();
    let plan = ExecutionPlan::build(&spec, &tag)?;

    assert_eq!(plan.instance_count(), 5);
    assert!(plan.gated_off.is_empty());
    assert_eq!(
        plan.levels,
        vec![
            vec!["export".to_string()],
            vec![
                "build_amd64".to_string(),
                "build_arm64".to_string(),
                "docs".to_string(),
            ],
            vec!["site".to_string()],
        ]
    );

    // Artifact routing maps expanded names back to their producers
    assert_eq!(plan.artifacts["src"], "export");
    assert_eq!(plan.artifacts["bin_amd64"], "build_amd64");
    assert_eq!(plan.artifacts["bin_arm64"], "build_arm64");
    assert_eq!(plan.artifacts["release_tree"], "site");

    let build = plan.instance("build_amd64").expect("instance exists");
    assert_eq!(build.kind, InstanceKind::Run);
    assert_eq!(build.variant.suffix(), "amd64");
    assert_eq!(build.consumes[0].name, "src");
    assert_eq!(build.produces[0].base, "bin");
    assert_eq!(build.produces[0].name, "bin_amd64");

    Ok(())
}

#[tokio::test]
async fn test_plan_rejects_unknown_artifact() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = r#"
name = "broken"

[stages.build]
produces = ["bin"]
commands = [["true"]]

[stages.site]
consumes = ["bin_x86"]
commands = [["true"]]
"#;

    let spec = PipelineSpec::from_toml_str(pipeline)?;
    let tag: ReleaseTag = "3.14.0".parse().unwrap();

    let err = ExecutionPlan::build(&spec, &tag).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("site"), "unexpected error: {message}");
    assert!(message.contains("bin_x86"), "unexpected error: {message}");

    Ok(())
}

#[tokio::test]
async fn test_conditions_gate_by_tag() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = r#"
name = "gated"

[stages.build]
produces = ["bin"]
commands = [["true"]]

[stages.announce]
needs = ["build"]
condition = "stable-only"
commands = [["echo", "announce"]]

[stages.backport_check]
needs = ["build"]
condition = { min-series = "3.14" }
commands = [["true"]]
"#;

    let spec = PipelineSpec::from_toml_str(pipeline)?;

    // Alpha of a new series: stable-only is gated, min-series passes
    let tag: ReleaseTag = "3.14.0a1".parse().unwrap();
    let plan = ExecutionPlan::build(&spec, &tag)?;
    assert_eq!(plan.gated_off, vec!["announce".to_string()]);
    assert_eq!(plan.instance_count(), 2);

    // Release candidates count as stable
    let tag: ReleaseTag = "3.14.0rc1".parse().unwrap();
    let plan = ExecutionPlan::build(&spec, &tag)?;
    assert!(plan.gated_off.is_empty());
    assert_eq!(plan.instance_count(), 3);

    // Final release of an older series: min-series gates instead
    let tag: ReleaseTag = "3.13.5".parse().unwrap();
    let plan = ExecutionPlan::build(&spec, &tag)?;
    assert_eq!(plan.gated_off, vec!["backport_check".to_string()]);
    assert_eq!(plan.instance_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_settings_seed_stage_environment() -> Result<(), Box<dyn std::error::Error>> {
    let env = utils::TestEnvironment::new().await?;

    let settings_path = env.temp_dir.path().join("release.settings");
    fs::write(
        &settings_path,
        "# build channel\nCHANNEL=\"stable\"\nVERSION=settings-should-lose\nCFLAGS='-O2 -g'\n",
    )
    .await?;
    let settings = shipwright_config::load_settings_file(&settings_path).await?;
    assert_eq!(settings["CHANNEL"], "stable");
    assert_eq!(settings["CFLAGS"], "-O2 -g");

    let pipeline = r#"
name = "pack"

[axes]
arch = ["amd64"]

[stages.pack]
matrix = ["arch"]
produces = ["pkg"]
commands = [["sh", "-c", "echo ${CHANNEL} > ${OUT_pkg}/channel"]]
"#;
    let spec = PipelineSpec::from_toml_str(pipeline)?;
    let tag: ReleaseTag = "3.14.0rc1".parse().unwrap();
    let plan = ExecutionPlan::build(&spec, &tag)?;
    let instance = plan.instance("pack_amd64").expect("instance exists");

    let context = RunContext {
        run_id: RunId::new_v4(),
        tag,
    };
    let inputs = BTreeMap::new();
    let out_dir = env.temp_dir.path().join("out").join("pkg");
    let outputs = BTreeMap::from([("pkg".to_string(), out_dir.clone())]);

    let stage_env = StageEnvironment::build(&settings, &context, instance, &inputs, &outputs);

    // Settings arrive with quotes stripped, run variables win collisions
    assert_eq!(stage_env.get("CHANNEL"), Some("stable"));
    assert_eq!(stage_env.get("CFLAGS"), Some("-O2 -g"));
    assert_eq!(stage_env.get("VERSION"), Some("3.14.0rc1"));
    assert_eq!(stage_env.get("VERSION_SERIES"), Some("3.14"));
    assert_eq!(stage_env.get("arch"), Some("amd64"));
    assert_eq!(stage_env.get("VARIANT"), Some("amd64"));
    assert_eq!(
        stage_env.get("OUT_pkg"),
        Some(out_dir.display().to_string().as_str())
    );

    let argv = stage_env.expand_argv("pack_amd64", &instance.commands[0])?;
    assert_eq!(
        argv[2],
        format!("echo stable > {}/channel", out_dir.display())
    );

    // Referencing an undefined variable is fatal, not a silent blank
    let err = stage_env
        .expand_argv("pack_amd64", &["echo ${MISSING}".to_string()])
        .unwrap_err();
    assert!(err.to_string().contains("MISSING"));

    Ok(())
}

#[tokio::test]
async fn test_configuration_loading() -> Result<(), Box<dyn std::error::Error>> {
    let content = r#"
[general]
jobs = 4
color = "never"

[signing]
default_group = "release"
attempts = 5

[signing.groups.release]
kind = "minisign"
public_key = "RWSGOq2NVecA2UPNdBUZykf1CCb147pZRlnDtv7jdkjy0fYWwmyt"
secret_key_path = "/etc/keys/release.key"

[publish]
upload_host = "downloads.example.org"
upload_user = "release"
download_url_prefix = "https://downloads.example.org/release/"
cdn_base_url = "https://cdn.example.org/release/"

[paths]
work_root = "/var/lib/shipwright"

[network]
timeout = 60
"#;

    let config: Config = toml::from_str(content)?;

    assert_eq!(config.general.jobs, 4);
    assert!(matches!(config.general.color, ColorChoice::Never));

    assert_eq!(config.signing.default_group, "release");
    assert_eq!(config.signing.attempts, 5);
    // Unset fields keep their defaults
    assert_eq!(config.signing.retry_delay_ms, 1000);

    let group = &config.signing.groups["release"];
    assert!(matches!(group.kind, SigningGroupKind::Minisign));
    assert!(group.public_key.is_some());
    assert_eq!(
        group.secret_key_path.as_deref(),
        Some(std::path::Path::new("/etc/keys/release.key"))
    );

    assert_eq!(
        config.publish.upload_host.as_deref(),
        Some("downloads.example.org")
    );
    assert_eq!(config.publish.upload_user.as_deref(), Some("release"));
    assert_eq!(config.publish.ssh_command, "ssh");
    assert_eq!(
        config.publish.cdn_base_url.as_deref(),
        Some("https://cdn.example.org/release/")
    );

    assert_eq!(config.work_root(), PathBuf::from("/var/lib/shipwright"));
    assert_eq!(config.network.timeout, 60);
    assert_eq!(config.network.retries, 3);

    Ok(())
}

#[tokio::test]
async fn test_event_channel_levels_and_sources() -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = shipwright_events::channel();

    tx.emit(AppEvent::Pipeline(PipelineEvent::PlanStarted {
        pipeline: "demo".to_string(),
        tag: "3.14.0".parse().unwrap(),
    }));
    tx.emit_warning("low disk space");
    tx.emit(AppEvent::General(GeneralEvent::error(
        "authority unreachable",
    )));
    tx.emit(AppEvent::Stage(StageEvent::CommandOutput {
        instance: "build_amd64".to_string(),
        command_id: "build_amd64:0".to_string(),
        line: "ok".to_string(),
        is_stderr: false,
    }));
    tx.emit(AppEvent::Signing(SigningEvent::Submitted {
        file: PathBuf::from("cpython-3.14.0-amd64.bin"),
        attempt: 1,
        max_attempts: 3,
    }));
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 5);

    let sources: Vec<_> = events.iter().map(AppEvent::event_source).collect();
    let sources: Vec<&str> = sources.iter().map(|source| source.as_str()).collect();
    assert_eq!(
        sources,
        vec!["pipeline", "general", "general", "stage", "signing"]
    );

    let levels: Vec<Level> = events.iter().map(AppEvent::log_level).collect();
    assert_eq!(
        levels,
        vec![
            Level::INFO,
            Level::WARN,
            Level::ERROR,
            Level::DEBUG,
            Level::DEBUG,
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_concurrent_store_publishes() -> Result<(), Box<dyn std::error::Error>> {
    let env = utils::TestEnvironment::new().await?;
    let store = ArtifactStore::create(env.temp_dir.path().join("store")).await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let src = env.temp_dir.path().join(format!("src-{i}"));
        fs::create_dir_all(&src).await?;
        fs::write(src.join("payload.bin"), format!("artifact {i}")).await?;

        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .publish(&format!("artifact-{i}"), &format!("producer-{i}"), &src)
                .await
        }));
    }

    for handle in handles {
        let receipt = handle.await??;
        assert_eq!(receipt.file_count(), 1);
    }

    let names = store.list();
    assert_eq!(names.len(), 8);
    assert_eq!(names[0], "artifact-0");
    assert!(store.verify().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_receipts_record_verifiable_hashes() -> Result<(), Box<dyn std::error::Error>> {
    let env = utils::TestEnvironment::new().await?;
    let store = ArtifactStore::create(env.temp_dir.path().join("store")).await?;

    let src = env.temp_dir.path().join("bundle-src");
    fs::create_dir_all(src.join("sub")).await?;
    fs::write(src.join("app.bin"), b"binary payload").await?;
    fs::write(src.join("sub").join("notes.txt"), b"notes").await?;

    let receipt = store.publish("bundle", "pack", &src).await?;
    assert_eq!(receipt.artifact, "bundle");
    assert_eq!(receipt.producer, "pack");
    assert_eq!(receipt.file_count(), 2);
    assert_eq!(receipt.total_size(), 19);

    let paths: Vec<&str> = receipt
        .files
        .iter()
        .map(|file| file.relative_path.as_str())
        .collect();
    assert_eq!(paths, vec!["app.bin", "sub/notes.txt"]);

    for file in &receipt.files {
        let expected = Hash::hash_file(&src.join(&file.relative_path)).await?;
        assert_eq!(file.hash.to_hex(), expected.to_hex());
        assert!(!file.is_symlink);
    }

    Ok(())
}
