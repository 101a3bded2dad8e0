#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for shipwright
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/shipwright/config.toml)
//! - Environment variables
//! - CLI flags
//!
//! It also provides the flat `KEY=value` settings-file loader that seeds the
//! environment of stage commands.

mod settings;

pub use settings::{load_settings_file, parse_settings};

use serde::{Deserialize, Serialize};
use shipwright_errors::{ConfigError, Error};
use shipwright_types::{ColorChoice, OutputFormat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
    /// Parallel stage instances per level; 0 = auto-detect
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

/// Signing gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Credential group selected when a run does not name one
    #[serde(default = "default_signing_group")]
    pub default_group: String,
    /// Named credential groups
    #[serde(default)]
    pub groups: BTreeMap<String, SigningGroupConfig>,
    /// Authority call attempts before giving up
    #[serde(default = "default_signing_attempts")]
    pub attempts: u32,
    /// Base delay between authority attempts, in milliseconds
    #[serde(default = "default_signing_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// One named credential group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningGroupConfig {
    /// `unsigned`, `minisign`, or `command`
    pub kind: SigningGroupKind,
    /// Trusted minisign public key (base64, as printed in `.pub` files)
    #[serde(default)]
    pub public_key: Option<String>,
    /// Path to a local minisign secret key (kind = `minisign`)
    #[serde(default)]
    pub secret_key_path: Option<PathBuf>,
    /// External authority command template (kind = `command`)
    #[serde(default)]
    pub command: Vec<String>,
    /// Environment variables that must be present for this group
    #[serde(default)]
    pub required_env: Vec<String>,
}

/// Kind of signing credential group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningGroupKind {
    Unsigned,
    Minisign,
    Command,
}

/// Upload and CDN purge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublishConfig {
    /// Host files are uploaded to; unset means every upload is skipped
    #[serde(default)]
    pub upload_host: Option<String>,
    /// User on the upload host
    #[serde(default)]
    pub upload_user: Option<String>,
    /// Public URL prefix download URLs must live under
    #[serde(default = "default_download_url_prefix")]
    pub download_url_prefix: String,
    /// Server filesystem path the URL prefix maps to
    #[serde(default = "default_download_path_prefix")]
    pub download_path_prefix: String,
    /// Remote shell tool (`ssh` unless overridden)
    #[serde(default = "default_ssh_command")]
    pub ssh_command: String,
    /// Transfer tool (`scp` unless overridden)
    #[serde(default = "default_scp_command")]
    pub scp_command: String,
    /// Remote command template run after each upload; `${path}` expands to
    /// the uploaded file's remote path
    #[serde(default)]
    pub post_upload_command: Option<String>,
    /// CDN base URL purge requests are issued against
    #[serde(default)]
    pub cdn_base_url: Option<String>,
    /// Public URL of the release index; unset skips the index upload
    #[serde(default)]
    pub index_url: Option<String>,
    /// Files purged at the release directory top level; `${VERSION}`
    /// expands to the full tag
    #[serde(default)]
    pub purge_top_level: Vec<String>,
    /// Variant subdirectories purged for a release
    #[serde(default)]
    pub purge_variants: Vec<String>,
    /// Files purged inside each variant subdirectory
    #[serde(default)]
    pub purge_variant_files: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
            jobs: 0, // 0 = auto-detect
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            default_group: "unsigned".to_string(),
            groups: BTreeMap::new(),
            attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Root under which run work directories and stores are created
    pub work_root: Option<PathBuf>,
    /// Release index file used by `publish`
    pub index_path: Option<PathBuf>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 300, // 5 minutes
            retries: 3,
            retry_delay: 1, // 1 second
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_jobs() -> usize {
    0 // 0 = auto-detect
}

fn default_signing_group() -> String {
    "unsigned".to_string()
}

fn default_signing_attempts() -> u32 {
    3
}

fn default_signing_retry_delay_ms() -> u64 {
    1000
}

fn default_download_url_prefix() -> String {
    "https://downloads.example.org/release/".to_string()
}

fn default_download_path_prefix() -> String {
    "/srv/www/release/".to_string()
}

fn default_ssh_command() -> String {
    "ssh".to_string()
}

fn default_scp_command() -> String {
    "scp".to_string()
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("shipwright").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// If path is provided, loads from that file.
    /// If path is None, uses the default loading behavior.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: &Option<std::path::PathBuf>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // SHIPWRIGHT_OUTPUT
        if let Ok(output) = std::env::var("SHIPWRIGHT_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SHIPWRIGHT_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // SHIPWRIGHT_COLOR
        if let Ok(color) = std::env::var("SHIPWRIGHT_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SHIPWRIGHT_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // SHIPWRIGHT_JOBS
        if let Ok(jobs) = std::env::var("SHIPWRIGHT_JOBS") {
            self.general.jobs = jobs.parse().map_err(|_| ConfigError::InvalidValue {
                field: "SHIPWRIGHT_JOBS".to_string(),
                value: jobs,
            })?;
        }

        // SHIPWRIGHT_SIGNING_GROUP
        if let Ok(group) = std::env::var("SHIPWRIGHT_SIGNING_GROUP") {
            self.signing.default_group = group;
        }

        // SHIPWRIGHT_UPLOAD_HOST
        if let Ok(host) = std::env::var("SHIPWRIGHT_UPLOAD_HOST") {
            if host.is_empty() {
                self.publish.upload_host = None;
            } else {
                self.publish.upload_host = Some(host);
            }
        }

        Ok(())
    }

    /// Get the work root (with default)
    #[must_use]
    pub fn work_root(&self) -> PathBuf {
        self.paths
            .work_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(".shipwright/runs"))
    }

    /// Get the release index path (with default)
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.paths
            .index_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("index.json"))
    }

    /// Look up a signing group by name
    ///
    /// # Errors
    ///
    /// Returns an error if no group with that name is configured and the name
    /// is not the built-in `unsigned` group.
    pub fn signing_group(&self, name: &str) -> Result<SigningGroupConfig, Error> {
        if let Some(group) = self.signing.groups.get(name) {
            return Ok(group.clone());
        }
        if name == "unsigned" {
            return Ok(SigningGroupConfig {
                kind: SigningGroupKind::Unsigned,
                public_key: None,
                secret_key_path: None,
                command: Vec::new(),
                required_env: Vec::new(),
            });
        }
        Err(shipwright_errors::SigningError::UnknownGroup {
            group: name.to_string(),
        }
        .into())
    }
}

/// Calculate parallel jobs based on CPU count
#[must_use]
pub fn calculate_jobs(config_value: usize) -> usize {
    if config_value > 0 {
        config_value // User override
    } else {
        // Auto-detect based on CPU count
        let cpus = num_cpus::get();

        // Use 75% of CPUs, minimum 1, leaving headroom for the stages' own
        // child processes
        (cpus * 3 / 4).max(1)
    }
}
