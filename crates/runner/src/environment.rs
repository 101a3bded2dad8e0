//! Stage environment and placeholder expansion
//!
//! Every instance gets one flat environment map assembled in precedence
//! order: settings file entries first, then run variables, then matrix
//! axis values, then `IN_*`/`OUT_*` artifact paths. Command templates
//! expand `${VAR}` against the same map that the child process inherits,
//! so a command sees exactly what it was expanded with.

use shipwright_errors::{Error, StageError};
use shipwright_graph::StageInstance;
use shipwright_types::{ReleaseTag, RunId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Identity of one run, shared by every instance
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub tag: ReleaseTag,
}

impl RunContext {
    fn variables(&self) -> [(String, String); 4] {
        [
            ("RUN_ID".to_string(), self.run_id.to_string()),
            ("VERSION".to_string(), self.tag.to_string()),
            ("VERSION_NORMALIZED".to_string(), self.tag.normalized()),
            ("VERSION_SERIES".to_string(), self.tag.series()),
        ]
    }
}

/// Assembled environment for one stage instance
#[derive(Debug, Clone)]
pub struct StageEnvironment {
    vars: BTreeMap<String, String>,
}

impl StageEnvironment {
    /// Assemble the map for an instance
    ///
    /// `inputs` and `outputs` are keyed by the declared artifact base;
    /// their paths become `IN_<base>` and `OUT_<base>` variables, with
    /// non-alphanumeric characters in the base mapped to underscores.
    #[must_use]
    pub fn build(
        settings: &BTreeMap<String, String>,
        context: &RunContext,
        instance: &StageInstance,
        inputs: &BTreeMap<String, PathBuf>,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Self {
        let mut vars = settings.clone();
        for (key, value) in context.variables() {
            vars.insert(key, value);
        }
        for (axis, value) in instance.variant.entries() {
            vars.insert(axis.to_string(), value.value.clone());
        }
        vars.insert("VARIANT".to_string(), instance.variant.suffix());
        for (base, path) in inputs {
            vars.insert(env_key("IN_", base), display_path(path));
        }
        for (base, path) in outputs {
            vars.insert(env_key("OUT_", base), display_path(path));
        }
        Self { vars }
    }

    /// Expand `${VAR}` placeholders in one template
    ///
    /// # Errors
    ///
    /// Returns `UnexpandedPlaceholder` for an unknown variable or an
    /// unterminated `${`.
    pub fn expand(&self, stage: &str, template: &str) -> Result<String, Error> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(StageError::UnexpandedPlaceholder {
                    stage: stage.to_string(),
                    placeholder: rest[start..].to_string(),
                }
                .into());
            };
            let key = &after[..end];
            let Some(value) = self.vars.get(key) else {
                return Err(StageError::UnexpandedPlaceholder {
                    stage: stage.to_string(),
                    placeholder: format!("${{{key}}}"),
                }
                .into());
            };
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Expand every element of an argv
    ///
    /// # Errors
    ///
    /// Returns `UnexpandedPlaceholder` as [`StageEnvironment::expand`].
    pub fn expand_argv(&self, stage: &str, argv: &[String]) -> Result<Vec<String>, Error> {
        argv.iter().map(|arg| self.expand(stage, arg)).collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Pairs to export to the child process, on top of the inherited
    /// environment
    pub fn exported(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

fn env_key(prefix: &str, base: &str) -> String {
    let mut key = String::with_capacity(prefix.len() + base.len());
    key.push_str(prefix);
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            key.push(ch);
        } else {
            key.push('_');
        }
    }
    key
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
