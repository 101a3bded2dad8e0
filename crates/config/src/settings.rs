//! Flat `KEY=value` settings files
//!
//! Settings files seed the environment of stage commands. The format is one
//! `KEY=value` entry per line, `#` starts a comment line, blank lines are
//! ignored, and values may be wrapped in single or double quotes.

use shipwright_errors::{ConfigError, Error};
use std::collections::BTreeMap;
use std::path::Path;

/// Parse settings file content into an ordered map
///
/// Later entries override earlier ones with the same key.
///
/// # Errors
///
/// Returns an error for lines that are neither comments nor `KEY=value`
/// entries, identifying the offending line number.
pub fn parse_settings(content: &str, source: &str) -> Result<BTreeMap<String, String>, Error> {
    let mut settings = BTreeMap::new();

    for (index, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::SettingsLine {
                path: source.to_string(),
                line: index + 1,
                message: "expected KEY=value".to_string(),
            }
            .into());
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::SettingsLine {
                path: source.to_string(),
                line: index + 1,
                message: "empty key".to_string(),
            }
            .into());
        }

        settings.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(settings)
}

/// Load and parse a settings file
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains malformed lines.
pub async fn load_settings_file(path: &Path) -> Result<BTreeMap<String, String>, Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    parse_settings(&contents, &path.display().to_string())
}

/// Strip one matching pair of surrounding quotes
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = "VERSION=3.13.0\nARCH=amd64\n";
        let settings = parse_settings(content, "test").unwrap();
        assert_eq!(settings["VERSION"], "3.13.0");
        assert_eq!(settings["ARCH"], "amd64");
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let content = "# build settings\n\nJOBS=4\n   # trailing comment line\n";
        let settings = parse_settings(content, "test").unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings["JOBS"], "4");
    }

    #[test]
    fn test_quoted_values() {
        let content = "MSG=\"hello world\"\nPATH_EXTRA='/opt/tools/bin'\nHALF=\"unbalanced\n";
        let settings = parse_settings(content, "test").unwrap();
        assert_eq!(settings["MSG"], "hello world");
        assert_eq!(settings["PATH_EXTRA"], "/opt/tools/bin");
        // Unbalanced quotes are kept verbatim
        assert_eq!(settings["HALF"], "\"unbalanced");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let content = "FLAGS=-DOPT=2\n";
        let settings = parse_settings(content, "test").unwrap();
        assert_eq!(settings["FLAGS"], "-DOPT=2");
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let content = "GOOD=1\nnot a setting\n";
        let err = parse_settings(content, "build.settings").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("build.settings"));
        assert!(text.contains("line 2"));
    }

    #[test]
    fn test_later_entries_win() {
        let content = "K=first\nK=second\n";
        let settings = parse_settings(content, "test").unwrap();
        assert_eq!(settings["K"], "second");
    }
}
