//! Runner configuration
//!
//! `RunnerConfig` is the immutable input handed to an [`ExtensionRunner`](crate::ExtensionRunner).
//! It can be assembled in code or loaded from a TOML file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// One extension to install into the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSpec {
    /// Root of the unpacked extension source
    pub source_dir: PathBuf,
    /// Parsed manifest.json, when the caller already has it
    #[serde(default)]
    pub manifest_data: Option<serde_json::Value>,
}

impl ExtensionSpec {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            manifest_data: None,
        }
    }

    pub fn with_manifest(mut self, manifest: serde_json::Value) -> Self {
        self.manifest_data = Some(manifest);
        self
    }
}

/// Start URL setting: a single URL or an ordered list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartUrls {
    One(String),
    Many(Vec<String>),
}

impl StartUrls {
    pub fn as_slice(&self) -> &[String] {
        match self {
            StartUrls::One(url) => std::slice::from_ref(url),
            StartUrls::Many(urls) => urls,
        }
    }
}

/// Preference value written into the browser profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    String(String),
}

pub type CustomPrefs = BTreeMap<String, PrefValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub extensions: Vec<ExtensionSpec>,
    /// Existing profile to adopt or clone
    pub profile_path: Option<PathBuf>,
    /// Adopt `profile_path` in place instead of cloning it
    pub keep_profile_changes: bool,
    /// Install extensions into the profile before launch (not reloadable)
    pub pre_install: bool,
    pub browser_console: bool,
    pub devtools: bool,
    pub browser_binary: Option<PathBuf>,
    /// Raw arguments appended after the generated ones
    pub args: Vec<String>,
    pub start_url: Option<StartUrls>,
    pub custom_prefs: CustomPrefs,
}

impl RunnerConfig {
    pub fn new(extensions: Vec<ExtensionSpec>) -> Self {
        Self {
            extensions,
            ..Self::default()
        }
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse runner config")
    }

    /// Load a config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Check the extension list: non-empty, unique source directories
    pub fn validate(&self) -> std::result::Result<(), RunnerError> {
        if self.extensions.is_empty() {
            return Err(RunnerError::Configuration(
                "At least one extension source directory is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for ext in &self.extensions {
            if !seen.insert(&ext.source_dir) {
                return Err(RunnerError::Configuration(format!(
                    "Extension source directory listed twice: {}",
                    ext.source_dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Arguments passed to the browser binary, in launch order:
    /// console flag, one `--url` pair per start URL, then raw args.
    pub fn binary_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.browser_console {
            args.push("-jsconsole".to_string());
        }
        if let Some(urls) = &self.start_url {
            for url in urls.as_slice() {
                args.push("--url".to_string());
                args.push(url.clone());
            }
        }
        args.extend(self.args.iter().cloned());
        args
    }
}
