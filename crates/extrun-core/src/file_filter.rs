//! File filter for extension packaging
//!
//! Decides which files under an extension source directory are wanted in a
//! build. Patterns are glob patterns anchored at the source directory; a
//! leading `!` re-includes a path an earlier pattern excluded, and the last
//! matching pattern wins.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};
use thiserror::Error;
use tracing::debug;

/// Patterns excluded from every build
pub const DEFAULT_IGNORED_PATTERNS: &[&str] = &[
    "**/*.xpi",
    "**/*.zip",
    // hidden files and directories, and everything inside hidden directories
    "**/.*",
    "**/.*/**/*",
    "**/node_modules",
    "**/node_modules/**/*",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("Cannot resolve source directory {}: {source}", path.display())]
    SourceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Construction options for [`FileFilter`]
#[derive(Debug, Clone)]
pub struct FileFilterOptions {
    pub base_ignored_patterns: Vec<String>,
    pub ignore_files: Vec<String>,
    pub source_dir: PathBuf,
    pub artifacts_dir: Option<PathBuf>,
}

impl FileFilterOptions {
    /// Options with the default base patterns and nothing else
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_ignored_patterns: DEFAULT_IGNORED_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ignore_files: Vec::new(),
            source_dir: source_dir.into(),
            artifacts_dir: None,
        }
    }

    pub fn with_ignore_files<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_files = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone)]
struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
}

#[derive(Debug, Clone)]
pub struct FileFilter {
    source_dir: PathBuf,
    rules: Vec<IgnoreRule>,
}

impl FileFilter {
    pub fn new(options: FileFilterOptions) -> Result<Self, FilterError> {
        let source_dir = absolute(&options.source_dir).map_err(|source| FilterError::SourceDir {
            path: options.source_dir.clone(),
            source,
        })?;

        let mut filter = Self {
            source_dir,
            rules: Vec::new(),
        };
        filter.add_to_ignore_list(&options.base_ignored_patterns)?;
        filter.add_to_ignore_list(&options.ignore_files)?;

        if let Some(artifacts_dir) = options.artifacts_dir {
            let artifacts_dir = absolute(&artifacts_dir).unwrap_or(artifacts_dir);
            if is_sub_path(&filter.source_dir, &artifacts_dir) {
                debug!(
                    artifacts_dir = %artifacts_dir.display(),
                    "Ignoring artifacts directory and all its subdirectories"
                );
                let escaped = PathBuf::from(Pattern::escape(&artifacts_dir.to_string_lossy()));
                filter.push_rule(escaped.to_string_lossy().into_owned(), false)?;
                filter.push_rule(escaped.join("**").join("*").to_string_lossy().into_owned(), false)?;
            } else {
                // Outside the source dir: nothing under it can be packaged by accident
                debug!(
                    artifacts_dir = %artifacts_dir.display(),
                    "Artifacts directory is not inside the source directory, not filtering it"
                );
            }
        }

        Ok(filter)
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Whether `path` should be included. Relative paths resolve against the source dir.
    pub fn want_file(&self, path: impl AsRef<Path>) -> bool {
        let resolved = self.resolve_with_source_dir(path.as_ref());
        let candidate = resolved.to_string_lossy();

        let mut ignored = false;
        for rule in &self.rules {
            if rule.pattern.matches_with(&candidate, MATCH_OPTIONS) {
                ignored = !rule.negated;
            }
        }

        if ignored {
            debug!("FileFilter: ignoring file {}", candidate);
        }
        !ignored
    }

    fn resolve_with_source_dir(&self, path: &Path) -> PathBuf {
        normalize(&self.source_dir.join(path))
    }

    fn add_to_ignore_list(&mut self, patterns: &[String]) -> Result<(), FilterError> {
        for pattern in patterns {
            match pattern.strip_prefix('!') {
                Some(rest) => {
                    let resolved = self.resolve_pattern(rest);
                    self.push_rule(resolved, true)?;
                }
                None => {
                    let resolved = self.resolve_pattern(pattern);
                    self.push_rule(resolved, false)?;
                }
            }
        }
        Ok(())
    }

    /// Anchor a pattern at the (glob-escaped) source directory
    fn resolve_pattern(&self, pattern: &str) -> String {
        if Path::new(pattern).is_absolute() {
            return normalize(Path::new(pattern)).to_string_lossy().into_owned();
        }
        let base = PathBuf::from(Pattern::escape(&self.source_dir.to_string_lossy()));
        normalize(&base.join(pattern)).to_string_lossy().into_owned()
    }

    fn push_rule(&mut self, resolved: String, negated: bool) -> Result<(), FilterError> {
        let pattern = Pattern::new(&resolved).map_err(|source| FilterError::InvalidPattern {
            pattern: resolved.clone(),
            source,
        })?;
        self.rules.push(IgnoreRule { pattern, negated });
        Ok(())
    }
}

/// True when `target` lies strictly inside `src`.
///
/// Equal paths are not a sub-path, neither is anything whose relative path
/// starts with a parent traversal.
pub fn is_sub_path(src: impl AsRef<Path>, target: impl AsRef<Path>) -> bool {
    let src = absolute(src.as_ref()).unwrap_or_else(|_| normalize(src.as_ref()));
    let target = absolute(target.as_ref()).unwrap_or_else(|_| normalize(target.as_ref()));
    let relative = relative_path(&src, &target);

    match relative.components().next() {
        None => false,
        Some(Component::ParentDir) => false,
        Some(_) => true,
    }
}

/// Relative path from `from` to `to`, both normalized absolute paths
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    Ok(normalize(&std::path::absolute(path)?))
}

/// Fold `.` and `..` segments without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
