//! Error types for the extension runner

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// The runner was asked to do something its current state does not allow
    #[error("{0}")]
    Configuration(String),

    /// Reload requested for a source directory with no recorded addon id
    #[error("Extension not reloadable: {} was not installed as a temporary add-on", source_dir.display())]
    Untracked { source_dir: PathBuf },

    #[error(
        "Temporary add-on installation is not supported in this version of Firefox \
         (you need Firefox 49 or higher). For older Firefox versions, use --pre-install"
    )]
    UnsupportedInstallMode,

    #[error("Unexpected missing addon id in the temporary install result for {}", source_dir.display())]
    MissingAddonId { source_dir: PathBuf },

    #[error("{0}")]
    Reload(ReloadFailures),

    /// Any other collaborator failure, propagated unchanged
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Signal from a remote session that temporary installs are unavailable.
///
/// Sessions return this inside their `anyhow::Error`; the runner downcasts
/// for it and rewrites it into [`RunnerError::UnsupportedInstallMode`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("temporary add-on installation is not supported by the remote browser: {reason}")]
pub struct TempInstallNotSupported {
    pub reason: String,
}

/// Per-extension failures collected by one reload batch, in configuration order
#[derive(Debug, Default)]
pub struct ReloadFailures {
    failures: Vec<(PathBuf, RunnerError)>,
}

impl ReloadFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source_dir: PathBuf, error: RunnerError) {
        self.failures.push((source_dir, error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, source_dir: &std::path::Path) -> Option<&RunnerError> {
        self.failures
            .iter()
            .find(|(dir, _)| dir == source_dir)
            .map(|(_, err)| err)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &RunnerError)> {
        self.failures.iter().map(|(dir, err)| (dir, err))
    }
}

impl fmt::Display for ReloadFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error on reloading extensions:")?;
        for (dir, err) in &self.failures {
            write!(f, "\n{}: {}", dir.display(), err)?;
        }
        Ok(())
    }
}
