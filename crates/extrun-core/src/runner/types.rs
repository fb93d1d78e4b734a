//! Runner state and reload result types

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::RunnerError;

/// Lifecycle of an [`ExtensionRunner`](super::ExtensionRunner)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Constructed, `run()` not called yet
    Idle,
    ProfileReady,
    ProcessRunning,
    /// Remote session open (never reached with pre-install)
    Connected,
    /// Steady state, reloads permitted
    Active,
    /// Process closed, or a `run()` step failed
    Exited,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Idle => "idle",
            RunnerState::ProfileReady => "profile ready",
            RunnerState::ProcessRunning => "process running",
            RunnerState::Connected => "connected",
            RunnerState::Active => "active",
            RunnerState::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Outcome of one reload request
#[derive(Debug)]
pub struct ReloadResult {
    pub runner_name: &'static str,
    /// Absent on the batch success entry
    pub source_dir: Option<PathBuf>,
    pub error: Option<RunnerError>,
}

impl ReloadResult {
    pub(crate) fn success(runner_name: &'static str, source_dir: Option<&Path>) -> Self {
        Self {
            runner_name,
            source_dir: source_dir.map(Path::to_path_buf),
            error: None,
        }
    }

    pub(crate) fn failure(
        runner_name: &'static str,
        source_dir: Option<&Path>,
        error: RunnerError,
    ) -> Self {
        Self {
            runner_name,
            source_dir: source_dir.map(Path::to_path_buf),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
