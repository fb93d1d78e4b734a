//! Config file discovery

use std::path::{Path, PathBuf};

use anyhow::Result;
use extrun_core::RunnerConfig;
use tracing::info;

pub const CONFIG_FILE_NAME: &str = "extrun.toml";

/// Candidate config files in lookup order
fn config_candidates(cwd: &Path, config_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![cwd.join(CONFIG_FILE_NAME)];
    if let Some(dir) = config_dir {
        candidates.push(dir.join("extrun").join("config.toml"));
    }
    candidates
}

fn find_config(cwd: &Path, config_dir: Option<&Path>) -> Option<PathBuf> {
    config_candidates(cwd, config_dir)
        .into_iter()
        .find(|path| path.is_file())
}

/// Load the runner config: an explicit file must exist, otherwise the first
/// discovered file wins, otherwise defaults.
pub fn load_runner_config(explicit: Option<&Path>) -> Result<RunnerConfig> {
    if let Some(path) = explicit {
        return RunnerConfig::load(path);
    }

    let cwd = std::env::current_dir()?;
    match find_config(&cwd, dirs::config_dir().as_deref()) {
        Some(path) => {
            info!("Using config file {}", path.display());
            RunnerConfig::load(&path)
        }
        None => Ok(RunnerConfig::default()),
    }
}
