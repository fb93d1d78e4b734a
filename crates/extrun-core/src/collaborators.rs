//! Collaborator seams
//!
//! The runner composes a profile manager, a browser process and a remote
//! debugging session. Concrete browsers implement these traits; the runner
//! only sequences them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::config::{CustomPrefs, ExtensionSpec};

/// Browser profile handle. The runner never touches its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub path: PathBuf,
}

impl Profile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Request to install an extension directly into a profile
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    /// Install by reference to the source directory
    pub as_proxy: bool,
    pub extension_path: &'a Path,
    pub manifest_data: Option<&'a serde_json::Value>,
    pub profile: &'a Profile,
}

/// Launch parameters for the browser process
#[derive(Debug, Clone, Copy)]
pub struct LaunchOptions<'a> {
    pub binary: Option<&'a Path>,
    pub binary_args: &'a [String],
    pub extensions: &'a [ExtensionSpec],
    pub devtools: bool,
}

/// Handle to the launched browser process
pub trait BrowserProcess: Send + Sync {
    /// OS process id, if still known
    fn id(&self) -> Option<u32>;

    /// Ask the process to terminate. Does not wait for it.
    fn kill(&self) -> Result<()>;
}

/// Outcome of a successful launch
pub struct RunningInfo {
    pub process: Arc<dyn BrowserProcess>,
    pub debugger_port: u16,
    /// Resolves once the process has closed. A dropped sender counts as closed.
    pub closed: oneshot::Receiver<()>,
}

#[async_trait]
pub trait ProfileManager: Send + Sync {
    /// Synthesize a fresh profile
    async fn create_profile(&self, prefs: &CustomPrefs) -> Result<Profile>;

    /// Clone an existing profile into a disposable one
    async fn copy_profile(&self, path: &Path, prefs: &CustomPrefs) -> Result<Profile>;

    /// Adopt an existing profile in place
    async fn use_profile(&self, path: &Path, prefs: &CustomPrefs) -> Result<Profile>;

    async fn install_extension(&self, request: InstallRequest<'_>) -> Result<()>;

    /// Launch the browser against `profile`
    async fn run(&self, profile: &Profile, options: LaunchOptions<'_>) -> Result<RunningInfo>;
}

/// Addon reported by a temporary install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledAddon {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub addon: InstalledAddon,
}

/// Remote debugging session against a running browser
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Install an extension for the lifetime of the browser process.
    ///
    /// Returns [`TempInstallNotSupported`](crate::TempInstallNotSupported) when
    /// the browser is too old for temporary installs.
    async fn install_temporary_addon(
        &self,
        extension_path: &Path,
        open_devtools: bool,
    ) -> Result<InstallResult>;

    async fn reload_addon(&self, addon_id: &str) -> Result<()>;
}

/// Opens remote sessions on a debugger port
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, port: u16) -> Result<Box<dyn RemoteSession>>;
}
