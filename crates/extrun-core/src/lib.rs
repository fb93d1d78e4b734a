//! extrun core - launch a browser with extensions installed and reload them live
//!
//! - [`runner`]: the extension runner lifecycle (profile, launch, install, reload, cleanup)
//! - [`file_filter`]: which files under an extension source dir belong in a build
//! - [`collaborators`]: traits a concrete browser integration implements

pub mod collaborators;
pub mod config;
pub mod error;
pub mod file_filter;
pub mod runner;

pub use collaborators::{
    BrowserProcess, InstallRequest, InstallResult, InstalledAddon, LaunchOptions, Profile,
    ProfileManager, RemoteConnector, RemoteSession, RunningInfo,
};
pub use config::{CustomPrefs, ExtensionSpec, PrefValue, RunnerConfig, StartUrls};
pub use error::{ReloadFailures, Result, RunnerError, TempInstallNotSupported};
pub use file_filter::{is_sub_path, FileFilter, FileFilterOptions, FilterError, DEFAULT_IGNORED_PATTERNS};
pub use runner::{CleanupCallback, ExtensionRunner, ReloadResult, RunnerState, RUNNER_NAME};
