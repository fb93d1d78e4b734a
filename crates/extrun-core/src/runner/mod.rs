//! Firefox desktop extension runner
//!
//! Sequences profile preparation, browser launch, remote connection and
//! extension installation, then serves reload requests until the browser
//! process closes.
//!
//! All writes to runner state happen from the caller's task. The only other
//! entry point is the close observer spawned by `run()`, which touches the
//! cleanup registry and the lifecycle state, both behind a mutex.
//!
//! Known hazard: a callback registered while the close observer is draining
//! the registry may or may not run.

mod cleanup;
mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::collaborators::{
    BrowserProcess, InstallRequest, LaunchOptions, Profile, ProfileManager, RemoteConnector,
    RemoteSession, RunningInfo,
};
use crate::config::RunnerConfig;
use crate::error::{ReloadFailures, Result, RunnerError, TempInstallNotSupported};

pub use cleanup::{run_cleanup_callbacks, CleanupCallback, CleanupRegistry};
pub use types::{ReloadResult, RunnerState};

/// Display name reported in every reload result
pub const RUNNER_NAME: &str = "Firefox Desktop";

/// Launched process plus the port its debugger server listens on
struct RunningProcess {
    process: Arc<dyn BrowserProcess>,
    debugger_port: u16,
}

pub struct ExtensionRunner {
    config: RunnerConfig,
    profiles: Arc<dyn ProfileManager>,
    connector: Arc<dyn RemoteConnector>,
    profile: Option<Profile>,
    /// Kept after the process closes; liveness comes from `closed_rx`
    running: Option<RunningProcess>,
    remote: Option<Box<dyn RemoteSession>>,
    /// source dir -> addon id, temporary installs only
    reloadable: HashMap<PathBuf, String>,
    cleanup: Arc<Mutex<CleanupRegistry>>,
    state: Arc<Mutex<RunnerState>>,
    closed_tx: Option<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl ExtensionRunner {
    pub fn new(
        config: RunnerConfig,
        profiles: Arc<dyn ProfileManager>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            config,
            profiles,
            connector,
            profile: None,
            running: None,
            remote: None,
            reloadable: HashMap::new(),
            cleanup: Arc::new(Mutex::new(CleanupRegistry::new())),
            state: Arc::new(Mutex::new(RunnerState::Idle)),
            closed_tx: Some(closed_tx),
            closed_rx,
        }
    }

    pub fn name(&self) -> &'static str {
        RUNNER_NAME
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn debugger_port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.debugger_port)
    }

    /// True while a launched process has not been observed to close
    pub fn is_running(&self) -> bool {
        self.running.is_some() && !*self.closed_rx.borrow()
    }

    /// Snapshot of the source dir -> addon id mapping
    pub fn reloadable_extensions(&self) -> HashMap<PathBuf, String> {
        self.reloadable.clone()
    }

    /// Prepare the profile, launch the browser and install every extension.
    ///
    /// The config is validated first; an invalid one fails without touching
    /// the state or any collaborator.
    ///
    /// A failing step aborts the rest. Completed steps are not rolled back:
    /// a launched browser keeps running if a later install fails.
    pub async fn run(&mut self) -> Result<()> {
        if self.state() != RunnerState::Idle {
            return Err(RunnerError::Configuration(format!(
                "Runner has already been started (state: {})",
                self.state()
            )));
        }
        // Source dirs key the reloadable map, so duplicates are rejected up front
        self.config.validate()?;

        let result = self.run_steps().await;
        if let Err(err) = &result {
            warn!("{} runner failed to start: {}", RUNNER_NAME, err);
            *self.state.lock() = RunnerState::Exited;
        }
        result
    }

    async fn run_steps(&mut self) -> Result<()> {
        self.setup_profile().await?;
        self.start_browser().await?;
        self.advance(RunnerState::Active);
        Ok(())
    }

    async fn setup_profile(&mut self) -> Result<()> {
        let prefs = &self.config.custom_prefs;
        let profile = match &self.config.profile_path {
            Some(path) if self.config.keep_profile_changes => {
                debug!("Using Firefox profile from {}", path.display());
                self.profiles.use_profile(path, prefs).await?
            }
            Some(path) => {
                debug!("Copying Firefox profile from {}", path.display());
                self.profiles.copy_profile(path, prefs).await?
            }
            None => {
                debug!("Creating new Firefox profile");
                self.profiles.create_profile(prefs).await?
            }
        };

        if self.config.pre_install {
            for ext in &self.config.extensions {
                debug!(source_dir = %ext.source_dir.display(), "Pre-installing extension as proxy");
                self.profiles
                    .install_extension(InstallRequest {
                        as_proxy: true,
                        extension_path: &ext.source_dir,
                        manifest_data: ext.manifest_data.as_ref(),
                        profile: &profile,
                    })
                    .await?;
            }
        }

        self.profile = Some(profile);
        self.advance(RunnerState::ProfileReady);
        Ok(())
    }

    async fn start_browser(&mut self) -> Result<()> {
        let profile = self.profile.as_ref().ok_or_else(|| {
            RunnerError::Configuration("Cannot launch Firefox without a profile".to_string())
        })?;

        let binary_args = self.config.binary_args();
        let RunningInfo {
            process,
            debugger_port,
            closed,
        } = self
            .profiles
            .run(
                profile,
                LaunchOptions {
                    binary: self.config.browser_binary.as_deref(),
                    binary_args: &binary_args,
                    extensions: &self.config.extensions,
                    devtools: self.config.devtools,
                },
            )
            .await?;

        info!(pid = ?process.id(), port = debugger_port, "Firefox started");
        self.running = Some(RunningProcess {
            process,
            debugger_port,
        });
        self.advance(RunnerState::ProcessRunning);
        self.observe_close(closed);

        if self.config.pre_install {
            return Ok(());
        }

        let session = self.connector.connect(debugger_port).await?;
        self.advance(RunnerState::Connected);
        let session = self.remote.insert(session);

        for ext in &self.config.extensions {
            let installed = session
                .install_temporary_addon(&ext.source_dir, self.config.devtools)
                .await
                .map_err(|err| {
                    if err.downcast_ref::<TempInstallNotSupported>().is_some() {
                        debug!("Caught: {}", err);
                        RunnerError::UnsupportedInstallMode
                    } else {
                        RunnerError::Collaborator(err)
                    }
                })?;

            if installed.addon.id.is_empty() {
                return Err(RunnerError::MissingAddonId {
                    source_dir: ext.source_dir.clone(),
                });
            }

            info!(
                source_dir = %ext.source_dir.display(),
                addon_id = %installed.addon.id,
                "Installed temporary add-on"
            );
            self.reloadable
                .insert(ext.source_dir.clone(), installed.addon.id);
        }

        Ok(())
    }

    /// Spawn the one-shot observer that drains cleanup callbacks on close
    fn observe_close(&mut self, closed: oneshot::Receiver<()>) {
        let cleanup = Arc::clone(&self.cleanup);
        let state = Arc::clone(&self.state);
        let closed_tx = self.closed_tx.take();

        tokio::spawn(async move {
            // A dropped sender means the process handle is gone: treat as closed
            let _ = closed.await;
            debug!("Firefox process closed, running cleanup callbacks");

            *state.lock() = RunnerState::Exited;
            let callbacks = cleanup.lock().drain();
            run_cleanup_callbacks(callbacks);

            if let Some(tx) = closed_tx {
                let _ = tx.send(true);
            }
        });
    }

    /// Move forward in the lifecycle unless the process has already exited
    fn advance(&self, next: RunnerState) {
        let mut state = self.state.lock();
        if *state != RunnerState::Exited {
            *state = next;
        }
    }

    /// Reload every configured extension, one at a time, in configuration order.
    ///
    /// Always a single entry: success, or a [`RunnerError::Reload`] holding
    /// each failed source dir.
    pub async fn reload_all_extensions(&self) -> Vec<ReloadResult> {
        let mut failures = ReloadFailures::new();

        for ext in &self.config.extensions {
            let results = self.reload_extension_by_source_dir(&ext.source_dir).await;
            for result in results {
                if let Some(err) = result.error {
                    failures.push(ext.source_dir.clone(), err);
                }
            }
        }

        if failures.is_empty() {
            vec![ReloadResult::success(RUNNER_NAME, None)]
        } else {
            vec![ReloadResult::failure(
                RUNNER_NAME,
                None,
                RunnerError::Reload(failures),
            )]
        }
    }

    /// Reload one extension by its source directory. Errors land in the result.
    pub async fn reload_extension_by_source_dir(&self, source_dir: &Path) -> Vec<ReloadResult> {
        let (Some(addon_id), Some(remote)) =
            (self.reloadable.get(source_dir), self.remote.as_deref())
        else {
            return vec![ReloadResult::failure(
                RUNNER_NAME,
                Some(source_dir),
                RunnerError::Untracked {
                    source_dir: source_dir.to_path_buf(),
                },
            )];
        };

        debug!(source_dir = %source_dir.display(), addon_id = %addon_id, "Reloading extension");
        match remote.reload_addon(addon_id).await {
            Ok(()) => vec![ReloadResult::success(RUNNER_NAME, Some(source_dir))],
            Err(err) => vec![ReloadResult::failure(
                RUNNER_NAME,
                Some(source_dir),
                RunnerError::Collaborator(err),
            )],
        }
    }

    /// Register a callback to run once when the browser process closes.
    ///
    /// Returns false if the same callback is already registered.
    pub fn register_cleanup(&self, callback: CleanupCallback) -> bool {
        self.cleanup.lock().register(callback)
    }

    /// Ask the browser to terminate. Cleanup runs later, from the close observer.
    pub async fn exit(&self) -> Result<()> {
        let running = self.running.as_ref().ok_or_else(|| {
            RunnerError::Configuration("No firefox instance is currently running".to_string())
        })?;

        debug!(pid = ?running.process.id(), "Terminating Firefox");
        running.process.kill()?;
        Ok(())
    }

    /// Wait until the close observer has run every cleanup callback
    pub async fn wait_for_exit(&self) {
        if self.running.is_none() {
            return;
        }
        let mut rx = self.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
