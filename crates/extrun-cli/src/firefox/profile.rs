//! Firefox profile manager
//!
//! Creates, copies or adopts profile directories, writes preferences, installs
//! proxy extensions and launches Firefox against the result.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use extrun_core::{CustomPrefs, InstallRequest, LaunchOptions, Profile, ProfileManager, RunningInfo};
use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::prefs::write_prefs;
use super::process::watch_child;

/// Files Firefox holds while a profile is in use
const LOCK_FILES: &[&str] = &["parent.lock", "lock", ".parentlock"];

#[derive(Default)]
pub struct FirefoxProfiles {
    /// Disposable profiles, removed when the manager drops
    temp_profiles: Mutex<Vec<TempDir>>,
}

impl FirefoxProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    fn temp_profile_dir(&self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("extrun-profile-")
            .tempdir()
            .context("failed to create temporary profile directory")?;
        let path = dir.path().to_path_buf();
        self.temp_profiles.lock().push(dir);
        Ok(path)
    }
}

#[async_trait]
impl ProfileManager for FirefoxProfiles {
    async fn create_profile(&self, prefs: &CustomPrefs) -> Result<Profile> {
        let path = self.temp_profile_dir()?;
        write_prefs(&path, prefs).await?;
        Ok(Profile::new(path))
    }

    async fn copy_profile(&self, path: &Path, prefs: &CustomPrefs) -> Result<Profile> {
        if !path.is_dir() {
            bail!("Firefox profile {} is not a directory", path.display());
        }
        let dest = self.temp_profile_dir()?;
        let (src, copy_dest) = (path.to_path_buf(), dest.clone());
        tokio::task::spawn_blocking(move || copy_dir(&src, &copy_dest))
            .await
            .context("profile copy task failed")??;

        write_prefs(&dest, prefs).await?;
        Ok(Profile::new(dest))
    }

    async fn use_profile(&self, path: &Path, prefs: &CustomPrefs) -> Result<Profile> {
        if !path.is_dir() {
            bail!("Firefox profile {} is not a directory", path.display());
        }
        write_prefs(path, prefs).await?;
        Ok(Profile::new(path))
    }

    async fn install_extension(&self, request: InstallRequest<'_>) -> Result<()> {
        if !request.as_proxy {
            bail!("Only proxy installs into a profile are supported");
        }

        let manifest = match request.manifest_data {
            Some(manifest) => manifest.clone(),
            None => read_manifest(request.extension_path).await?,
        };
        let id = extension_id(&manifest).with_context(|| {
            format!(
                "An explicit extension ID is required when installing to a profile \
                 (applications.gecko.id not found in manifest.json of {})",
                request.extension_path.display()
            )
        })?;

        let extensions_dir = request.profile.path.join("extensions");
        tokio::fs::create_dir_all(&extensions_dir).await?;
        let source = std::path::absolute(request.extension_path)?;
        tokio::fs::write(extensions_dir.join(&id), source.to_string_lossy().as_bytes())
            .await
            .context("failed to write proxy extension file")?;

        info!(id = %id, source_dir = %source.display(), "Installed proxy extension");
        Ok(())
    }

    async fn run(&self, profile: &Profile, options: LaunchOptions<'_>) -> Result<RunningInfo> {
        let binary = match options.binary {
            Some(binary) => binary.to_path_buf(),
            None => which::which("firefox").context("firefox not found in PATH, pass --firefox")?,
        };
        let port = free_port()?;

        debug!(
            binary = %binary.display(),
            args = ?options.binary_args,
            extensions = options.extensions.len(),
            devtools = options.devtools,
            "Launching Firefox"
        );

        let child = tokio::process::Command::new(&binary)
            .arg("-profile")
            .arg(&profile.path)
            .arg("-no-remote")
            .arg("-start-debugger-server")
            .arg(port.to_string())
            .args(options.binary_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch {}", binary.display()))?;

        let (process, closed) = watch_child(child);
        Ok(RunningInfo {
            process: Arc::new(process),
            debugger_port: port,
            closed,
        })
    }
}

async fn read_manifest(extension_path: &Path) -> Result<serde_json::Value> {
    let path = extension_path.join("manifest.json");
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Gecko id from `browser_specific_settings` or the older `applications` key
pub fn extension_id(manifest: &serde_json::Value) -> Option<String> {
    ["browser_specific_settings", "applications"]
        .iter()
        .find_map(|key| manifest.get(key)?.get("gecko")?.get("id")?.as_str())
        .map(str::to_string)
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to find a free port")?;
    Ok(listener.local_addr()?.port())
}

fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy();
            if LOCK_FILES.iter().any(|lock| *lock == name) {
                continue;
            }
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}
