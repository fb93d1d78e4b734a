//! `extrun run`: launch Firefox and reload extensions on demand

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use extrun_core::{
    ExtensionRunner, ExtensionSpec, ReloadResult, RunnerConfig, RunnerError, StartUrls,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::firefox::{FirefoxProfiles, RdpConnector};
use crate::settings::load_runner_config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Extension source directories. Replaces the ones from the config file.
    #[arg(short, long = "source-dir")]
    pub source_dir: Vec<PathBuf>,

    /// Config file, instead of the discovered one
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Firefox binary
    #[arg(short, long)]
    pub firefox: Option<PathBuf>,

    /// Profile directory to copy, or to use in place with --keep-profile-changes
    #[arg(short = 'p', long = "firefox-profile")]
    pub firefox_profile: Option<PathBuf>,

    #[arg(long)]
    pub keep_profile_changes: bool,

    /// Install into the profile before launch. Extensions cannot be reloaded.
    #[arg(long)]
    pub pre_install: bool,

    /// Open the browser console
    #[arg(long)]
    pub browser_console: bool,

    /// Open devtools for each installed extension
    #[arg(long)]
    pub devtools: bool,

    /// URL to open at startup, repeatable
    #[arg(short = 'u', long = "start-url")]
    pub start_url: Vec<String>,

    /// Extra argument for the Firefox binary, repeatable
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = build_config(args)?;

    let mut runner = ExtensionRunner::new(
        config,
        Arc::new(FirefoxProfiles::new()),
        Arc::new(RdpConnector::new()),
    );
    runner.register_cleanup(Arc::new(|| {
        info!("Firefox closed");
        Ok(())
    }));

    runner.run().await?;
    info!("{} runner started", runner.name());

    let reloadable = runner.reloadable_extensions().len();
    if reloadable > 0 {
        info!("Press r to reload {} extension(s), q to quit", reloadable);
    } else {
        info!("Press q to quit");
    }

    serve(&runner).await
}

/// Handle console commands until the browser closes
async fn serve(runner: &ExtensionRunner) -> Result<()> {
    let exited = runner.wait_for_exit();
    tokio::pin!(exited);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut exited => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down Firefox");
                request_exit(runner).await;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "r" => {
                        let results = runner.reload_all_extensions().await;
                        report_reload(&results);
                    }
                    "q" => request_exit(runner).await,
                    "" => {}
                    other => warn!("Unknown command '{}'", other),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!("Stopped reading stdin: {}", err);
                    stdin_open = false;
                }
            },
        }
    }

    info!("Exiting");
    Ok(())
}

async fn request_exit(runner: &ExtensionRunner) {
    if let Err(err) = runner.exit().await {
        error!("{}", err);
    }
}

fn report_reload(results: &[ReloadResult]) {
    for result in results {
        match &result.error {
            None => info!("Reloaded extensions in {}", result.runner_name),
            Some(RunnerError::Reload(failures)) => {
                for (source_dir, err) in failures.iter() {
                    error!("Failed to reload {}: {}", source_dir.display(), err);
                }
            }
            Some(err) => error!("{}: {}", result.runner_name, err),
        }
    }
}

/// Config file settings overlaid with command line flags
fn build_config(args: RunArgs) -> Result<RunnerConfig> {
    let mut config = load_runner_config(args.config.as_deref())?;
    apply_args(&mut config, args);

    let cwd = std::env::current_dir()?;
    for ext in &mut config.extensions {
        ext.source_dir = absolutize(&cwd, &ext.source_dir);
    }
    Ok(config)
}

fn apply_args(config: &mut RunnerConfig, args: RunArgs) {
    if !args.source_dir.is_empty() {
        config.extensions = args.source_dir.into_iter().map(ExtensionSpec::new).collect();
    }
    if args.firefox.is_some() {
        config.browser_binary = args.firefox;
    }
    if args.firefox_profile.is_some() {
        config.profile_path = args.firefox_profile;
    }
    config.keep_profile_changes |= args.keep_profile_changes;
    config.pre_install |= args.pre_install;
    config.browser_console |= args.browser_console;
    config.devtools |= args.devtools;
    if !args.start_url.is_empty() {
        config.start_url = Some(StartUrls::Many(args.start_url));
    }
    config.args.extend(args.args);
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
