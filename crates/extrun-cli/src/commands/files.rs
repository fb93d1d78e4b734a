//! `extrun files`: list what the path filter keeps

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use extrun_core::{FileFilter, FileFilterOptions};
use walkdir::WalkDir;

const DEFAULT_ARTIFACTS_DIR: &str = "web-ext-artifacts";

#[derive(Args, Debug)]
pub struct FilesArgs {
    /// Extension source directory
    #[arg(short, long, default_value = ".")]
    pub source_dir: PathBuf,

    /// Extra glob patterns to ignore, relative to the source directory.
    /// Prefix with `!` to re-include.
    #[arg(short, long = "ignore-files", num_args = 1..)]
    pub ignore_files: Vec<String>,

    /// Build output directory, ignored when inside the source directory
    #[arg(short, long)]
    pub artifacts_dir: Option<PathBuf>,
}

pub fn files(args: FilesArgs) -> Result<()> {
    let artifacts_dir = args
        .artifacts_dir
        .unwrap_or_else(|| args.source_dir.join(DEFAULT_ARTIFACTS_DIR));

    let filter = FileFilter::new(
        FileFilterOptions::new(&args.source_dir)
            .with_ignore_files(args.ignore_files)
            .with_artifacts_dir(artifacts_dir),
    )?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for path in wanted_files(&filter)? {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

/// Files under the filter's source dir that it keeps, relative and sorted.
/// Ignored directories are not descended into.
fn wanted_files(filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let root = filter.source_dir();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| filter.want_file(entry.path()));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}
