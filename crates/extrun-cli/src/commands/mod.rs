//! Subcommands

mod files;
mod run;

pub use files::{files, FilesArgs};
pub use run::{run, RunArgs};
