use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use crate::runtime::Runtime;
use crate::version::version_from_metadata_file;

pub mod config;
mod enable;
mod fetch;
mod list;
mod paths;
mod prune;
mod remove;

pub use enable::{disable, enable};
pub use fetch::{BuildArgs, FetchArgs, PushArgs, build, fetch, push};
pub use list::{format_installed, format_remote, ls, ls_remote};
pub use paths::{output, path};
pub use prune::prune;
pub use remove::rm;

/// The version named on the command line, or the open_pdks commit pinned in
/// a `tool_metadata.yml` when none was given.
pub(crate) fn resolve_version<R: Runtime>(
    runtime: &R,
    version: Option<String>,
    metadata_file: Option<&Path>,
) -> Result<String> {
    if let Some(version) = version {
        return Ok(version);
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let (version, path) = version_from_metadata_file(runtime, metadata_file, &cwd)?;
    debug!("Using version {} from {:?}", version, path);
    Ok(version)
}
