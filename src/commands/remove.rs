use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::VersionStore;

use super::config::Config;
use super::resolve_version;

/// Remove an installed version, disabling it first if it is current
#[tracing::instrument(skip(runtime, config, reporter))]
pub fn rm<R: Runtime>(
    runtime: &R,
    config: &Config,
    reporter: &dyn Reporter,
    version: Option<String>,
    metadata_file: Option<&Path>,
) -> Result<()> {
    let family = config.family()?;
    let version = resolve_version(runtime, version, metadata_file)?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    debug!("Removing {} {}", family.name(), version);
    store.uninstall(family, &version)?;
    reporter.status(&format!("Deleted {}.", version));
    Ok(())
}
