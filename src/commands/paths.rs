use anyhow::{Result, anyhow};

use crate::runtime::Runtime;
use crate::version::VersionStore;

use super::config::Config;

/// Print the enabled version of the selected family
#[tracing::instrument(skip(runtime, config))]
pub fn output<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());
    match store.current_version(family.name())? {
        Some(version) => println!("{}", version),
        None => return Err(anyhow!("No version of the {} PDK is enabled.", family.name())),
    }
    Ok(())
}

/// Print the directory of a version, or of the enabled one
#[tracing::instrument(skip(runtime, config))]
pub fn path<R: Runtime>(runtime: &R, config: &Config, version: Option<String>) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());
    let version = match version {
        Some(version) => version,
        None => store
            .current_version(family.name())?
            .ok_or_else(|| anyhow!("No version of the {} PDK is enabled.", family.name()))?,
    };
    println!("{}", store.version_dir(family.name(), &version).display());
    Ok(())
}
