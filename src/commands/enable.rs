use anyhow::{Result, anyhow};
use log::debug;
use std::sync::Arc;

use crate::activation::Activator;
use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::VersionStore;

use super::config::Config;
use super::fetch::{FetchArgs, fetch_version};

/// Fetch a version if needed and make it the current one
#[tracing::instrument(skip(runtime, config, reporter))]
pub async fn enable<R: Runtime>(
    runtime: &R,
    config: &Config,
    reporter: Arc<dyn Reporter>,
    args: FetchArgs,
) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    let version = fetch_version(&store, config, family, Arc::clone(&reporter), args).await?;

    debug!("Activating {} {}", family.name(), version);
    Activator::new(&store).activate(family, &version)?;
    reporter.status(&format!(
        "Version {} enabled for the {} PDK.",
        version,
        family.name()
    ));
    Ok(())
}

/// Remove the variant links and the current marker of the selected family
#[tracing::instrument(skip(runtime, config, reporter))]
pub fn disable<R: Runtime>(runtime: &R, config: &Config, reporter: &dyn Reporter) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    let current = store
        .current_version(family.name())?
        .ok_or_else(|| anyhow!("No version of the {} PDK is enabled.", family.name()))?;

    Activator::new(&store).deactivate(family, &current)?;
    reporter.status(&format!(
        "Version {} disabled for the {} PDK.",
        current,
        family.name()
    ));
    Ok(())
}
