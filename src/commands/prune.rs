use anyhow::{Result, bail};
use log::debug;

use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::VersionStore;

use super::config::Config;

/// Remove every installed version except the current one
#[tracing::instrument(skip(runtime, config, reporter))]
pub fn prune<R: Runtime>(runtime: &R, config: &Config, reporter: &dyn Reporter, yes: bool) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    let current = store.current_version(family.name())?;
    let prunable: Vec<String> = store
        .installed(family.name())?
        .into_iter()
        .map(|v| v.name)
        .filter(|name| current.as_deref() != Some(name.as_str()))
        .collect();

    if prunable.is_empty() {
        println!("No unused {} versions to prune.", family.name());
        return Ok(());
    }
    debug!("Prunable versions: {:?}", prunable);

    if !yes {
        println!("The following versions will be deleted:");
        for name in &prunable {
            println!("  {}", name);
        }
        if !runtime.confirm("Are you sure you want to delete all inactive versions?")? {
            println!("Prune cancelled.");
            return Ok(());
        }
    }

    let report = store.prune(family, reporter)?;
    for (version, error) in &report.failed {
        reporter.status(&format!("Failed to delete {}: {}", version, error));
    }
    if !report.failed.is_empty() {
        bail!("{} version(s) could not be deleted", report.failed.len());
    }
    Ok(())
}
