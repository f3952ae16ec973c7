use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeSet;

use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::{Version, VersionStore, enrich_from_remote, resolve_remote_catalogue};

use super::config::Config;

/// List installed versions of the selected family
#[tracing::instrument(skip(runtime, config, reporter))]
pub async fn ls<R: Runtime>(runtime: &R, config: &Config, reporter: &dyn Reporter) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    let mut installed = store.installed(family.name())?;
    if installed.is_empty() {
        println!("No {} PDKs installed.", family.name());
        return Ok(());
    }
    debug!("Found {} installed version(s)", installed.len());

    match resolve_remote_catalogue(&config.github(), &config.release_repo).await {
        Ok(remote) => enrich_from_remote(&mut installed, &remote),
        Err(e) => {
            warn!("Failed to list remote versions: {:#}", e);
            reporter.status("Could not reach the release server; commit dates are unavailable.");
        }
    }

    let current = store.current_version(family.name())?;
    println!("{} PDKs installed in {}:", family.name(), store.versions_dir(family.name()).display());
    for line in format_installed(&installed, current.as_deref()) {
        println!("{}", line);
    }
    Ok(())
}

/// List versions published in the release repository
#[tracing::instrument(skip(runtime, config))]
pub async fn ls_remote<R: Runtime>(runtime: &R, config: &Config) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    let remote = resolve_remote_catalogue(&config.github(), &config.release_repo).await?;
    let versions = remote.versions(family.name());
    if versions.is_empty() {
        println!("No {} PDKs are available from {}.", family.name(), config.release_repo);
        return Ok(());
    }

    let installed: BTreeSet<String> = store
        .installed(family.name())?
        .into_iter()
        .map(|v| v.name)
        .collect();
    let current = store.current_version(family.name())?;

    println!("Pre-built {} PDK versions:", family.name());
    for line in format_remote(versions, &installed, current.as_deref()) {
        println!("{}", line);
    }
    Ok(())
}

fn dated_name(version: &Version) -> String {
    match version.commit_day() {
        Some(day) => format!("{} ({})", version.name, day),
        None => version.name.clone(),
    }
}

/// One line per installed version; the enabled one is starred.
pub fn format_installed(versions: &[Version], current: Option<&str>) -> Vec<String> {
    versions
        .iter()
        .map(|version| {
            if current == Some(version.name.as_str()) {
                format!("* {} (enabled)", dated_name(version))
            } else {
                format!("  {}", dated_name(version))
            }
        })
        .collect()
}

pub fn format_remote(
    versions: &[Version],
    installed: &BTreeSet<String>,
    current: Option<&str>,
) -> Vec<String> {
    versions
        .iter()
        .map(|version| {
            let mut line = String::new();
            if version.prerelease {
                line.push_str("PRE-RELEASE ");
            }
            line.push_str(&dated_name(version));
            if current == Some(version.name.as_str()) {
                line.push_str(" (enabled)");
            } else if installed.contains(&version.name) {
                line.push_str(" (installed)");
            }
            line
        })
        .collect()
}
