use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use super::Version;
use crate::activation::Activator;
use crate::error::PdkError;
use crate::family::Family;
use crate::progress::Reporter;
use crate::runtime::Runtime;

/// Paths and queries over one PDK root.
///
/// Layout:
/// - `<pdk_root>/<family>/versions/<version>/<variant>/...`
/// - `<pdk_root>/<family>/current`, the marker naming the active version
/// - `<pdk_root>/<family>/build/<version>`, build scratch space
/// - `<pdk_root>/<variant>`, relative symlinks into the active version
pub struct VersionStore<'a, R: Runtime> {
    runtime: &'a R,
    pdk_root: PathBuf,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl<'a, R: Runtime> VersionStore<'a, R> {
    pub fn new(runtime: &'a R, pdk_root: PathBuf) -> Self {
        Self { runtime, pdk_root }
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    pub fn pdk_root(&self) -> &Path {
        &self.pdk_root
    }

    pub fn family_dir(&self, family: &str) -> PathBuf {
        self.pdk_root.join(family)
    }

    pub fn versions_dir(&self, family: &str) -> PathBuf {
        self.family_dir(family).join("versions")
    }

    pub fn version_dir(&self, family: &str, version: &str) -> PathBuf {
        self.versions_dir(family).join(version)
    }

    pub fn current_marker(&self, family: &str) -> PathBuf {
        self.family_dir(family).join("current")
    }

    pub fn build_dir(&self, family: &str, version: &str) -> PathBuf {
        self.family_dir(family).join("build").join(version)
    }

    pub fn variant_link(&self, variant: &str) -> PathBuf {
        self.pdk_root.join(variant)
    }

    pub fn is_installed(&self, family: &str, version: &str) -> bool {
        self.runtime.is_dir(&self.version_dir(family, version))
    }

    /// The version named by the marker file. A missing or blank marker
    /// means nothing is active.
    pub fn current_version(&self, family: &str) -> Result<Option<String>> {
        let marker = self.current_marker(family);
        if !self.runtime.is_file(&marker) {
            return Ok(None);
        }
        let content = self
            .runtime
            .read_to_string(&marker)
            .with_context(|| format!("Failed to read current version of {}", family))?;
        let name = content.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    pub fn is_current(&self, family: &str, version: &str) -> Result<bool> {
        Ok(self.current_version(family)?.as_deref() == Some(version))
    }

    /// Installed versions, sorted by name. Dates are unknown locally.
    pub fn installed(&self, family: &str) -> Result<Vec<Version>> {
        let versions_dir = self.versions_dir(family);
        if !self.runtime.is_dir(&versions_dir) {
            return Ok(vec![]);
        }

        let mut versions = Vec::new();
        for entry in self.runtime.read_dir(&versions_dir)? {
            if !self.runtime.is_dir(&entry) {
                continue;
            }
            if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                versions.push(Version::new(name, family));
            }
        }
        versions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(versions)
    }

    /// Removes an installed version. The current version is deactivated
    /// first so the marker never names a missing directory.
    #[tracing::instrument(skip(self, family), fields(family = family.name()))]
    pub fn uninstall(&self, family: &Family, version: &str) -> Result<()> {
        let version_dir = self.version_dir(family.name(), version);
        if !self.runtime.is_dir(&version_dir) {
            return Err(PdkError::NotInstalled(version.to_string()).into());
        }

        if self.is_current(family.name(), version)? {
            debug!("{} is current, deactivating before removal", version);
            Activator::new(self).deactivate(family, version)?;
        }

        self.runtime
            .remove_dir_all(&version_dir)
            .with_context(|| format!("Failed to delete version {}", version))
    }

    /// Uninstalls every installed version except the current one, carrying
    /// on past individual failures.
    pub fn prune(&self, family: &Family, reporter: &dyn Reporter) -> Result<PruneReport> {
        let current = self.current_version(family.name())?;
        let mut report = PruneReport::default();

        for version in self.installed(family.name())? {
            if current.as_deref() == Some(version.name.as_str()) {
                continue;
            }
            match self.uninstall(family, &version.name) {
                Ok(()) => {
                    reporter.status(&format!("Deleted {}.", version.name));
                    report.removed.push(version.name);
                }
                Err(e) => {
                    warn!("Failed to delete {}: {:#}", version.name, e);
                    reporter.status(&format!("Failed to delete {}: {:#}", version.name, e));
                    report.failed.push((version.name, format!("{:#}", e)));
                }
            }
        }

        Ok(report)
    }
}
