//! Switching the active version of a family.
//!
//! A family is active when its `current` marker names a version and every
//! variant present in that version has a relative symlink at
//! `<pdk_root>/<variant>`. The symlink swap and the marker write are not one
//! transaction: a crash in between leaves links that disagree with the
//! marker. The marker is written to a temporary file and renamed after all
//! links are in place, so it is never observed half-written.

use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

use crate::error::PdkError;
use crate::family::Family;
use crate::runtime::{Runtime, relative_symlink_path};
use crate::version::VersionStore;

pub struct Activator<'s, 'a, R: Runtime> {
    store: &'s VersionStore<'a, R>,
}

impl<'s, 'a, R: Runtime> Activator<'s, 'a, R> {
    pub fn new(store: &'s VersionStore<'a, R>) -> Self {
        Self { store }
    }

    /// Points every variant link at `version` and records it as current.
    ///
    /// Fails without touching anything if a variant path is occupied by a
    /// regular file or directory. Variants missing from the version's
    /// payload get no link.
    #[tracing::instrument(skip(self, family), fields(family = family.name()))]
    pub fn activate(&self, family: &Family, version: &str) -> Result<()> {
        let runtime = self.store.runtime();
        let version_dir = self.store.version_dir(family.name(), version);
        if !runtime.is_dir(&version_dir) {
            return Err(PdkError::NotInstalled(version.to_string()).into());
        }

        let links: Vec<(PathBuf, PathBuf)> = family
            .variants()
            .iter()
            .map(|variant| {
                (
                    self.store.variant_link(variant),
                    version_dir.join(variant),
                )
            })
            .collect();

        for (link, _) in &links {
            if !runtime.is_symlink(link) && runtime.exists(link) {
                return Err(PdkError::FileConflict(link.clone()).into());
            }
        }

        runtime.create_dir_all(self.store.pdk_root())?;
        for (link, target) in &links {
            if !runtime.is_dir(target) {
                if runtime.is_symlink(link) {
                    runtime.remove_symlink(link)?;
                }
                debug!("{:?} is not part of this version, leaving it unlinked", target);
                continue;
            }
            let relative = relative_symlink_path(link, target).with_context(|| {
                format!("Cannot express {:?} relative to {:?}", target, link)
            })?;
            if runtime.is_symlink(link) {
                if runtime.read_link(link)? == relative {
                    debug!("{:?} already points at {:?}", link, relative);
                    continue;
                }
                runtime.remove_symlink(link)?;
            }
            runtime.symlink(&relative, link)?;
        }

        self.write_marker(family.name(), version)
    }

    /// Removes the variant links and the marker. Only valid when `version`
    /// is the current one.
    #[tracing::instrument(skip(self, family), fields(family = family.name()))]
    pub fn deactivate(&self, family: &Family, version: &str) -> Result<()> {
        let runtime = self.store.runtime();
        if !self.store.is_current(family.name(), version)? {
            return Err(PdkError::NotCurrent {
                family: family.name().to_string(),
                version: version.to_string(),
            }
            .into());
        }

        for variant in family.variants() {
            let link = self.store.variant_link(variant);
            if runtime.is_symlink(&link) {
                runtime.remove_symlink(&link)?;
            }
        }

        runtime
            .remove_file(&self.store.current_marker(family.name()))
            .with_context(|| format!("Failed to clear current version of {}", family.name()))
    }

    fn write_marker(&self, family: &str, version: &str) -> Result<()> {
        let runtime = self.store.runtime();
        let marker = self.store.current_marker(family);
        let tmp = marker.with_file_name(".current.tmp");

        runtime.create_dir_all(&self.store.family_dir(family))?;
        runtime.write(&tmp, version.as_bytes())?;
        runtime
            .rename(&tmp, &marker)
            .with_context(|| format!("Failed to record {} as current", version))
    }
}
