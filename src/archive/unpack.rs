use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tar::EntryType;

use super::Compression;
use crate::runtime::Runtime;
use crate::runtime::path::is_path_under;

/// What an unpack wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnpackSummary {
    pub files: usize,
    /// First path component of every member, e.g. the variant names.
    pub top_level: BTreeSet<String>,
}

/// Unpacks compressed tarballs member by member straight into a
/// destination directory, creating parent directories on demand.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl TarExtractor {
    #[tracing::instrument(skip(self, runtime))]
    pub fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<UnpackSummary> {
        let compression = Compression::from_path(archive_path)?;
        debug!("Extracting {:?} ({:?}) to {:?}...", archive_path, compression, extract_to);

        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = tar::Archive::new(compression.decoder(file)?);
        let mut summary = UnpackSummary::default();
        // Symlinks this unpack created, relative to `extract_to`
        let mut links = BTreeSet::new();

        let entries = archive
            .entries()
            .with_context(|| format!("Failed to read {:?}", archive_path))?;
        for entry in entries {
            let mut entry =
                entry.with_context(|| format!("Failed to read an entry of {:?}", archive_path))?;
            let member = entry
                .path()
                .context("Archive member has an invalid path")?
                .into_owned();
            let Some(relative) = sanitize_member(&member) else {
                warn!("Skipping archive member outside the destination: {:?}", member);
                continue;
            };
            let full_path = extract_to.join(&relative);
            if !is_path_under(&full_path, extract_to) {
                warn!("Skipping archive member outside the destination: {:?}", member);
                continue;
            }
            if let Some(link) = through_link(&relative, &links) {
                bail!("Archive member {:?} would be written through the symlink {:?}", member, link);
            }

            let entry_type = entry.header().entry_type();
            if entry_type == EntryType::Directory {
                runtime.create_dir_all(&full_path)?;
                continue;
            }

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            if runtime.is_symlink(&full_path) || runtime.is_file(&full_path) {
                runtime.remove_file(&full_path)?;
            }
            links.remove(&relative);

            match entry_type {
                EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                    let mut dest = runtime.create_file(&full_path)?;
                    std::io::copy(&mut entry, &mut dest)
                        .with_context(|| format!("Failed to unpack file {:?}", full_path))?;
                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&full_path, mode & 0o7777)
                    {
                        debug!("Failed to set permissions on {:?}: {}", full_path, e);
                    }
                }
                EntryType::Symlink => {
                    let Some(target) = entry.link_name()? else {
                        bail!("Symlink {:?} in archive has no target", member);
                    };
                    runtime.symlink(&target, &full_path)?;
                    links.insert(relative.clone());
                }
                EntryType::Link => {
                    let Some(target) = entry.link_name()? else {
                        bail!("Hard link {:?} in archive has no target", member);
                    };
                    let Some(source) = sanitize_member(&target) else {
                        bail!("Hard link {:?} points outside the archive", member);
                    };
                    if links.contains(&source) || through_link(&source, &links).is_some() {
                        bail!("Hard link {:?} points through a symlink", member);
                    }
                    let mut from = runtime.open(&extract_to.join(source))?;
                    let mut dest = runtime.create_file(&full_path)?;
                    std::io::copy(&mut from, &mut dest)
                        .with_context(|| format!("Failed to unpack link {:?}", full_path))?;
                }
                other => {
                    debug!("Skipping {:?} member {:?}", other, member);
                    continue;
                }
            }

            summary.files += 1;
            if let Some(Component::Normal(first)) = relative.components().next() {
                summary.top_level.insert(first.to_string_lossy().into_owned());
            }
        }

        debug!("Unpacked {} files from {:?}", summary.files, archive_path);
        Ok(summary)
    }
}

/// The first symlink in `links` that is a proper ancestor of `relative`.
fn through_link<'l>(relative: &Path, links: &'l BTreeSet<PathBuf>) -> Option<&'l PathBuf> {
    relative.ancestors().skip(1).find_map(|ancestor| links.get(ancestor))
}

/// Strips `./` prefixes and rejects absolute or parent-relative members.
fn sanitize_member(member: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in member.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}
