use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::SecondsFormat;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::archive::pack_tar_zst;
use crate::family::Family;
use crate::github::{GitHubRepo, NewRelease, ReleaseCatalogue};
use crate::progress::{Reporter, TaskProgress};
use crate::runtime::Runtime;
use crate::version::VersionStore;

const COMMON_BUCKET: &str = "common";
const RELEASE_BRANCH: &str = "releases";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub family: Family,
    pub version: String,
    /// Libraries to publish. Empty means every library of the family.
    pub libraries: BTreeSet<String>,
    pub prerelease: bool,
}

/// Publishes an installed version as a release.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, request: &PushRequest) -> Result<()>;
}

/// Packs an installed version into `common.tar.zst` plus one
/// `<library>.tar.zst` per library and uploads them to a new release
/// tagged `<family>-<version>`.
pub struct ReleasePublisher<'a, R: Runtime> {
    store: &'a VersionStore<'a, R>,
    catalogue: &'a dyn ReleaseCatalogue,
    release_repo: GitHubRepo,
    has_token: bool,
    reporter: &'a dyn Reporter,
}

impl<'a, R: Runtime> ReleasePublisher<'a, R> {
    pub fn new(
        store: &'a VersionStore<'a, R>,
        catalogue: &'a dyn ReleaseCatalogue,
        release_repo: GitHubRepo,
        has_token: bool,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            store,
            catalogue,
            release_repo,
            has_token,
            reporter,
        }
    }

    fn pack(
        &self,
        version_dir: &Path,
        buckets: &BTreeMap<String, Vec<PathBuf>>,
        out_dir: &Path,
    ) -> Result<Vec<(String, PathBuf)>> {
        let mut archives = Vec::new();
        for (name, files) in buckets {
            let file_name = format!("{}.tar.zst", name);
            let output = out_dir.join(&file_name);
            let task = self.reporter.task(&format!("Compressing {}", name));
            pack_tar_zst(self.store.runtime(), version_dir, files, &output, task.as_ref())?;
            task.finish();
            archives.push((file_name, output));
        }
        Ok(archives)
    }

    async fn release_body(&self, family: &Family, version: &str) -> String {
        let source = GitHubRepo::from(family.source());
        match self.catalogue.commit_date(&source, version).await {
            Some(date) => format!(
                "{} variants (released on {})",
                family.name(),
                date.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => format!("{} variants built using pdkm", family.name()),
        }
    }
}

#[async_trait]
impl<R: Runtime> Pusher for ReleasePublisher<'_, R> {
    #[tracing::instrument(skip(self, request), fields(family = request.family.name(), version = %request.version))]
    async fn push(&self, request: &PushRequest) -> Result<()> {
        if !self.has_token {
            bail!("No GitHub token was provided; set VOLARE_GH_TOKEN or GITHUB_TOKEN");
        }

        let family = &request.family;
        let version_dir = self.store.version_dir(family.name(), &request.version);
        let runtime = self.store.runtime();
        if !runtime.is_dir(&version_dir) {
            bail!("Version {} not found.", request.version);
        }

        let libraries: BTreeSet<String> = if request.libraries.is_empty() {
            family.all_libraries().iter().cloned().collect()
        } else {
            request.libraries.clone()
        };

        let files = walk_files(runtime, &version_dir)?;
        let buckets = bucket_files(&version_dir, &files, &libraries);

        let scratch = tempfile::Builder::new()
            .suffix(".pdkm")
            .tempdir()
            .context("Failed to create a temporary directory for archives")?;
        let archives = self.pack(&version_dir, &buckets, scratch.path())?;

        let tag = format!("{}-{}", family.name(), request.version);
        let body = self.release_body(family, &request.version).await;
        self.reporter.status(&format!("Creating release {}…", tag));
        let release = self
            .catalogue
            .create_release(
                &self.release_repo,
                &NewRelease {
                    target_commitish: RELEASE_BRANCH.to_string(),
                    tag_name: tag.clone(),
                    name: tag.clone(),
                    body,
                    prerelease: request.prerelease,
                    draft: false,
                },
            )
            .await?;

        for (name, path) in archives {
            let mut data = Vec::new();
            runtime
                .open(&path)?
                .read_to_end(&mut data)
                .with_context(|| format!("Failed to read {:?}", path))?;
            debug!("Uploading {} ({} bytes)", name, data.len());
            let task: Arc<dyn TaskProgress> = Arc::from(self.reporter.task(&format!("Uploading {}", name)));
            self.catalogue
                .upload_asset(&release, &name, data, Arc::clone(&task))
                .await
                .with_context(|| format!("Failed to upload {} to {}", name, tag))?;
            task.finish();
        }

        self.reporter.status(&format!("Published {}.", tag));
        Ok(())
    }
}

/// Every non-directory entry below `dir`, symlinks included, sorted.
fn walk_files<R: Runtime>(runtime: &R, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in runtime.read_dir(&current)? {
            if runtime.is_symlink(&entry) || !runtime.is_dir(&entry) {
                files.push(entry);
            } else {
                pending.push(entry);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Sorts files into archives: `<variant>/libs.ref/<lib>/...` goes to `lib`
/// when it is selected and is dropped otherwise; everything else is
/// `common`.
pub fn bucket_files(
    version_dir: &Path,
    files: &[PathBuf],
    libraries: &BTreeSet<String>,
) -> BTreeMap<String, Vec<PathBuf>> {
    let mut buckets: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    buckets.insert(COMMON_BUCKET.to_string(), Vec::new());

    for file in files {
        let Ok(relative) = file.strip_prefix(version_dir) else {
            continue;
        };
        let components: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        let bucket = match components.as_slice() {
            [_, "libs.ref", lib, _, ..] => {
                if !libraries.contains(*lib) {
                    continue;
                }
                lib.to_string()
            }
            _ => COMMON_BUCKET.to_string(),
        };
        buckets.entry(bucket).or_default().push(file.clone());
    }
    buckets
}
