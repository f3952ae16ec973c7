//! Making a (version, library selection) present on disk.
//!
//! Only the missing pieces are downloaded: the `common` payload when the
//! first variant has no `libs.tech`, and each selected library that no
//! variant has under `libs.ref`. When nothing is missing no request is
//! made at all. A version without a release is built instead, if allowed.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::archive::TarExtractor;
use crate::build::{BuildRequest, Builder, PushRequest, Pusher, install_build};
use crate::cleanup::{CleanupGuard, SharedCleanupContext, lock, new_shared};
use crate::download::download_file;
use crate::error::PdkError;
use crate::family::Family;
use crate::github::{GitHubRepo, Release, ReleaseCatalogue};
use crate::http::HttpClient;
use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::VersionStore;

/// Asset of a release that carries every variant in one archive.
pub const LEGACY_ASSET: &str = "default.tar.xz";
const COMMON_PIECE: &str = "common";
const COMMON_MARKER: &str = "libs.tech";
const LIBRARY_DIR: &str = "libs.ref";
const SOURCES_FILE: &str = "SOURCES";

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// `None` selects the family's default libraries.
    pub libraries: Option<Vec<String>>,
    pub build_fallback: bool,
    pub push_fallback: bool,
    pub jobs: usize,
    pub clear_build_artifacts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded { assets: Vec<String> },
    Built,
}

/// What a version directory lacks for a library selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingPieces {
    pub common: bool,
    pub libraries: BTreeSet<String>,
}

impl MissingPieces {
    pub fn is_empty(&self) -> bool {
        !self.common && self.libraries.is_empty()
    }
}

/// Which part of the version an asset populates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Common,
    Library(String),
    /// A legacy archive holding every variant.
    Everything,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAsset {
    pub name: String,
    pub url: String,
    pub piece: Piece,
}

pub fn missing_pieces<R: Runtime>(
    store: &VersionStore<'_, R>,
    family: &Family,
    version: &str,
    libraries: &BTreeSet<String>,
) -> MissingPieces {
    let runtime = store.runtime();
    let version_dir = store.version_dir(family.name(), version);

    let common = !runtime.exists(
        &version_dir
            .join(family.variants()[0].as_str())
            .join(COMMON_MARKER),
    );
    let libraries = libraries
        .iter()
        .filter(|lib| {
            !family.variants().iter().any(|variant| {
                runtime.exists(&version_dir.join(variant).join(LIBRARY_DIR).join(lib.as_str()))
            })
        })
        .cloned()
        .collect();

    MissingPieces { common, libraries }
}

/// Chooses the assets of `release` that cover `missing`.
///
/// A release with per-library archives must have one for every missing
/// piece. A release that only has [`LEGACY_ASSET`] is fetched whole.
pub fn plan_downloads(release: &Release, missing: &MissingPieces) -> Result<Vec<PlannedAsset>> {
    let common_asset = format!("{}.tar.zst", COMMON_PIECE);
    if release.asset(&common_asset).is_none()
        && let Some(legacy) = release.asset(LEGACY_ASSET)
    {
        return Ok(vec![PlannedAsset {
            name: legacy.name.clone(),
            url: legacy.browser_download_url.clone(),
            piece: Piece::Everything,
        }]);
    }

    let mut wanted = Vec::new();
    if missing.common {
        wanted.push((common_asset, Piece::Common));
    }
    for library in &missing.libraries {
        wanted.push((format!("{}.tar.zst", library), Piece::Library(library.clone())));
    }

    wanted
        .into_iter()
        .map(|(name, piece)| {
            let asset = release.asset(&name).ok_or_else(|| PdkError::MissingAsset {
                release: release.tag_name.clone(),
                asset: name.clone(),
            })?;
            Ok(PlannedAsset {
                name,
                url: asset.browser_download_url.clone(),
                piece,
            })
        })
        .collect()
}

pub struct FetchEngine<'a, R: Runtime> {
    store: &'a VersionStore<'a, R>,
    catalogue: &'a dyn ReleaseCatalogue,
    http: &'a HttpClient,
    release_repo: &'a GitHubRepo,
    reporter: &'a dyn Reporter,
    builder: Option<&'a dyn Builder>,
    pusher: Option<&'a dyn Pusher>,
}

impl<'a, R: Runtime> FetchEngine<'a, R> {
    pub fn new(
        store: &'a VersionStore<'a, R>,
        catalogue: &'a dyn ReleaseCatalogue,
        http: &'a HttpClient,
        release_repo: &'a GitHubRepo,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            store,
            catalogue,
            http,
            release_repo,
            reporter,
            builder: None,
            pusher: None,
        }
    }

    pub fn with_builder(mut self, builder: &'a dyn Builder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_pusher(mut self, pusher: &'a dyn Pusher) -> Self {
        self.pusher = Some(pusher);
        self
    }

    /// Ensures `version` with the selected libraries is on disk.
    ///
    /// On failure or Ctrl-C, every path that was being populated is removed
    /// before the error is returned, so a later call sees it as missing.
    #[tracing::instrument(skip(self, family, options), fields(family = family.name()))]
    pub async fn fetch(
        &self,
        family: &Family,
        version: &str,
        options: &FetchOptions,
    ) -> Result<FetchOutcome> {
        let libraries = family.resolve_libraries(options.libraries.as_deref())?;
        let missing = missing_pieces(self.store, family, version, &libraries);
        if missing.is_empty() {
            debug!("{} {} already has everything requested", family.name(), version);
            return Ok(FetchOutcome::AlreadyPresent);
        }

        if self.store.is_installed(family.name(), version) {
            self.reporter.status(&format!(
                "Version {} is missing some libraries, attempting to download…",
                version
            ));
        } else {
            self.reporter.status(&format!(
                "Version {} not found locally, attempting to download…",
                version
            ));
        }

        let ctx = new_shared();
        let result = tokio::select! {
            result = self.fetch_missing(family, version, &libraries, &missing, options, ctx.clone()) => result,
            Ok(()) = tokio::signal::ctrl_c() => Err(PdkError::Interrupted.into()),
        };

        if let Err(e) = &result {
            if PdkError::is_interrupted(e) {
                self.reporter.status("Interrupted.");
            }
            lock(&ctx)?.cleanup(self.store.runtime());
        }
        result
    }

    async fn fetch_missing(
        &self,
        family: &Family,
        version: &str,
        libraries: &BTreeSet<String>,
        missing: &MissingPieces,
        options: &FetchOptions,
        ctx: SharedCleanupContext,
    ) -> Result<FetchOutcome> {
        let tag = format!("{}-{}", family.name(), version);
        let Some(release) = self.catalogue.release_by_tag(self.release_repo, &tag).await? else {
            return self.build_instead(family, version, libraries, options).await;
        };

        let plan = plan_downloads(&release, missing)?;
        let runtime = self.store.runtime();
        let version_dir = self.store.version_dir(family.name(), version);

        let guards = if runtime.exists(&version_dir) {
            plan.iter()
                .flat_map(|asset| self.populated_paths(family, version, &asset.piece))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|path| CleanupGuard::new(ctx.clone(), path))
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![CleanupGuard::new(ctx.clone(), version_dir.clone())?]
        };
        runtime
            .create_dir_all(&version_dir)
            .with_context(|| format!("Failed to create {:?}", version_dir))?;

        let scratch = tempfile::Builder::new()
            .suffix(".pdkm")
            .tempdir()
            .context("Failed to create a temporary directory for downloads")?;
        for asset in &plan {
            let archive_path = scratch.path().join(&asset.name);
            download_file(runtime, &asset.url, &archive_path, self.http, self.reporter).await?;

            self.reporter.status(&format!("Unpacking {}…", asset.name));
            let unpacked = TarExtractor.extract(runtime, &archive_path, &version_dir);
            if let Err(e) = runtime.remove_file(&archive_path) {
                debug!("Failed to remove {:?}: {:#}", archive_path, e);
            }
            let summary = unpacked.with_context(|| format!("Failed to unpack {}", asset.name))?;
            debug!("Unpacked {} files from {}", summary.files, asset.name);
            if !family.variants().iter().any(|v| summary.top_level.contains(v)) {
                warn!(
                    "{} holds none of the variants {} of {}",
                    asset.name,
                    family.variants().join(", "),
                    family.name()
                );
            }
        }

        for guard in guards {
            guard.success()?;
        }
        write_sources(self.store, family, version)?;

        Ok(FetchOutcome::Downloaded {
            assets: plan.into_iter().map(|a| a.name).collect(),
        })
    }

    /// Paths an asset creates inside an already existing version.
    ///
    /// Anything present before the download is left out, so a failed
    /// download only ever removes what it started writing.
    fn populated_paths(&self, family: &Family, version: &str, piece: &Piece) -> Vec<PathBuf> {
        let runtime = self.store.runtime();
        let version_dir = self.store.version_dir(family.name(), version);
        let mut paths = Vec::new();
        for variant in family.variants() {
            let variant_dir = version_dir.join(variant);
            match piece {
                Piece::Common => paths.push(variant_dir.join(COMMON_MARKER)),
                Piece::Library(library) => paths.push(variant_dir.join(LIBRARY_DIR).join(library)),
                Piece::Everything if !runtime.exists(&variant_dir) => paths.push(variant_dir),
                Piece::Everything => {
                    paths.push(variant_dir.join(COMMON_MARKER));
                    paths.extend(
                        family
                            .all_libraries()
                            .iter()
                            .map(|library| variant_dir.join(LIBRARY_DIR).join(library)),
                    );
                }
            }
        }
        paths.retain(|path| !runtime.exists(path) && !runtime.is_symlink(path));
        paths
    }

    async fn build_instead(
        &self,
        family: &Family,
        version: &str,
        libraries: &BTreeSet<String>,
        options: &FetchOptions,
    ) -> Result<FetchOutcome> {
        let not_found = || PdkError::NotFound {
            family: family.name().to_string(),
            version: version.to_string(),
        };
        if !options.build_fallback {
            return Err(not_found().into());
        }
        let Some(builder) = self.builder else {
            return Err(anyhow::Error::from(not_found()).context("No builder is available"));
        };

        self.reporter.status(&format!(
            "Version {} not found remotely, attempting to build…",
            version
        ));
        builder
            .build(&BuildRequest {
                pdk_root: self.store.pdk_root().to_path_buf(),
                family: family.clone(),
                version: version.to_string(),
                jobs: options.jobs.max(1),
                clear_build_artifacts: options.clear_build_artifacts,
                libraries: libraries.clone(),
            })
            .await?;
        install_build(self.store, family, version, options.clear_build_artifacts)?;
        write_sources(self.store, family, version)?;

        if options.push_fallback {
            let Some(pusher) = self.pusher else {
                bail!("Built {} but no publisher is available to push it", version);
            };
            pusher
                .push(&PushRequest {
                    family: family.clone(),
                    version: version.to_string(),
                    libraries: libraries.clone(),
                    prerelease: false,
                })
                .await?;
        }
        Ok(FetchOutcome::Built)
    }
}

/// Writes `<source repo> <version>` into each variant lacking a `SOURCES`
/// file.
pub fn write_sources<R: Runtime>(
    store: &VersionStore<'_, R>,
    family: &Family,
    version: &str,
) -> Result<()> {
    let runtime = store.runtime();
    let version_dir = store.version_dir(family.name(), version);
    for variant in family.variants() {
        let variant_dir = version_dir.join(variant);
        if !runtime.is_dir(&variant_dir) {
            continue;
        }
        let sources = variant_dir.join(SOURCES_FILE);
        if runtime.is_file(&sources) {
            continue;
        }
        info!("Writing {:?}", sources);
        runtime
            .write(
                &sources,
                format!("{} {}\n", family.source().name, version).as_bytes(),
            )
            .with_context(|| format!("Failed to write {:?}", sources))?;
    }
    Ok(())
}
