use anyhow::Result;
use log::debug;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::build::{BuildRequest, Builder, PushRequest, Pusher, ReleasePublisher, ScriptBuilder, install_build};
use crate::error::PdkError;
use crate::fetch::{FetchEngine, FetchOptions, FetchOutcome, write_sources};
use crate::family::Family;
use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::VersionStore;

use super::config::Config;
use super::resolve_version;

/// What to fetch, and what to do when no release exists.
#[derive(Debug, Clone, Default)]
pub struct FetchArgs {
    pub version: Option<String>,
    pub metadata_file: Option<PathBuf>,
    pub libraries: Option<Vec<String>>,
    pub build: bool,
    pub push: bool,
    pub build_command: Option<String>,
    pub use_repo_at: Option<PathBuf>,
    pub clear_build_artifacts: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub version: Option<String>,
    pub metadata_file: Option<PathBuf>,
    pub libraries: Option<Vec<String>>,
    pub build_command: Option<String>,
    pub use_repo_at: Option<PathBuf>,
    pub clear_build_artifacts: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PushArgs {
    pub version: Option<String>,
    pub metadata_file: Option<PathBuf>,
    pub libraries: Option<Vec<String>>,
    pub prerelease: bool,
}

/// Make sure a version is installed, then print its directory
#[tracing::instrument(skip(runtime, config, reporter))]
pub async fn fetch<R: Runtime>(
    runtime: &R,
    config: &Config,
    reporter: Arc<dyn Reporter>,
    args: FetchArgs,
) -> Result<()> {
    let family = config.family()?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());
    let version = fetch_version(&store, config, family, reporter, args).await?;
    println!("{}", store.version_dir(family.name(), &version).display());
    Ok(())
}

/// Shared by `fetch` and `enable`. Returns the resolved version name.
pub(super) async fn fetch_version<R: Runtime>(
    store: &VersionStore<'_, R>,
    config: &Config,
    family: &Family,
    reporter: Arc<dyn Reporter>,
    args: FetchArgs,
) -> Result<String> {
    let version = resolve_version(store.runtime(), args.version, args.metadata_file.as_deref())?;

    let github = config.github();
    let builder = ScriptBuilder::new(args.build_command, args.use_repo_at, Arc::clone(&reporter));
    let publisher = ReleasePublisher::new(
        store,
        &github,
        config.release_repo.clone(),
        config.token.is_some(),
        reporter.as_ref(),
    );
    let engine = FetchEngine::new(
        store,
        &github,
        &config.http_client,
        &config.release_repo,
        reporter.as_ref(),
    )
    .with_builder(&builder)
    .with_pusher(&publisher);

    let outcome = engine
        .fetch(
            family,
            &version,
            &FetchOptions {
                libraries: args.libraries,
                build_fallback: args.build,
                push_fallback: args.push,
                jobs: config.jobs,
                clear_build_artifacts: args.clear_build_artifacts,
            },
        )
        .await?;

    match outcome {
        FetchOutcome::AlreadyPresent => debug!("Version {} is already installed", version),
        FetchOutcome::Downloaded { assets } => {
            reporter.status(&format!("Downloaded {} for version {}.", assets.join(", "), version))
        }
        FetchOutcome::Built => reporter.status(&format!("Built version {}.", version)),
    }
    Ok(version)
}

/// Build a version from source and install it, without downloading anything
#[tracing::instrument(skip(runtime, config, reporter))]
pub async fn build<R: Runtime>(
    runtime: &R,
    config: &Config,
    reporter: Arc<dyn Reporter>,
    args: BuildArgs,
) -> Result<()> {
    let family = config.family()?;
    let version = resolve_version(runtime, args.version, args.metadata_file.as_deref())?;
    let libraries = family.resolve_libraries(args.libraries.as_deref())?;
    let store = VersionStore::new(runtime, config.pdk_root.clone());

    let builder = ScriptBuilder::new(args.build_command, args.use_repo_at, Arc::clone(&reporter));
    let request = BuildRequest {
        pdk_root: config.pdk_root.clone(),
        family: family.clone(),
        version: version.clone(),
        jobs: config.jobs,
        clear_build_artifacts: args.clear_build_artifacts,
        libraries,
    };
    // Dropping the build future kills the build command
    tokio::select! {
        result = builder.build(&request) => result?,
        Ok(()) = tokio::signal::ctrl_c() => {
            reporter.status("Interrupted.");
            return Err(PdkError::Interrupted.into());
        }
    }
    let version_dir = install_build(&store, family, &version, args.clear_build_artifacts)?;
    write_sources(&store, family, &version)?;

    reporter.status(&format!("Built version {}.", version));
    println!("{}", version_dir.display());
    Ok(())
}

/// Publish an installed version as a release
#[tracing::instrument(skip(runtime, config, reporter))]
pub async fn push<R: Runtime>(
    runtime: &R,
    config: &Config,
    reporter: Arc<dyn Reporter>,
    args: PushArgs,
) -> Result<()> {
    let family = config.family()?;
    let version = resolve_version(runtime, args.version, args.metadata_file.as_deref())?;
    // No selection means every library present on disk
    let libraries = match args.libraries {
        Some(libraries) => family.resolve_libraries(Some(libraries.as_slice()))?,
        None => BTreeSet::new(),
    };
    let store = VersionStore::new(runtime, config.pdk_root.clone());
    let github = config.github();

    ReleasePublisher::new(
        &store,
        &github,
        config.release_repo.clone(),
        config.token.is_some(),
        reporter.as_ref(),
    )
    .push(&PushRequest {
        family: family.clone(),
        version,
        libraries,
        prerelease: args.prerelease,
    })
    .await
}
