//! Producing a version from source when no release carries it, and
//! installing what the build left behind.

mod push;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::error::PdkError;
use crate::family::Family;
use crate::git::{CloneTarget, GitMultiClone, Repository, all_ok};
use crate::progress::Reporter;
use crate::runtime::Runtime;
use crate::version::VersionStore;

pub use push::{PushRequest, Pusher, ReleasePublisher, bucket_files};
#[cfg(test)]
pub use push::MockPusher;

/// What to build. A build is all or nothing for a version, so `libraries`
/// is the full requested set, not only what happens to be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub pdk_root: PathBuf,
    pub family: Family,
    pub version: String,
    pub jobs: usize,
    pub clear_build_artifacts: bool,
    pub libraries: BTreeSet<String>,
}

impl BuildRequest {
    pub fn build_dir(&self) -> PathBuf {
        self.pdk_root
            .join(self.family.name())
            .join("build")
            .join(&self.version)
    }
}

/// Leaves one directory per variant under [`BuildRequest::build_dir`] on
/// success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<()>;
}

/// Checks out the family's upstream sources at the requested commit and
/// runs an external build command in the checkout.
///
/// The command sees `PDKM_FAMILY`, `PDKM_VERSION`, `PDKM_JOBS`,
/// `PDKM_LIBRARIES` (comma-separated), `PDKM_BUILD_DIR` and
/// `PDKM_SOURCE_DIR`. It is killed if the build future is dropped.
pub struct ScriptBuilder {
    command: Option<String>,
    use_repo_at: Option<PathBuf>,
    reporter: Arc<dyn Reporter>,
}

impl ScriptBuilder {
    pub fn new(
        command: Option<String>,
        use_repo_at: Option<PathBuf>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            command,
            use_repo_at,
            reporter,
        }
    }

    /// Checkout the build runs in. A fresh clone also gets every submodule
    /// it declares before the build starts; an existing checkout is used as
    /// it is.
    async fn source_dir(&self, request: &BuildRequest) -> Result<PathBuf> {
        if let Some(path) = &self.use_repo_at {
            let repo = Repository::open(path)
                .await
                .with_context(|| format!("{:?} is not a usable git checkout", path))?;
            info!("Using existing checkout of {} at {:?}", repo.url, repo.path);
            return Ok(repo.path);
        }

        let source = request.family.source();
        let target = CloneTarget {
            url: source.https_url(),
            path: request.build_dir().join("src").join(&source.name),
            commit: request.version.clone(),
            default_branch: source.default_branch.clone(),
        };
        let clones = GitMultiClone::new(request.jobs, Arc::clone(&self.reporter));
        let mut repos = all_ok(clones.clone_all(vec![target]).await)?;
        let repo = repos
            .pop()
            .context("Clone produced no repository")?;

        let submodules = repo.submodules().await?;
        if !submodules.is_empty() {
            debug!("Updating {} submodules of {}", submodules.len(), repo.name());
            all_ok(clones.clone_submodules(&repo, submodules).await)?;
        }
        Ok(repo.path)
    }
}

#[async_trait]
impl Builder for ScriptBuilder {
    #[tracing::instrument(skip(self, request), fields(family = request.family.name(), version = %request.version))]
    async fn build(&self, request: &BuildRequest) -> Result<()> {
        let Some(script) = self.command.as_deref() else {
            bail!("No build command configured; pass --build-command or set PDKM_BUILD_COMMAND");
        };

        let build_dir = request.build_dir();
        tokio::fs::create_dir_all(&build_dir)
            .await
            .with_context(|| format!("Failed to create build directory {:?}", build_dir))?;

        let source_dir = self.source_dir(request).await?;
        let libraries = request
            .libraries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        self.reporter.status(&format!(
            "Building {} {}…",
            request.family.name(),
            request.version
        ));
        debug!("Running build command {:?} in {:?}", script, source_dir);

        let mut command = shell(script);
        command
            .current_dir(&source_dir)
            .env("PDKM_FAMILY", request.family.name())
            .env("PDKM_VERSION", &request.version)
            .env("PDKM_JOBS", request.jobs.to_string())
            .env("PDKM_LIBRARIES", libraries)
            .env("PDKM_BUILD_DIR", &build_dir)
            .env("PDKM_SOURCE_DIR", &source_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run build command {:?}", script))?;
        debug!("Build output:\n{}", String::from_utf8_lossy(&output.stdout));

        if !output.status.success() {
            return Err(PdkError::Command {
                program: script.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(not(windows))]
fn shell(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[cfg(windows)]
fn shell(script: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(script);
    command
}

/// Moves the variants a build left in `<family>/build/<version>` into the
/// version directory.
///
/// A non-empty version directory is first moved aside to the first free
/// `<version>.bk<N>`. The build directory is deleted afterwards when
/// `clear_build_artifacts` is set.
#[tracing::instrument(skip(store, family), fields(family = family.name()))]
pub fn install_build<R: Runtime>(
    store: &VersionStore<'_, R>,
    family: &Family,
    version: &str,
    clear_build_artifacts: bool,
) -> Result<PathBuf> {
    let runtime = store.runtime();
    let build_dir = store.build_dir(family.name(), version);
    let built: Vec<&String> = family
        .variants()
        .iter()
        .filter(|variant| runtime.is_dir(&build_dir.join(variant)))
        .collect();
    if built.is_empty() {
        bail!(
            "Build of {} {} produced none of the variants {}",
            family.name(),
            version,
            family.variants().join(", ")
        );
    }

    let version_dir = store.version_dir(family.name(), version);
    if !is_empty_dir(runtime, &version_dir)? {
        let backup = backup_path(store, family.name(), version)?;
        info!("Build already found at {:?}, moving to {:?}", version_dir, backup);
        if runtime.is_dir(&backup) {
            runtime.remove_dir_all(&backup)?;
        }
        runtime
            .rename(&version_dir, &backup)
            .with_context(|| format!("Failed to move {:?} aside", version_dir))?;
    }

    runtime.create_dir_all(&version_dir)?;
    for variant in built {
        runtime
            .rename(&build_dir.join(variant), &version_dir.join(variant))
            .with_context(|| format!("Failed to install variant {}", variant))?;
    }

    if clear_build_artifacts {
        debug!("Removing build directory {:?}", build_dir);
        runtime
            .remove_dir_all(&build_dir)
            .with_context(|| format!("Failed to remove build directory {:?}", build_dir))?;
    }
    Ok(version_dir)
}

/// `true` when `path` is missing or an empty directory.
fn is_empty_dir<R: Runtime>(runtime: &R, path: &Path) -> Result<bool> {
    if !runtime.exists(path) {
        return Ok(true);
    }
    Ok(runtime.is_dir(path) && runtime.read_dir(path)?.is_empty())
}

fn backup_path<R: Runtime>(store: &VersionStore<'_, R>, family: &str, version: &str) -> Result<PathBuf> {
    let mut n = 1;
    loop {
        let candidate = store.version_dir(family, &format!("{}.bk{}", version, n));
        if is_empty_dir(store.runtime(), &candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}
