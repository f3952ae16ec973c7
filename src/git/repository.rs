use anyhow::{Context, Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::progress::{ProgressTracker, drain_lines};
use crate::error::PdkError;

/// Name of the local branch that always points at the last commit this
/// tool checked out.
pub const CURRENT_BRANCH: &str = "current";

/// A git working tree on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub url: String,
    pub path: PathBuf,
    pub default_branch: String,
}

impl Repository {
    pub fn new(url: &str, path: &Path, default_branch: &str) -> Self {
        Self {
            url: url.to_string(),
            path: path.to_path_buf(),
            default_branch: default_branch.to_string(),
        }
    }

    /// Reconstructs a repository from an existing checkout, reading the
    /// origin URL and the branch `origin/HEAD` points at.
    #[tracing::instrument]
    pub async fn open(path: &Path) -> Result<Self> {
        let url = run_git(Some(path), &["remote", "get-url", "origin"], None).await?;
        let head = run_git(
            Some(path),
            &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
            None,
        )
        .await?;
        let default_branch = head
            .trim()
            .strip_prefix("origin/")
            .ok_or_else(|| anyhow!("Unexpected origin/HEAD in {:?}: {}", path, head.trim()))?;
        Ok(Self::new(url.trim(), path, default_branch))
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.url.clone())
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        run_git(Some(&self.path), args, None).await
    }

    /// `git clone` into `self.path`, whose parent must exist.
    pub async fn clone_fresh(&self, tracker: &mut ProgressTracker) -> Result<()> {
        let path = self.path.to_string_lossy();
        run_git(None, &["clone", "--progress", &self.url, &path], Some(tracker)).await?;
        Ok(())
    }

    /// Discards untracked files, ignored or not, then modifications.
    pub async fn pristine(&self) -> Result<()> {
        self.git(&["clean", "-fdx"]).await?;
        self.git(&["reset", "--hard", "HEAD"]).await?;
        Ok(())
    }

    /// Fast-forwards the default branch.
    pub async fn pull(&self, tracker: &mut ProgressTracker) -> Result<()> {
        self.git(&["checkout", "-f", &self.default_branch]).await?;
        run_git(
            Some(&self.path),
            &["pull", "--no-recurse-submodules", "--progress"],
            Some(tracker),
        )
        .await?;
        Ok(())
    }

    pub async fn submodule_init(&self) -> Result<()> {
        self.git(&["submodule", "init"]).await?;
        Ok(())
    }

    /// Points a freshly created `current` branch at `commit`.
    pub async fn checkout(&self, commit: &str) -> Result<()> {
        self.git(&["checkout", "-f", &self.default_branch]).await?;
        if let Err(e) = self.git(&["branch", "-D", CURRENT_BRANCH]).await {
            debug!("No previous {} branch to delete: {:#}", CURRENT_BRANCH, e);
        }
        self.git(&["checkout", "-f", "-b", CURRENT_BRANCH, commit])
            .await
            .with_context(|| format!("Failed to check out {} in {}", commit, self.name()))?;
        Ok(())
    }

    /// Paths of the submodules declared in `.gitmodules`, in file order.
    pub async fn submodules(&self) -> Result<Vec<String>> {
        if !self.path.join(".gitmodules").is_file() {
            return Ok(Vec::new());
        }
        let listed = self
            .git(&["config", "--file", ".gitmodules", "--get-regexp", r"^submodule\..*\.path$"])
            .await;
        let listed = match listed {
            Ok(listed) => listed,
            // Exit status 1 means no key matched
            Err(e) => match PdkError::kind_of(&e) {
                Some(PdkError::Command { status, .. }) if status.code() == Some(1) => {
                    return Ok(Vec::new());
                }
                _ => return Err(e),
            },
        };
        Ok(listed
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(_, path)| path.trim().to_string())
            .collect())
    }

    /// Initializes, or updates when already initialized, one submodule.
    pub async fn update_submodule(&self, submodule: &str, tracker: &mut ProgressTracker) -> Result<()> {
        if self.path.join(submodule).join(".git").exists() {
            self.git(&["submodule", "update", "--remote", submodule]).await?;
        } else {
            run_git(
                Some(&self.path),
                &["submodule", "update", "--init", "--progress", submodule],
                Some(tracker),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn head_commit(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    pub async fn current_branch(&self) -> Result<String> {
        Ok(self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .trim()
            .to_string())
    }
}

/// Runs git and returns its stdout. With a tracker, stderr is parsed for
/// progress as it streams; either way it is captured for the error.
#[tracing::instrument(skip(tracker))]
pub(crate) async fn run_git(
    cwd: Option<&Path>,
    args: &[&str],
    tracker: Option<&mut ProgressTracker>,
) -> Result<String> {
    let mut command = Command::new("git");
    command
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    // Test fixtures serve submodules from local paths
    #[cfg(test)]
    command
        .env("GIT_CONFIG_COUNT", "1")
        .env("GIT_CONFIG_KEY_0", "protocol.file.allow")
        .env("GIT_CONFIG_VALUE_0", "always");

    let program = format!("git {}", args.join(" "));
    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to run {}", program))?;

    let stdout = child.stdout.take().context("git stdout was not captured")?;
    let stderr = child.stderr.take().context("git stderr was not captured")?;

    let (stdout, stderr) = tokio::try_join!(read_all(stdout), stream_stderr(stderr, tracker))?;
    let status = child
        .wait()
        .await
        .with_context(|| format!("Failed to wait for {}", program))?;

    if !status.success() {
        return Err(PdkError::Command {
            program,
            status,
            stderr,
        }
        .into());
    }
    Ok(stdout)
}

async fn read_all<T: AsyncRead + Unpin>(mut stream: T) -> Result<String> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

async fn stream_stderr<T: AsyncRead + Unpin>(
    mut stream: T,
    mut tracker: Option<&mut ProgressTracker>,
) -> Result<String> {
    let mut captured = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&chunk[..n]);
        if let Some(tracker) = tracker.as_deref_mut() {
            pending.extend_from_slice(&chunk[..n]);
            for line in drain_lines(&mut pending) {
                tracker.feed(&line);
            }
        }
    }
    if let Some(tracker) = tracker {
        let tail = String::from_utf8_lossy(&pending).into_owned();
        tracker.feed(&tail);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}
