use anyhow::{Result, anyhow};
use log::debug;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{Repository, clone, clone_submodule};
use crate::progress::{Reporter, TaskProgress};

/// One repository to bring to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneTarget {
    pub url: String,
    pub path: PathBuf,
    pub commit: String,
    pub default_branch: String,
}

/// Runs clones and submodule updates over a bounded pool, one progress
/// slot per operation.
///
/// Results come back in input order once every operation has finished. A
/// failing operation does not cancel its siblings.
pub struct GitMultiClone {
    jobs: usize,
    reporter: Arc<dyn Reporter>,
}

impl GitMultiClone {
    pub fn new(jobs: usize, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            jobs: jobs.max(1),
            reporter,
        }
    }

    #[tracing::instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn clone_all(&self, targets: Vec<CloneTarget>) -> Vec<Result<Repository>> {
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut set = JoinSet::new();
        let mut results: Vec<Option<Result<Repository>>> = Vec::new();
        let mut seen = HashSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            results.push(None);
            if !seen.insert(target.path.clone()) {
                results[index] = Some(Err(anyhow!(
                    "{:?} appears more than once in the same clone batch",
                    target.path
                )));
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let reporter = Arc::clone(&self.reporter);
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let name = target
                            .path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| target.url.clone());
                        let task: Arc<dyn TaskProgress> =
                            Arc::from(reporter.task(&format!("Cloning {}", name)));
                        clone(
                            &target.url,
                            &target.path,
                            &target.commit,
                            &target.default_branch,
                            task,
                        )
                        .await
                    }
                    Err(e) => Err(anyhow!("Clone pool closed: {}", e)),
                };
                (index, result)
            });
        }

        collect(set, results).await
    }

    #[tracing::instrument(skip(self, repo, submodules), fields(repo = %repo.name()))]
    pub async fn clone_submodules(
        &self,
        repo: &Repository,
        submodules: Vec<String>,
    ) -> Vec<Result<()>> {
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut set = JoinSet::new();
        let mut results: Vec<Option<Result<()>>> = Vec::new();
        let mut seen = HashSet::new();

        for (index, submodule) in submodules.into_iter().enumerate() {
            results.push(None);
            if !seen.insert(submodule.clone()) {
                results[index] = Some(Err(anyhow!(
                    "Submodule {} appears more than once in the same batch",
                    submodule
                )));
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let reporter = Arc::clone(&self.reporter);
            let repo = repo.clone();
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let task: Arc<dyn TaskProgress> =
                            Arc::from(reporter.task(&format!("Updating {}", submodule)));
                        clone_submodule(&repo, &submodule, task).await
                    }
                    Err(e) => Err(anyhow!("Clone pool closed: {}", e)),
                };
                (index, result)
            });
        }

        collect(set, results).await
    }
}

/// Waits for every task, then places each result at its input index.
async fn collect<T: Send + 'static>(
    mut set: JoinSet<(usize, Result<T>)>,
    mut results: Vec<Option<Result<T>>>,
) -> Vec<Result<T>> {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Err(e) = &result {
                    debug!("Operation {} failed: {:#}", index, e);
                }
                results[index] = Some(result);
            }
            Err(e) => debug!("Clone task did not complete: {}", e),
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(anyhow!("Clone task did not complete"))))
        .collect()
}

/// Returns every value, or the first error in input order.
pub fn all_ok<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    results.into_iter().collect()
}
