//! Bringing git repositories, and single submodules within them, to an
//! exact commit with live progress.
//!
//! Operations on different paths may run concurrently; nothing here locks,
//! so callers must not run two operations on the same path at once.

mod multi_clone;
mod progress;
mod repository;

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::progress::TaskProgress;

pub use multi_clone::{CloneTarget, GitMultiClone, all_ok};
pub use progress::ProgressTracker;
pub use repository::{CURRENT_BRANCH, Repository};

/// Clones `url` into `path`, or refreshes an existing clone, then checks
/// `commit` out onto the `current` branch.
///
/// An existing tree is reset to a pristine state and its default branch
/// fast-forwarded first. A commit that cannot be resolved fails the clone.
#[tracing::instrument(skip(progress))]
pub async fn clone(
    url: &str,
    path: &Path,
    commit: &str,
    default_branch: &str,
    progress: Arc<dyn TaskProgress>,
) -> Result<Repository> {
    let repo = Repository::new(url, path, default_branch);
    let mut tracker = ProgressTracker::new(progress);

    if !path.exists() {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        debug!("Cloning {} into {:?}...", url, path);
        repo.clone_fresh(&mut tracker).await?;
    } else {
        debug!("Updating existing clone at {:?}...", path);
        repo.pristine().await?;
        repo.pull(&mut tracker).await?;
    }
    repo.submodule_init().await?;
    repo.checkout(commit).await?;

    tracker.complete();
    Ok(repo)
}

/// Initializes or updates exactly one submodule of an existing clone.
#[tracing::instrument(skip(repo, progress), fields(repo = %repo.name()))]
pub async fn clone_submodule(
    repo: &Repository,
    submodule: &str,
    progress: Arc<dyn TaskProgress>,
) -> Result<()> {
    let mut tracker = ProgressTracker::new(progress);
    repo.update_submodule(submodule, &mut tracker)
        .await
        .with_context(|| format!("Failed to update submodule {} of {}", submodule, repo.name()))?;
    tracker.complete();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdkError;
    use crate::progress::{Reporter, SilentReporter};
    use progress::tests::RecordingProgress;
    use std::fs;
    use std::process::Command;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn git(cwd: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(["-c", "user.name=pdkm", "-c", "user.email=pdkm@example.com"])
            .args(args)
            .current_dir(cwd)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// An upstream with two commits on `main`; returns both hashes.
    fn make_upstream(dir: &Path) -> (String, String) {
        fs::create_dir_all(dir).unwrap();
        git(dir, &["-c", "init.defaultBranch=main", "init", "-q"]);
        fs::write(dir.join("VERSION"), "1").unwrap();
        fs::write(dir.join(".gitignore"), "build/\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "first"]);
        let first = git(dir, &["rev-parse", "HEAD"]);
        fs::write(dir.join("VERSION"), "2").unwrap();
        git(dir, &["commit", "-q", "-am", "second"]);
        let second = git(dir, &["rev-parse", "HEAD"]);
        (first, second)
    }

    /// A superproject on `main` with `libs/a` and `libs/b` as submodules,
    /// each tracking its own `main`. Returns the superproject's head commit.
    fn make_superproject(dir: &Path) -> String {
        let superproject = dir.join("superproject");
        make_upstream(&superproject);
        for name in ["a", "b"] {
            let library = dir.join(format!("lib_{}", name));
            make_upstream(&library);
            git(
                &superproject,
                &[
                    "-c",
                    "protocol.file.allow=always",
                    "submodule",
                    "add",
                    "-b",
                    "main",
                    library.to_str().unwrap(),
                    &format!("libs/{}", name),
                ],
            );
        }
        git(&superproject, &["commit", "-q", "-m", "add libraries"]);
        git(&superproject, &["rev-parse", "HEAD"])
    }

    fn recording() -> Arc<RecordingProgress> {
        Arc::new(RecordingProgress::default())
    }

    /// Hands out one recording slot per task, in creation order.
    #[derive(Default)]
    struct RecordingReporter {
        tasks: Mutex<Vec<(String, Arc<RecordingProgress>)>>,
    }

    struct SharedTask(Arc<RecordingProgress>);

    impl TaskProgress for SharedTask {
        fn set_message(&self, message: &str) {
            self.0.set_message(message)
        }
        fn set_length(&self, length: u64) {
            self.0.set_length(length)
        }
        fn set_position(&self, position: u64) {
            self.0.set_position(position)
        }
        fn inc(&self, delta: u64) {
            self.0.inc(delta)
        }
        fn finish(&self) {
            self.0.finish()
        }
    }

    impl Reporter for RecordingReporter {
        fn status(&self, _message: &str) {}

        fn task(&self, name: &str) -> Box<dyn TaskProgress> {
            let progress = recording();
            self.tasks
                .lock()
                .unwrap()
                .push((name.to_string(), progress.clone()));
            Box::new(SharedTask(progress))
        }
    }

    #[tokio::test]
    async fn test_clone_checks_out_commit_on_current_branch() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        let (first, _) = make_upstream(&upstream);
        let dest = dir.path().join("build/src/open_pdks");

        let progress = recording();
        let repo = clone(
            upstream.to_str().unwrap(),
            &dest,
            &first,
            "main",
            progress.clone(),
        )
        .await
        .unwrap();

        assert_eq!(repo.head_commit().await.unwrap(), first);
        assert_eq!(repo.current_branch().await.unwrap(), CURRENT_BRANCH);
        assert_eq!(fs::read_to_string(dest.join("VERSION")).unwrap(), "1");

        let positions = progress.positions.lock().unwrap().clone();
        assert_eq!(positions.last(), Some(&100));
        assert_eq!(positions.iter().filter(|p| **p == 100).count(), 1);
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_reclone_resets_and_moves_current() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        let (first, second) = make_upstream(&upstream);
        let dest = dir.path().join("open_pdks");
        let url = upstream.to_str().unwrap();

        clone(url, &dest, &first, "main", recording()).await.unwrap();
        fs::write(dest.join("VERSION"), "local edit").unwrap();
        fs::create_dir_all(dest.join("build")).unwrap();
        fs::write(dest.join("build/artifact"), "x").unwrap();

        let repo = clone(url, &dest, &second, "main", recording()).await.unwrap();

        assert_eq!(repo.head_commit().await.unwrap(), second);
        assert_eq!(fs::read_to_string(dest.join("VERSION")).unwrap(), "2");
        assert!(!dest.join("build/artifact").exists());
    }

    #[tokio::test]
    async fn test_reclone_removes_untracked_files() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        let (first, _) = make_upstream(&upstream);
        let dest = dir.path().join("open_pdks");
        let url = upstream.to_str().unwrap();

        clone(url, &dest, &first, "main", recording()).await.unwrap();
        fs::write(dest.join("stale_untracked.txt"), "left over").unwrap();

        clone(url, &dest, &first, "main", recording()).await.unwrap();

        assert!(!dest.join("stale_untracked.txt").exists());
        assert_eq!(fs::read_to_string(dest.join("VERSION")).unwrap(), "1");
    }

    #[tokio::test]
    async fn test_clone_unknown_commit_fails() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        make_upstream(&upstream);

        let err = clone(
            upstream.to_str().unwrap(),
            &dir.path().join("open_pdks"),
            "0000000000000000000000000000000000000000",
            "main",
            recording(),
        )
        .await
        .unwrap_err();

        assert!(matches!(PdkError::kind_of(&err), Some(PdkError::Command { .. })));
    }

    #[tokio::test]
    async fn test_open_existing_clone() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        let (first, _) = make_upstream(&upstream);
        let dest = dir.path().join("open_pdks");
        clone(upstream.to_str().unwrap(), &dest, &first, "main", recording())
            .await
            .unwrap();

        let opened = Repository::open(&dest).await.unwrap();
        assert_eq!(opened.default_branch, "main");
        assert_eq!(opened.url, upstream.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_clone_submodule_unknown_path_fails() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        let (first, _) = make_upstream(&upstream);
        let repo = clone(
            upstream.to_str().unwrap(),
            &dir.path().join("open_pdks"),
            &first,
            "main",
            recording(),
        )
        .await
        .unwrap();

        let progress = recording();
        let result = clone_submodule(&repo, "sources/missing", progress.clone()).await;
        assert!(result.is_err());
        assert!(progress.positions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submodules_lists_declared_paths() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let head = make_superproject(dir.path());
        let repo = clone(
            dir.path().join("superproject").to_str().unwrap(),
            &dir.path().join("open_pdks"),
            &head,
            "main",
            recording(),
        )
        .await
        .unwrap();

        assert_eq!(repo.submodules().await.unwrap(), vec!["libs/a", "libs/b"]);

        let upstream = dir.path().join("plain");
        let (first, _) = make_upstream(&upstream);
        let plain = clone(
            upstream.to_str().unwrap(),
            &dir.path().join("plain_clone"),
            &first,
            "main",
            recording(),
        )
        .await
        .unwrap();
        assert!(plain.submodules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clone_submodules_in_parallel() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let head = make_superproject(dir.path());
        let dest = dir.path().join("open_pdks");
        let repo = clone(
            dir.path().join("superproject").to_str().unwrap(),
            &dest,
            &head,
            "main",
            recording(),
        )
        .await
        .unwrap();

        let reporter = Arc::new(RecordingReporter::default());
        let multi = GitMultiClone::new(2, reporter.clone());
        let submodules = vec!["libs/a".to_string(), "libs/b".to_string()];
        let results = multi.clone_submodules(&repo, submodules.clone()).await;

        assert_eq!(results.len(), 2);
        assert!(all_ok(results).is_ok());
        assert_eq!(fs::read_to_string(dest.join("libs/a/VERSION")).unwrap(), "2");
        assert_eq!(fs::read_to_string(dest.join("libs/b/VERSION")).unwrap(), "2");
        {
            let tasks = reporter.tasks.lock().unwrap();
            assert_eq!(tasks.len(), 2);
            for (_, progress) in tasks.iter() {
                let positions = progress.positions.lock().unwrap().clone();
                assert_eq!(positions.last(), Some(&100));
                assert_eq!(positions.iter().filter(|p| **p == 100).count(), 1);
                assert_eq!(*progress.finished.lock().unwrap(), 1);
            }
        }

        // Already initialized: follows the tracked branch instead
        fs::write(dir.path().join("lib_a/VERSION"), "3").unwrap();
        git(&dir.path().join("lib_a"), &["commit", "-q", "-am", "third"]);
        let again = multi.clone_submodules(&repo, submodules).await;
        assert!(all_ok(again).is_ok());
        assert_eq!(fs::read_to_string(dest.join("libs/a/VERSION")).unwrap(), "3");
        assert_eq!(reporter.tasks.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_clone_submodules_rejects_duplicates() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let head = make_superproject(dir.path());
        let repo = clone(
            dir.path().join("superproject").to_str().unwrap(),
            &dir.path().join("open_pdks"),
            &head,
            "main",
            recording(),
        )
        .await
        .unwrap();

        let multi = GitMultiClone::new(2, Arc::new(SilentReporter));
        let results = multi
            .clone_submodules(&repo, vec!["libs/a".to_string(), "libs/a".to_string()])
            .await;

        assert!(results[0].is_ok());
        assert!(
            results[1]
                .as_ref()
                .unwrap_err()
                .to_string()
                .contains("more than once")
        );
    }

    #[tokio::test]
    async fn test_clone_all_keeps_input_order_and_isolates_failures() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let upstream_a = dir.path().join("upstream_a");
        let upstream_b = dir.path().join("upstream_b");
        let (a_first, _) = make_upstream(&upstream_a);
        let (_, b_second) = make_upstream(&upstream_b);

        let target = |url: &Path, name: &str, commit: &str| CloneTarget {
            url: url.to_string_lossy().into_owned(),
            path: dir.path().join("src").join(name),
            commit: commit.to_string(),
            default_branch: "main".to_string(),
        };
        let targets = vec![
            target(&upstream_a, "a", &a_first),
            target(&upstream_b, "broken", "not-a-commit"),
            target(&upstream_b, "b", &b_second),
            target(&upstream_a, "a", &a_first),
        ];

        let multi = GitMultiClone::new(2, Arc::new(SilentReporter));
        let results = multi.clone_all(targets).await;

        assert_eq!(results.len(), 4);
        assert_eq!(
            results[0].as_ref().unwrap().path,
            dir.path().join("src/a")
        );
        assert!(results[1].is_err());
        assert_eq!(
            results[2].as_ref().unwrap().head_commit().await.unwrap(),
            b_second
        );
        assert!(
            results[3]
                .as_ref()
                .unwrap_err()
                .to_string()
                .contains("more than once")
        );
        assert!(all_ok(results).is_err());
    }

    #[test]
    fn test_all_ok_returns_first_error() {
        let results: Vec<Result<u32>> = vec![
            Ok(1),
            Err(anyhow::anyhow!("first")),
            Err(anyhow::anyhow!("second")),
        ];
        assert_eq!(all_ok(results).unwrap_err().to_string(), "first");
        assert_eq!(all_ok(vec![Ok::<_, anyhow::Error>(1), Ok(2)]).unwrap(), vec![1, 2]);
    }
}
