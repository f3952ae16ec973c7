use anyhow::{Result, anyhow};
use std::str::FromStr;

use crate::family::SourceRepo;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
}

impl GitHubRepo {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }

    pub fn api_path(&self, api_url: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            api_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

impl From<&SourceRepo> for GitHubRepo {
    fn from(source: &SourceRepo) -> Self {
        Self::new(&source.owner, &source.name)
    }
}

impl std::fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for GitHubRepo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(anyhow!(
                "Invalid repository format '{}'. Expected 'owner/repo'.",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_repo_valid() {
        let repo = GitHubRepo::from_str("efabless/volare").unwrap();
        assert_eq!(repo, GitHubRepo::new("efabless", "volare"));
        assert_eq!(repo.to_string(), "efabless/volare");
    }

    #[test]
    fn test_parse_github_repo_invalid() {
        for input in ["volare", "/volare", "efabless/", "a/b/c"] {
            assert!(GitHubRepo::from_str(input).is_err(), "{}", input);
        }
    }

    #[test]
    fn test_api_path_trims_trailing_slash() {
        let repo = GitHubRepo::new("efabless", "volare");
        assert_eq!(
            repo.api_path("http://127.0.0.1:1234/"),
            "http://127.0.0.1:1234/repos/efabless/volare"
        );
    }

    #[test]
    fn test_from_source_repo() {
        let source = SourceRepo::new("RTimothyEdwards", "open_pdks", "master");
        assert_eq!(
            GitHubRepo::from(&source),
            GitHubRepo::new("RTimothyEdwards", "open_pdks")
        );
    }
}
