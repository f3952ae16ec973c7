use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::StatusCode;
use std::sync::Arc;

use super::repo::GitHubRepo;
use super::types::{CommitResponse, NewRelease, Release};
use crate::error::PdkError;
use crate::http::{HttpClient, check_status};
use crate::progress::TaskProgress;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;

/// Remote release host: the catalogue of published versions, plus the few
/// write operations the publisher needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseCatalogue: Send + Sync {
    /// Every release of `repo`, drafts included, in API order.
    async fn list_releases(&self, repo: &GitHubRepo) -> Result<Vec<Release>>;

    /// The release tagged `tag`, or `None` when it does not exist.
    async fn release_by_tag(&self, repo: &GitHubRepo, tag: &str) -> Result<Option<Release>>;

    /// Author date of `commit` in `repo`. Any failure yields `None`.
    async fn commit_date(&self, repo: &GitHubRepo, commit: &str) -> Option<DateTime<Utc>>;

    async fn create_release(&self, repo: &GitHubRepo, release: &NewRelease) -> Result<Release>;

    async fn upload_asset(
        &self,
        release: &Release,
        name: &str,
        data: Vec<u8>,
        progress: Arc<dyn TaskProgress>,
    ) -> Result<()>;
}

pub struct GitHub {
    pub http: HttpClient,
    pub api_url: String,
}

impl GitHub {
    #[tracing::instrument(skip(http, api_url))]
    pub fn new(http: HttpClient, api_url: Option<String>) -> Self {
        let api_url = api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self { http, api_url }
    }
}

/// Parses an ISO-8601 timestamp as GitHub emits it.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl ReleaseCatalogue for GitHub {
    #[tracing::instrument(skip(self))]
    async fn list_releases(&self, repo: &GitHubRepo) -> Result<Vec<Release>> {
        let url = format!("{}/releases", repo.api_path(&self.api_url));
        let mut releases = Vec::new();

        // A short page is the last one
        for page in 1.. {
            debug!("Fetching releases page {} from {}...", page, url);
            let page_str = page.to_string();
            let per_page = PER_PAGE.to_string();
            let parsed: Vec<Release> = self
                .http
                .get_json_with_query(&url, &[("per_page", &per_page), ("page", &page_str)])
                .await
                .with_context(|| format!("Failed to list releases of {}", repo))?;

            let len = parsed.len();
            releases.extend(parsed);
            if len < PER_PAGE {
                break;
            }
        }
        debug!("Found {} releases of {}", releases.len(), repo);

        Ok(releases)
    }

    #[tracing::instrument(skip(self))]
    async fn release_by_tag(&self, repo: &GitHubRepo, tag: &str) -> Result<Option<Release>> {
        let url = format!("{}/releases/tags/{}", repo.api_path(&self.api_url), tag);
        self.http
            .get_optional_json(&url)
            .await
            .with_context(|| format!("Failed to look up release {} of {}", tag, repo))
    }

    #[tracing::instrument(skip(self))]
    async fn commit_date(&self, repo: &GitHubRepo, commit: &str) -> Option<DateTime<Utc>> {
        let url = format!("{}/commits/{}", repo.api_path(&self.api_url), commit);
        match self.http.get_json::<CommitResponse>(&url).await {
            Ok(response) => parse_timestamp(&response.commit.author.date),
            Err(e) => {
                debug!("Could not get the date of commit {}: {:#}", commit, e);
                None
            }
        }
    }

    #[tracing::instrument(skip(self, release), fields(tag = %release.tag_name))]
    async fn create_release(&self, repo: &GitHubRepo, release: &NewRelease) -> Result<Release> {
        let url = format!("{}/releases", repo.api_path(&self.api_url));
        debug!("Creating release {} at {}...", release.tag_name, url);

        let response = self
            .http
            .inner()
            .post(&url)
            .json(release)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            warn!("Release creation for {} was rejected", release.tag_name);
            return Err(PdkError::Transport(format!(
                "HTTP response 422: release with tag {} might already exist",
                release.tag_name
            ))
            .into());
        }

        check_status(response)?
            .json::<Release>()
            .await
            .context("Failed to parse created release")
    }

    #[tracing::instrument(skip(self, release, data, progress), fields(tag = %release.tag_name))]
    async fn upload_asset(
        &self,
        release: &Release,
        name: &str,
        data: Vec<u8>,
        progress: Arc<dyn TaskProgress>,
    ) -> Result<()> {
        let base = release.upload_base_url().with_context(|| {
            format!("Release {} has no upload URL", release.tag_name)
        })?;
        let mut url = reqwest::Url::parse(base)
            .with_context(|| format!("Invalid upload URL {}", base))?;
        url.query_pairs_mut().append_pair("name", name);

        self.http
            .upload_bytes(url.as_str(), "application/octet-stream", data, progress)
            .await
            .with_context(|| format!("Failed to upload {}", name))
    }
}
