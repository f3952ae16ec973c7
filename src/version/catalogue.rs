use anyhow::Result;
use log::debug;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{Version, sort_newest_first};
use crate::github::{GitHubRepo, Release, ReleaseCatalogue, parse_timestamp};

static COMMIT_DATE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"released on ([\d\-:TZ]+)").ok());

/// Published versions grouped by family, newest first.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RemoteCatalogue {
    by_family: BTreeMap<String, Vec<Version>>,
}

impl RemoteCatalogue {
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.by_family.keys().map(String::as_str)
    }

    pub fn versions(&self, family: &str) -> &[Version] {
        self.by_family.get(family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, family: &str, name: &str) -> Option<&Version> {
        self.versions(family).iter().find(|v| v.name == name)
    }
}

/// Turns a release into a version. The tag is `<family>-<version>`, split
/// on the last `-` so family names may contain dashes. Returns `None` for
/// tags that do not have that shape.
pub fn parse_release(release: &Release) -> Option<Version> {
    let (family, name) = release.tag_name.rsplit_once('-')?;
    if family.is_empty() || name.is_empty() {
        return None;
    }

    let commit_date = release.body.as_deref().and_then(|body| {
        let re = COMMIT_DATE_RE.as_ref()?;
        let captures = re.captures(body)?;
        parse_timestamp(captures.get(1)?.as_str())
    });

    Some(Version {
        name: name.to_string(),
        family: family.to_string(),
        commit_date,
        upload_date: release.published_at.as_deref().and_then(parse_timestamp),
        prerelease: release.prerelease,
    })
}

/// Lists every non-draft release of `repo` and groups them per family.
/// Releases with malformed tags are skipped.
#[tracing::instrument(skip(catalogue))]
pub async fn resolve_remote_catalogue(
    catalogue: &dyn ReleaseCatalogue,
    repo: &GitHubRepo,
) -> Result<RemoteCatalogue> {
    let releases = catalogue.list_releases(repo).await?;

    let mut by_family: BTreeMap<String, Vec<Version>> = BTreeMap::new();
    for release in releases.iter().filter(|r| !r.draft) {
        match parse_release(release) {
            Some(version) => by_family
                .entry(version.family.clone())
                .or_default()
                .push(version),
            None => debug!("Skipping release with malformed tag {}", release.tag_name),
        }
    }
    for versions in by_family.values_mut() {
        sort_newest_first(versions);
    }

    Ok(RemoteCatalogue { by_family })
}

/// Copies remote dates onto installed versions, then sorts them newest first.
pub fn enrich_from_remote(installed: &mut [Version], remote: &RemoteCatalogue) {
    for version in installed.iter_mut() {
        if let Some(found) = remote.find(&version.family, &version.name) {
            version.commit_date = found.commit_date;
            version.upload_date = found.upload_date;
            version.prerelease = found.prerelease;
        }
    }
    sort_newest_first(installed);
}
