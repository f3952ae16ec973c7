use serde::{Deserialize, Serialize};

/// Represents a GitHub release asset
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, Default)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub browser_download_url: String,
}

/// Represents a GitHub release
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, Default)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// `upload_url` without its `{?name,label}` URI template suffix.
    pub fn upload_base_url(&self) -> Option<&str> {
        self.upload_url
            .as_deref()
            .and_then(|url| url.split('{').next())
            .filter(|url| !url.is_empty())
    }
}

/// Body of a release creation request.
#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct NewRelease {
    pub target_commitish: String,
    pub tag_name: String,
    pub name: String,
    pub body: String,
    pub prerelease: bool,
    pub draft: bool,
}

/// The slice of `GET /repos/{owner}/{repo}/commits/{sha}` that is read.
#[derive(Deserialize, Debug, Clone)]
pub struct CommitResponse {
    pub commit: CommitDetails,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitDetails {
    pub author: CommitSignature,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitSignature {
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_defaults_missing_fields() {
        let release: Release = serde_json::from_str(r#"{"tag_name": "sky130-abc123"}"#).unwrap();
        assert_eq!(release.tag_name, "sky130-abc123");
        assert!(!release.draft);
        assert!(release.body.is_none());
        assert!(release.assets.is_empty());
    }

    #[test]
    fn test_upload_base_url_strips_template() {
        let release = Release {
            upload_url: Some(
                "https://uploads.github.com/repos/efabless/volare/releases/1/assets{?name,label}"
                    .to_string(),
            ),
            ..Default::default()
        };
        assert_eq!(
            release.upload_base_url(),
            Some("https://uploads.github.com/repos/efabless/volare/releases/1/assets")
        );
        assert_eq!(Release::default().upload_base_url(), None);
    }

    #[test]
    fn test_asset_lookup() {
        let release = Release {
            assets: vec![ReleaseAsset {
                name: "common.tar.zst".to_string(),
                size: 10,
                browser_download_url: "https://example.com/common.tar.zst".to_string(),
            }],
            ..Default::default()
        };
        assert!(release.asset("common.tar.zst").is_some());
        assert!(release.asset("sky130_fd_sc_hd.tar.zst").is_none());
    }
}
