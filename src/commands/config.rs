use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use std::path::PathBuf;

use crate::{
    family::{Family, FamilyRegistry},
    github::{DEFAULT_API_URL, GitHub, GitHubRepo},
    http::HttpClient,
    runtime::Runtime,
};

pub const DEFAULT_FAMILY: &str = "sky130";
pub const DEFAULT_REPO_OWNER: &str = "efabless";
pub const DEFAULT_REPO_NAME: &str = "volare";
const DEFAULT_ROOT_DIR: &str = ".volare";
const USER_AGENT: &str = "pdkm";

/// Values given on the command line. Anything left `None` falls back to the
/// environment, then to a default.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    pub pdk_root: Option<PathBuf>,
    pub pdk: Option<String>,
    pub owner: Option<String>,
    pub repository: Option<String>,
    pub api_url: Option<String>,
    pub jobs: Option<usize>,
}

/// Everything resolved once at start-up and then passed by reference.
pub struct Config {
    pub families: FamilyRegistry,
    pub pdk_root: PathBuf,
    pub family: String,
    pub release_repo: GitHubRepo,
    pub api_url: String,
    pub token: Option<String>,
    pub jobs: usize,
    pub http_client: HttpClient,
}

impl Config {
    pub fn new<R: Runtime>(runtime: &R, options: ConfigOptions) -> Result<Self> {
        let families = FamilyRegistry::builtin()?;

        let pdk_root = match options
            .pdk_root
            .or_else(|| runtime.env_var("PDK_ROOT").ok().map(PathBuf::from))
        {
            Some(root) => root,
            None => runtime
                .home_dir()
                .context("Could not determine home directory; set PDK_ROOT or pass --pdk-root")?
                .join(DEFAULT_ROOT_DIR),
        };

        let family = options
            .pdk
            .or_else(|| runtime.env_var("PDK_FAMILY").ok())
            .unwrap_or_else(|| DEFAULT_FAMILY.to_string());

        let owner = options
            .owner
            .or_else(|| runtime.env_var("VOLARE_REPO_OWNER").ok())
            .unwrap_or_else(|| DEFAULT_REPO_OWNER.to_string());
        let name = options
            .repository
            .or_else(|| runtime.env_var("VOLARE_REPO_NAME").ok())
            .unwrap_or_else(|| DEFAULT_REPO_NAME.to_string());

        let token = runtime
            .env_var("VOLARE_GH_TOKEN")
            .or_else(|_| runtime.env_var("GITHUB_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty());

        let client = build_client(token.as_deref())?;

        Ok(Self {
            families,
            pdk_root,
            family,
            release_repo: GitHubRepo::new(&owner, &name),
            api_url: options
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token,
            jobs: options.jobs.unwrap_or(1).max(1),
            http_client: HttpClient::new(client),
        })
    }

    /// The selected family. Unknown names fail here, before any work.
    pub fn family(&self) -> Result<&Family> {
        self.families.get(&self.family)
    }

    pub fn github(&self) -> GitHub {
        GitHub::new(self.http_client.clone(), Some(self.api_url.clone()))
    }
}

fn build_client(token: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("GitHub token contains invalid characters")?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);
        debug!("Using GitHub token for authentication: {}", mask(token));
    }

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
