//! GitHub releases API client.

mod client;
mod repo;
mod types;

pub use client::{DEFAULT_API_URL, GitHub, ReleaseCatalogue, parse_timestamp};
#[cfg(test)]
pub use client::MockReleaseCatalogue;
pub use repo::GitHubRepo;
pub use types::{NewRelease, Release, ReleaseAsset};
