//! Versions of a PDK family, installed or remote.
//!
//! A [`Version`] is only a view: the version directory and the family's
//! `current` marker file are the source of truth, queried through
//! [`VersionStore`].

mod catalogue;
mod metadata;
mod store;

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub use catalogue::{RemoteCatalogue, enrich_from_remote, parse_release, resolve_remote_catalogue};
pub use metadata::{find_tool_metadata, version_from_metadata_file};
pub use store::{PruneReport, VersionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub name: String,
    pub family: String,
    pub commit_date: Option<DateTime<Utc>>,
    pub upload_date: Option<DateTime<Utc>>,
    pub prerelease: bool,
}

impl Version {
    pub fn new(name: &str, family: &str) -> Self {
        Self {
            name: name.to_string(),
            family: family.to_string(),
            commit_date: None,
            upload_date: None,
            prerelease: false,
        }
    }

    /// Orders by commit date alone. A missing date is the earliest instant.
    pub fn cmp_by_commit_date(&self, other: &Self) -> Ordering {
        match (&self.commit_date, &other.commit_date) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    /// Day the upstream commit was made, as shown in listings.
    pub fn commit_day(&self) -> Option<String> {
        self.commit_date.map(|d| d.format("%Y.%m.%d").to_string())
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Sorts newest first; undated versions go last, keeping their relative order.
pub fn sort_newest_first(versions: &mut [Version]) {
    versions.sort_by(|a, b| b.cmp_by_commit_date(a));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dated(name: &str, year: i32) -> Version {
        Version {
            commit_date: Some(Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()),
            ..Version::new(name, "sky130")
        }
    }

    #[test]
    fn test_sort_newest_first_puts_undated_last() {
        let mut versions = vec![
            Version::new("undated", "sky130"),
            dated("older", 2022),
            dated("newer", 2023),
        ];
        sort_newest_first(&mut versions);

        let names: Vec<_> = versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["newer", "older", "undated"]);
    }

    #[test]
    fn test_ordering_ignores_name() {
        let a = dated("aaaa", 2023);
        let b = dated("zzzz", 2023);
        assert_eq!(a.cmp_by_commit_date(&b), Ordering::Equal);
        assert_eq!(
            Version::new("x", "sky130").cmp_by_commit_date(&a),
            Ordering::Less
        );
    }

    #[test]
    fn test_commit_day() {
        let v = Version {
            commit_date: Some(Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap()),
            ..Version::new("abc", "sky130")
        };
        assert_eq!(v.commit_day().as_deref(), Some("2023.04.05"));
        assert_eq!(Version::new("abc", "sky130").commit_day(), None);
    }
}
