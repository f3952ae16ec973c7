//! Reading the open_pdks commit out of a `tool_metadata.yml` file.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

const TOOL_NAME: &str = "open_pdks";

#[derive(Debug, Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    commit: Option<String>,
}

/// Looks for `./tool_metadata.yml`, then `./dependencies/tool_metadata.yml`.
pub fn find_tool_metadata<R: Runtime>(runtime: &R, cwd: &Path) -> Option<PathBuf> {
    [
        cwd.join("tool_metadata.yml"),
        cwd.join("dependencies").join("tool_metadata.yml"),
    ]
    .into_iter()
    .find(|p| runtime.is_file(p))
}

/// Returns the open_pdks commit recorded in `path`, or in the first metadata
/// file found under `cwd` when `path` is `None`.
pub fn version_from_metadata_file<R: Runtime>(
    runtime: &R,
    path: Option<&Path>,
    cwd: &Path,
) -> Result<(String, PathBuf)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match find_tool_metadata(runtime, cwd) {
            Some(p) => p,
            None => bail!(
                "Any of ./tool_metadata.yml or ./dependencies/tool_metadata.yml not found. \
                 You'll need to specify the file path or the version explicitly."
            ),
        },
    };

    let content = runtime.read_to_string(&path)?;
    let tools: Vec<ToolEntry> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {:?}", path))?;

    let Some(entry) = tools.into_iter().find(|t| t.name == TOOL_NAME) else {
        bail!("No entry for {} found in {:?}", TOOL_NAME, path);
    };
    let Some(commit) = entry.commit.filter(|c| !c.trim().is_empty()) else {
        bail!("The {} entry in {:?} has no commit", TOOL_NAME, path);
    };

    Ok((commit.trim().to_string(), path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    const METADATA: &str = "\
- name: magic
  commit: 0afe4d87d4aacfbbb2659129a1858a22d216a920
- name: open_pdks
  commit: bdc9412b3e468c102d01b7cf6337be06ec6e9c9a
";

    #[test]
    fn test_reads_from_dependencies_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("dependencies")).unwrap();
        fs::write(dir.path().join("dependencies/tool_metadata.yml"), METADATA).unwrap();

        let (version, found) = version_from_metadata_file(&RealRuntime, None, dir.path()).unwrap();
        assert_eq!(version, "bdc9412b3e468c102d01b7cf6337be06ec6e9c9a");
        assert!(found.ends_with("dependencies/tool_metadata.yml"));
    }

    #[test]
    fn test_top_level_file_wins() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("dependencies")).unwrap();
        fs::write(dir.path().join("dependencies/tool_metadata.yml"), METADATA).unwrap();
        fs::write(
            dir.path().join("tool_metadata.yml"),
            "- name: open_pdks\n  commit: aaaa\n",
        )
        .unwrap();

        let (version, _) = version_from_metadata_file(&RealRuntime, None, dir.path()).unwrap();
        assert_eq!(version, "aaaa");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = version_from_metadata_file(&RealRuntime, None, dir.path()).unwrap_err();
        assert!(err.to_string().contains("tool_metadata.yml not found"));
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.yml");
        fs::write(&path, "- name: magic\n  commit: abc\n").unwrap();

        let err = version_from_metadata_file(&RealRuntime, Some(&path), dir.path()).unwrap_err();
        assert!(err.to_string().contains("No entry for open_pdks"));
    }
}
