use anyhow::{Context, Result};
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::progress::TaskProgress;
use crate::runtime::Runtime;

const ZSTD_LEVEL: i32 = 19;

/// Writes `files` (all under `base_dir`) into a `.tar.zst` at `output`,
/// storing each under its path relative to `base_dir`. Symlinks are stored
/// as links.
#[tracing::instrument(skip(runtime, files, progress))]
pub fn pack_tar_zst<R: Runtime>(
    runtime: &R,
    base_dir: &Path,
    files: &[PathBuf],
    output: &Path,
    progress: &dyn TaskProgress,
) -> Result<()> {
    debug!("Packing {} files into {:?}...", files.len(), output);
    progress.set_length(files.len() as u64);

    let writer = runtime.create_file(output)?;
    let encoder = zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)
        .context("Failed to initialise zstd encoder")?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for file in files {
        let relative = file
            .strip_prefix(base_dir)
            .with_context(|| format!("{:?} is not under {:?}", file, base_dir))?;
        builder
            .append_path_with_name(file, relative)
            .with_context(|| format!("Failed to add {:?} to {:?}", file, output))?;
        progress.inc(1);
    }

    let encoder = builder
        .into_inner()
        .with_context(|| format!("Failed to finish tarball {:?}", output))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("Failed to finish compressing {:?}", output))?;
    writer.flush()?;
    progress.finish();
    Ok(())
}
