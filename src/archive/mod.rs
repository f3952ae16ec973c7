//! Compressed tarballs: the per-library `.tar.zst` assets, the legacy
//! `default.tar.xz` whole-tree asset, and `.tar.gz` for completeness.

mod pack;
mod unpack;

use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::path::Path;

pub use pack::pack_tar_zst;
pub use unpack::{TarExtractor, UnpackSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zstd,
    Xz,
    Gzip,
}

impl Compression {
    const SUFFIXES: [(&'static str, Compression); 4] = [
        (".tar.zst", Compression::Zstd),
        (".tar.xz", Compression::Xz),
        (".tar.gz", Compression::Gzip),
        (".tgz", Compression::Gzip),
    ];

    /// Picks the compression from an asset or file name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, c)| *c)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_name)
            .ok_or_else(|| anyhow!("Unsupported archive format: {}", path.display()))
    }

    /// Wraps `input` in the matching decompressor.
    pub fn decoder<'r>(self, input: Box<dyn Read + Send + 'r>) -> Result<Box<dyn Read + Send + 'r>> {
        Ok(match self {
            Compression::Zstd => Box::new(
                zstd::stream::read::Decoder::new(input)
                    .context("Failed to initialise zstd decoder")?,
            ),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(input)),
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(input)),
        })
    }
}
