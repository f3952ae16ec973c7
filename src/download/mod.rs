use crate::http::HttpClient;
use crate::progress::Reporter;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

/// Downloads `url` to `dest`, with a progress slot named after the file.
#[tracing::instrument(skip(runtime, http_client, reporter))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
    reporter: &dyn Reporter,
) -> Result<u64> {
    let label = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string());
    let task = reporter.task(&format!("Downloading {}", label));

    let bytes = http_client
        .download_file(
            url,
            || {
                runtime
                    .create_file(dest)
                    .with_context(|| format!("Failed to create temporary file at {:?}", dest))
            },
            task.as_ref(),
        )
        .await
        .with_context(|| format!("Failed to download {}", label))?;

    task.set_message(&format!("Downloaded {}", label));
    task.finish();
    debug!("Downloaded {} bytes to {:?}", bytes, dest);
    Ok(bytes)
}
