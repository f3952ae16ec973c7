//! Thin wrapper over a shared `reqwest::Client`.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::sync::Arc;

use super::status::check_status;
use crate::progress::TaskProgress;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    /// Performs a GET request with query parameters and deserializes the JSON response.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!("GET JSON from {} with query {:?}...", url, query);

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        check_status(response)?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// Like [`HttpClient::get_json`], but a 404 yields `None`.
    #[tracing::instrument(skip(self))]
    pub async fn get_optional_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("GET optional JSON from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let parsed = check_status(response)?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))?;
        Ok(Some(parsed))
    }

    /// Streams a response body into the writer produced by `create_writer`.
    ///
    /// The writer is only created once the server has answered successfully,
    /// so a failed request leaves no file behind.
    #[tracing::instrument(skip(self, create_writer, progress))]
    pub async fn download_file<W, F>(
        &self,
        url: &str,
        create_writer: F,
        progress: &dyn TaskProgress,
    ) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to start download from {}", url))?;

        let mut response = check_status(response)?;
        if let Some(length) = response.content_length() {
            progress.set_length(length);
        }

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
            progress.inc(chunk.len() as u64);
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    /// POSTs raw bytes, reporting progress as chunks are handed to the
    /// connection.
    #[tracing::instrument(skip(self, data, progress))]
    pub async fn upload_bytes(
        &self,
        url: &str,
        content_type: &str,
        data: Vec<u8>,
        progress: Arc<dyn TaskProgress>,
    ) -> Result<()> {
        debug!("Uploading {} bytes to {}...", data.len(), url);

        let total = data.len() as u64;
        progress.set_length(total);

        let chunks: Vec<Vec<u8>> = data
            .chunks(UPLOAD_CHUNK_SIZE)
            .map(|c| c.to_vec())
            .collect();
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            progress.inc(chunk.len() as u64);
            Ok::<_, std::io::Error>(chunk)
        }));

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .with_context(|| format!("Failed to upload to {}", url))?;

        check_status(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdkError;
    use crate::progress::{Reporter, SilentReporter};

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct TestResponse {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "test", "value": 42}"#)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: TestResponse = client
            .get_json(&format!("{}/test", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.name, "test");
        assert_eq!(result.value, 42);
    }

    #[tokio::test]
    async fn test_get_json_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/test")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Result<serde_json::Value> =
            client.get_json(&format!("{}/test", server.url())).await;

        mock.assert_async().await;
        assert!(matches!(
            PdkError::kind_of(&result.unwrap_err()),
            Some(PdkError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_get_json_with_query_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/test?page=1&per_page=10")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"["item1", "item2"]"#)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Vec<String> = client
            .get_json_with_query(
                &format!("{}/test", server.url()),
                &[("page", "1"), ("per_page", "10")],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, vec!["item1", "item2"]);
    }

    #[tokio::test]
    async fn test_get_optional_json_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Option<serde_json::Value> = client
            .get_optional_json(&format!("{}/missing", server.url()))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_optional_json_other_errors_propagate() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/denied")
            .with_status(401)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Result<Option<serde_json::Value>> = client
            .get_optional_json(&format!("{}/denied", server.url()))
            .await;
        assert!(result.unwrap_err().to_string().contains("Authentication failed"));
    }

    #[tokio::test]
    async fn test_download_file_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/common.tar.zst")
            .with_status(200)
            .with_body("test content")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let mut buffer = Vec::new();
        let bytes = client
            .download_file(
                &format!("{}/common.tar.zst", server.url()),
                || Ok(&mut buffer),
                SilentReporter.task("download").as_ref(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 12);
        assert_eq!(buffer, b"test content");
    }

    #[tokio::test]
    async fn test_download_file_not_found_creates_no_writer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/common.tar.zst")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let mut created = false;
        let result = client
            .download_file(
                &format!("{}/common.tar.zst", server.url()),
                || {
                    created = true;
                    Ok(std::io::sink())
                },
                SilentReporter.task("download").as_ref(),
            )
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
        assert!(!created);
    }

    #[tokio::test]
    async fn test_upload_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/assets?name=common.tar.zst")
            .match_header("content-type", "application/zstd")
            .match_body("archive bytes")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        client
            .upload_bytes(
                &format!("{}/assets?name=common.tar.zst", server.url()),
                "application/zstd",
                b"archive bytes".to_vec(),
                Arc::from(SilentReporter.task("upload")),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
