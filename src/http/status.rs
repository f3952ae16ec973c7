//! Turning unsuccessful HTTP responses into readable transport errors.
//!
//! Nothing here is retried: a failed request is reported once, with a hint
//! when the status usually means a missing or rate-limited token.

use anyhow::Result;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};

use crate::error::PdkError;

const TOKEN_HINT: &str = "set the GITHUB_TOKEN environment variable";

/// Describes an unsuccessful status in one line.
pub fn describe_status(status: StatusCode, headers: &HeaderMap, url: &str) -> String {
    let rate_limited = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status {
        StatusCode::UNAUTHORIZED => format!(
            "Authentication failed for {}: invalid or missing token. Check your token or {}.",
            url, TOKEN_HINT
        ),
        StatusCode::FORBIDDEN if rate_limited => format!(
            "GitHub API rate limit exceeded while requesting {}. Try again later or {}.",
            url, TOKEN_HINT
        ),
        StatusCode::FORBIDDEN => format!(
            "Access to {} is forbidden. You may need to {}.",
            url, TOKEN_HINT
        ),
        StatusCode::TOO_MANY_REQUESTS => format!(
            "Too many requests to {}. Try again later or {}.",
            url, TOKEN_HINT
        ),
        StatusCode::NOT_FOUND => format!("Not found: {}", url),
        s => format!("HTTP {} for {}", s, url),
    }
}

/// Passes successful responses through and converts the rest into
/// [`PdkError::Transport`].
pub fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = describe_status(status, response.headers(), response.url().as_str());
    Err(PdkError::Transport(message).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const URL: &str = "https://api.github.com/repos/efabless/volare/releases";

    #[test]
    fn test_describe_unauthorized() {
        let message = describe_status(StatusCode::UNAUTHORIZED, &HeaderMap::new(), URL);
        assert!(message.contains("Authentication failed"));
        assert!(message.contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_describe_forbidden_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        let message = describe_status(StatusCode::FORBIDDEN, &headers, URL);
        assert!(message.contains("rate limit"));
    }

    #[test]
    fn test_describe_forbidden_plain() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        let message = describe_status(StatusCode::FORBIDDEN, &headers, URL);
        assert!(message.contains("forbidden"));
        assert!(!message.contains("rate limit"));
    }

    #[test]
    fn test_describe_too_many_requests() {
        let message = describe_status(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), URL);
        assert!(message.contains("Too many requests"));
    }

    #[test]
    fn test_describe_other() {
        let message = describe_status(StatusCode::BAD_GATEWAY, &HeaderMap::new(), URL);
        assert!(message.starts_with("HTTP 502"));
    }

    #[tokio::test]
    async fn test_check_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        let err = check_status(response).unwrap_err();

        assert!(matches!(
            PdkError::kind_of(&err),
            Some(PdkError::Transport(message)) if message.starts_with("HTTP 503")
        ));
    }

    #[tokio::test]
    async fn test_check_status_passes_success() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(204)
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        assert!(check_status(response).is_ok());
    }
}
