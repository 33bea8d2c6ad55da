use crate::error::AnalyzerError;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const AGENT: &str = "RealReturnAnalyzer/1.0";

/// Client shared by one adapter: user agent plus a per-request timeout.
pub fn build_client(timeout: Duration) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("HTTP client builder failed ({}), using defaults", e);
            Client::new()
        })
}

/// Maps a non-success status onto the error taxonomy.
pub fn classify_status(status: StatusCode, source: &str, subject: &str) -> AnalyzerError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AnalyzerError::RateLimited { source_name: source.to_string() },
        StatusCode::NOT_FOUND => AnalyzerError::NoHistory(subject.to_string()),
        other => AnalyzerError::NetworkFailure(format!("{source} returned {other} for {subject}")),
    }
}

/// Transport-level failure (timeout, connect, body decode).
pub fn map_transport(err: reqwest::Error, source: &str) -> AnalyzerError {
    if err.is_timeout() {
        AnalyzerError::NetworkFailure(format!("{source} timed out"))
    } else if err.is_decode() {
        AnalyzerError::NetworkFailure(format!("{source} sent an unreadable body: {err}"))
    } else {
        AnalyzerError::NetworkFailure(format!("{source}: {err}"))
    }
}

/// GET `url` and return the body as JSON, classifying failures.
pub async fn get_json(client: &Client, url: &str, source: &str, subject: &str) -> Result<serde_json::Value, AnalyzerError> {
    tracing::debug!("{} GET {}", source, url);
    let resp = client.get(url).send().await.map_err(|e| map_transport(e, source))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(classify_status(status, source, subject));
    }

    resp.json().await.map_err(|e| map_transport(e, source))
}
