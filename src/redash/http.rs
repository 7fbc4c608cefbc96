//! HTTP utilities for Redash REST API calls

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Default per-request timeout. Connection tests against an unreachable
/// host can take minutes before the server answers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP session bound to one Redash instance and API key
#[derive(Clone)]
pub struct RedashHttpClient {
    client: Client,
}

impl RedashHttpClient {
    /// Create a session that sends `Authorization: Key <api_key>` on every request
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Key {}", api_key))
            .map_err(|_| Error::validation("API key contains characters not allowed in a header"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(concat!("dsprune/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// GET `url`, expecting 200
    pub async fn get(&self, url: &Url) -> Result<String> {
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url.clone()), StatusCode::OK).await
    }

    /// POST `url` with an optional JSON body, expecting 200
    pub async fn post<T: Serialize + ?Sized>(&self, url: &Url, body: Option<&T>) -> Result<String> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        self.send(request, StatusCode::OK).await
    }

    /// DELETE `url` with a JSON body, expecting 204
    pub async fn delete<T: Serialize + ?Sized>(&self, url: &Url, body: &T) -> Result<()> {
        tracing::debug!("DELETE {}", url);
        self.send(self.client.delete(url.clone()).json(body), StatusCode::NO_CONTENT)
            .await
            .map(|_| ())
    }

    async fn send(&self, request: RequestBuilder, expected: StatusCode) -> Result<String> {
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if status != expected {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(Error::Remote { status, body });
        }

        Ok(body)
    }
}
