//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries and standardized
//! JSON response handling. The live dashboard backend is reached exclusively
//! through this client.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::SyncError;

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
    /// The absolute URL that was requested.
    pub url: String,
}

impl<T> ApiResponse<T> {
    /// Converts a non-2xx response into [`SyncError::Http`] and unwraps the body.
    pub fn into_result(self) -> Result<T, SyncError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(SyncError::Parse(format!("empty body from {}", self.url))),
            (false, _) => Err(SyncError::Http {
                status: self.status,
                url: self.url,
                body: self.error_body,
            }),
        }
    }
}

/// Timeout and retry settings for an [`ApiClient`].
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Per-request timeout, including body download.
    pub timeout: Duration,
    /// Retries for transient failures (connect errors, 5xx, 429).
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/v1/").
    /// * `auth_token` - An optional string for the Authorization header.
    /// * `options` - Timeout and retry budget.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str, auth_token: Option<String>, options: ClientOptions) -> Result<Self, SyncError> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent("lib_realtime/0.1")
            .build()?;

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// Non-2xx statuses are not errors at this level: they come back as an
    /// `ApiResponse` with `success == false` and the raw body captured.
    ///
    /// # Errors
    /// Returns an error if URL joining, network execution or body decoding fails.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, SyncError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let response = self.execute(method, path, headers, body).await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let url = response.url().to_string();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
                url,
            })
        } else {
            // Capture the error body as a string for debugging
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
                url,
            })
        }
    }

    /// GET `path` and decode a 2xx JSON body; any other status is an error.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        self.request::<T, ()>(Method::GET, path, None, None)
            .await?
            .into_result()
    }

    /// Sends a request whose response body is irrelevant (e.g. `204 No Content`).
    pub async fn send_no_content<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<(), SyncError> {
        let response = self.execute(method, path, None, body).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let url = response.url().to_string();
            Err(SyncError::Http {
                status: status.as_u16(),
                url,
                body: response.text().await.ok(),
            })
        }
    }

    async fn execute<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<reqwest::Response, SyncError> {
        // 1. Construct the full absolute URL
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        // 2. Add Custom Headers if provided
        if let Some(h) = headers {
            req = req.headers(h);
        }

        // 3. Inject Bearer Authentication if a token is present
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        // 4. Serialize and attach the JSON body if present
        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        Ok(req.send().await?)
    }
}
