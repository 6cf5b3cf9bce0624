//! HTTP transport for the AppConfig Data API.
//!
//! The client speaks the two calls the refresh engine needs:
//! `StartConfigurationSession`, which exchanges the application/environment/
//! profile triple for an initial poll token, and `GetLatestConfiguration`,
//! which long-polls with that token. Requests are not SigV4-signed, so this
//! client targets AppConfig-compatible endpoints configured explicitly (a
//! local emulator, a signing sidecar, a test server). Calls to the AWS service
//! itself go through [`crate::sdk::AppConfigDataClient`]. Static credentials
//! can still be injected through the rotatable header map.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::client::{
    session_poll_interval, ConfigTarget, FetchError, FetchRequest, FetchResponse, PollToken,
    RemoteConfigClient,
};

/// Endpoint starting a configuration session.
const SESSION_ENDPOINT: &str = "/configurationsessions";
/// Endpoint returning the latest configuration for a poll token.
const CONFIGURATION_ENDPOINT: &str = "/configuration";
/// Query parameter carrying the poll token.
const TOKEN_QUERY_PARAM: &str = "configuration_token";
/// Response header carrying the token for the next poll.
const NEXT_TOKEN_HEADER: &str = "next-poll-configuration-token";
/// Response header carrying the service's recommended poll interval.
const NEXT_INTERVAL_HEADER: &str = "next-poll-interval-in-seconds";
/// Response header carrying the version label of the returned document.
const VERSION_LABEL_HEADER: &str = "version-label";
/// Session-token header used with temporary AWS credentials.
const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";

/// Additional options governing how the HTTP client is constructed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientOptions {
    /// Whether plaintext (HTTP) endpoints are allowed.
    pub allow_plaintext: bool,
    /// Whether TLS certificate validation should be skipped.
    pub accept_invalid_certs: bool,
}

/// Error taxonomy for the AppConfig Data API.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Credentials were rejected (401/403).
    #[error("unauthorized - credentials rejected by the configuration service: status {0}")]
    Unauthorized(u16),
    /// The service is throttling this client (429).
    #[error("throttled by the configuration service")]
    Throttled,
    /// The request was rejected as invalid (400), typically an expired or
    /// already used poll token.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Any other 4xx or unexpected 3xx status (e.g. unknown application).
    #[error("request rejected: status {0}")]
    Rejected(u16),
    /// Backend reported a temporary failure (5xx).
    #[error("transient backend error: status {0}")]
    Retryable(u16),
    /// The provided URL violates the required transport policy.
    #[error("insecure base url requires explicit opt-in: {0}")]
    InsecureUrl(String),
    /// A header could not be encoded.
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// Transport-level issue (DNS, TLS, socket, etc.).
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// A JSON payload could not be encoded or decoded.
    #[error("failed to decode response payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartSessionRequest<'a> {
    application_identifier: &'a str,
    environment_identifier: &'a str,
    configuration_profile_identifier: &'a str,
    required_minimum_poll_interval_in_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartSessionResponse {
    initial_configuration_token: Option<String>,
}

/// HTTP client encapsulating a reusable `reqwest::Client`, base URL, and headers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    /// Shared header map guarded by a read/write lock for credential rotation.
    headers: Arc<RwLock<HeaderMap>>,
}

impl HttpClient {
    /// Builds a client with its own connection pool.
    pub fn new(
        base_url: impl Into<String>,
        client_id: &str,
        options: HttpClientOptions,
    ) -> Result<Self, HttpError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;
        Self::with_client(client, base_url, client_id, options)
    }

    /// Wraps a caller-provided `reqwest::Client` (for instance one configured
    /// with a signing proxy or custom TLS roots).
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        client_id: &str,
        options: HttpClientOptions,
    ) -> Result<Self, HttpError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !options.allow_plaintext && base_url.starts_with("http://") {
            return Err(HttpError::InsecureUrl(base_url));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent(client_id))
                .map_err(|_| HttpError::InvalidHeader("user-agent"))?,
        );

        Ok(Self {
            client,
            base_url,
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    /// Returns the base URL currently configured for the client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Updates or clears the `Authorization` header.
    pub async fn update_authorization(&self, value: Option<&str>) -> Result<(), HttpError> {
        self.update_header(AUTHORIZATION, value, "authorization")
            .await
    }

    /// Updates or clears the session-token header used with temporary credentials.
    pub async fn update_security_token(&self, value: Option<&str>) -> Result<(), HttpError> {
        self.update_header(
            HeaderName::from_static(SECURITY_TOKEN_HEADER),
            value,
            SECURITY_TOKEN_HEADER,
        )
        .await
    }

    async fn update_header(
        &self,
        name: HeaderName,
        value: Option<&str>,
        label: &'static str,
    ) -> Result<(), HttpError> {
        let mut headers = self.headers.write().await;
        match value {
            Some(value) => {
                headers.insert(
                    name,
                    HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader(label))?,
                );
            }
            None => {
                headers.remove(name);
            }
        }
        Ok(())
    }

    /// Opens a configuration session and returns its initial poll token.
    pub async fn start_session(
        &self,
        target: &ConfigTarget,
        required_min_poll_interval: Duration,
        timeout: Duration,
    ) -> Result<PollToken, FetchError> {
        let interval = session_poll_interval(required_min_poll_interval);
        let body = serde_json::to_vec(&StartSessionRequest {
            application_identifier: &target.application,
            environment_identifier: &target.environment,
            configuration_profile_identifier: &target.profile,
            required_minimum_poll_interval_in_seconds: interval.as_secs(),
        })
        .map_err(HttpError::Decode)?;

        let response = self
            .send_request(Method::POST, SESSION_ENDPOINT, &[], Some(body), timeout)
            .await?;
        let bytes = response.bytes().await.map_err(HttpError::from)?;
        let session: StartSessionResponse =
            serde_json::from_slice(&bytes).map_err(HttpError::Decode)?;
        session
            .initial_configuration_token
            .filter(|token| !token.is_empty())
            .map(PollToken::new)
            .ok_or(FetchError::MissingPollToken)
    }

    /// Long-polls for the configuration associated with `token`.
    ///
    /// `fresh_session` marks tokens obtained from [`HttpClient::start_session`];
    /// the service must return a document for those.
    pub async fn latest_configuration(
        &self,
        token: &PollToken,
        fresh_session: bool,
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let response = self
            .send_request(
                Method::GET,
                CONFIGURATION_ENDPOINT,
                &[(TOKEN_QUERY_PARAM, token.as_str())],
                None,
                timeout,
            )
            .await?;

        let headers = response.headers().clone();
        let content = response.bytes().await.map_err(HttpError::from)?;
        FetchResponse::from_parts(
            content,
            header_str(&headers, CONTENT_TYPE.as_str()),
            header_str(&headers, NEXT_TOKEN_HEADER),
            header_str(&headers, NEXT_INTERVAL_HEADER)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
            header_str(&headers, VERSION_LABEL_HEADER),
            fresh_session,
        )
    }

    /// Attaches headers, sends the request, and classifies the HTTP status.
    async fn send_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<reqwest::Response, HttpError> {
        let url = format!("{}{}", self.base_url, path);
        // Clone headers under read lock so we do not hold the lock across await points.
        let headers = self.headers.read().await.clone();
        tracing::debug!(
            method = %method,
            url = %url,
            headers = ?redact_headers(&headers),
            body_len = body.as_ref().map_or(0, Vec::len),
            "appconfig HTTP request"
        );

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers)
            .timeout(timeout);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(bytes) = body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(bytes);
        }
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_bytes = response.bytes().await.unwrap_or_default();
            let preview = truncate_preview_text(String::from_utf8_lossy(&body_bytes));
            tracing::debug!(
                method = %method,
                url = %url,
                status = %status,
                body = %preview,
                "appconfig HTTP response"
            );
            return Err(classify_status(status, &body_bytes));
        }

        tracing::debug!(
            method = %method,
            url = %url,
            status = %status,
            "appconfig HTTP response"
        );
        Ok(response)
    }
}

#[async_trait]
impl RemoteConfigClient for HttpClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let (token, fresh_session) = match &request.poll_token {
            Some(token) => (token.clone(), false),
            None => {
                tracing::debug!(
                    application = %request.target.application,
                    environment = %request.target.environment,
                    profile = %request.target.profile,
                    "appconfig: starting configuration session"
                );
                let token = self
                    .start_session(
                        &request.target,
                        request.required_min_poll_interval,
                        request.timeout,
                    )
                    .await?;
                (token, true)
            }
        };
        self.latest_configuration(&token, fresh_session, request.timeout)
            .await
    }
}

fn user_agent(client_id: &str) -> String {
    format!(
        "appconfig-helper/{} (client {})",
        env!("CARGO_PKG_VERSION"),
        client_id
    )
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Maps a non-success HTTP status (and its body) to the error taxonomy.
fn classify_status(status: StatusCode, body: &[u8]) -> HttpError {
    match status {
        StatusCode::BAD_REQUEST => HttpError::BadRequest(error_message(body)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            HttpError::Unauthorized(status.as_u16())
        }
        StatusCode::TOO_MANY_REQUESTS => HttpError::Throttled,
        _ if status.is_server_error() => HttpError::Retryable(status.as_u16()),
        _ => HttpError::Rejected(status.as_u16()),
    }
}

/// Extracts the service's error message from an error body.
fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "Message")]
        message: Option<String>,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
        }) => message,
        _ if body.is_empty() => "no details provided".to_string(),
        _ => truncate_preview_text(String::from_utf8_lossy(body)),
    }
}

/// Returns a redacted view of request headers suitable for debug logging.
fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 2] = ["authorization", SECURITY_TOKEN_HEADER];

    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}

fn truncate_preview_text(text: Cow<'_, str>) -> String {
    const MAX_CHARS: usize = 512;
    let mut chars = text.chars();
    let mut preview = String::new();
    for _ in 0..MAX_CHARS {
        match chars.next() {
            Some(ch) => preview.push(ch),
            None => return preview,
        }
    }
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}
