//! AppConfig Data client backed by the AWS SDK.
//!
//! This is the transport used against the real service: the SDK resolves
//! credentials from the default provider chain and signs every request with
//! SigV4. Service exceptions are folded into [`SdkClientError`] so the refresh
//! engine can tell an expired token from throttling or an outage.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_config::Region;
use aws_sdk_appconfigdata::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_appconfigdata::operation::get_latest_configuration::GetLatestConfigurationError;
use aws_sdk_appconfigdata::operation::start_configuration_session::StartConfigurationSessionError;
use aws_sdk_appconfigdata::Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::client::{
    session_poll_interval, ConfigTarget, FetchError, FetchRequest, FetchResponse, PollToken,
    RemoteConfigClient,
};
use crate::config::HelperConfig;

/// Failures reported by the AWS SDK, classified by what the helper does next.
#[derive(Debug, Error)]
pub enum SdkClientError {
    /// `BadRequestException`: usually an expired or already used poll token.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// `ThrottlingException`.
    #[error("throttled by the configuration service: {0}")]
    Throttled(String),
    /// Credentials missing, expired or not allowed to read the profile.
    #[error("unauthorized - credentials rejected by the configuration service: {0}")]
    Unauthorized(String),
    /// `ResourceNotFoundException`: unknown application, environment or profile.
    #[error("configuration not found: {0}")]
    NotFound(String),
    /// `InternalServerException` or another server-side failure.
    #[error("transient backend error: {0}")]
    Retryable(String),
    /// Any other service exception.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The SDK gave up waiting for the service.
    #[error("request timed out")]
    Timeout,
    /// The request never reached the service (DNS, TLS, socket, credentials).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Service exceptions shared by both AppConfig Data operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceErrorKind {
    BadRequest,
    Throttling,
    ResourceNotFound,
    InternalServer,
    Unmodeled,
}

trait AppConfigDataError: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> ServiceErrorKind;
}

impl AppConfigDataError for StartConfigurationSessionError {
    fn kind(&self) -> ServiceErrorKind {
        match self {
            Self::BadRequestException(_) => ServiceErrorKind::BadRequest,
            Self::ThrottlingException(_) => ServiceErrorKind::Throttling,
            Self::ResourceNotFoundException(_) => ServiceErrorKind::ResourceNotFound,
            Self::InternalServerException(_) => ServiceErrorKind::InternalServer,
            _ => ServiceErrorKind::Unmodeled,
        }
    }
}

impl AppConfigDataError for GetLatestConfigurationError {
    fn kind(&self) -> ServiceErrorKind {
        match self {
            Self::BadRequestException(_) => ServiceErrorKind::BadRequest,
            Self::ThrottlingException(_) => ServiceErrorKind::Throttling,
            Self::ResourceNotFoundException(_) => ServiceErrorKind::ResourceNotFound,
            Self::InternalServerException(_) => ServiceErrorKind::InternalServer,
            _ => ServiceErrorKind::Unmodeled,
        }
    }
}

/// Error codes the service uses for authentication and authorisation failures.
const AUTH_ERROR_CODES: [&str; 5] = [
    "AccessDeniedException",
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "MissingAuthenticationTokenException",
];

/// Error codes the service uses for transient server-side failures.
const RETRYABLE_ERROR_CODES: [&str; 2] = ["ServiceUnavailableException", "InternalFailure"];

fn classify_service_error<E: AppConfigDataError>(err: &E) -> SdkClientError {
    let message = err.to_string();
    match err.kind() {
        ServiceErrorKind::BadRequest => SdkClientError::BadRequest(message),
        ServiceErrorKind::Throttling => SdkClientError::Throttled(message),
        ServiceErrorKind::ResourceNotFound => SdkClientError::NotFound(message),
        ServiceErrorKind::InternalServer => SdkClientError::Retryable(message),
        ServiceErrorKind::Unmodeled => match err.code() {
            Some(code) if AUTH_ERROR_CODES.contains(&code) => {
                SdkClientError::Unauthorized(format!("{code}: {message}"))
            }
            Some(code) if RETRYABLE_ERROR_CODES.contains(&code) => {
                SdkClientError::Retryable(format!("{code}: {message}"))
            }
            Some("ThrottlingException") => SdkClientError::Throttled(message),
            Some(code) => SdkClientError::Rejected(format!("{code}: {message}")),
            None => SdkClientError::Rejected(message),
        },
    }
}

fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> SdkClientError
where
    E: AppConfigDataError,
    R: fmt::Debug,
{
    match err {
        SdkError::ServiceError(context) => classify_service_error(context.err()),
        SdkError::TimeoutError(_) => SdkClientError::Timeout,
        other => SdkClientError::Transport(DisplayErrorContext(&other).to_string()),
    }
}

/// [`RemoteConfigClient`] over `aws_sdk_appconfigdata::Client`.
#[derive(Debug, Clone)]
pub struct AppConfigDataClient {
    inner_client: Client,
}

impl AppConfigDataClient {
    /// Wraps an already configured SDK client.
    pub fn new(inner_client: Client) -> Self {
        Self { inner_client }
    }

    /// Loads the shared AWS configuration for `config.region` and builds a client.
    ///
    /// Credentials come from the SDK's default provider chain (environment,
    /// profile files, web identity, container or instance metadata). An explicit
    /// `endpoint` replaces the regional one while requests stay signed.
    pub async fn from_config(config: &HelperConfig) -> Self {
        let region_provider =
            RegionProviderChain::first_try(Region::new(config.region.clone())).or_default_provider();
        let mut loader = aws_config::from_env()
            .region(region_provider)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(config.fetch_timeout)
                    .build(),
            );
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }

    /// Calls `StartConfigurationSession` and returns the initial poll token.
    pub async fn start_session(
        &self,
        target: &ConfigTarget,
        required_min_poll_interval: Duration,
    ) -> Result<PollToken, FetchError> {
        let interval = session_poll_interval(required_min_poll_interval);
        let output = self
            .inner_client
            .start_configuration_session()
            .application_identifier(&target.application)
            .environment_identifier(&target.environment)
            .configuration_profile_identifier(&target.profile)
            .required_minimum_poll_interval_in_seconds(
                i32::try_from(interval.as_secs()).unwrap_or(i32::MAX),
            )
            .send()
            .await
            .map_err(classify_sdk_error)?;

        output
            .initial_configuration_token
            .filter(|token| !token.is_empty())
            .map(PollToken::new)
            .ok_or(FetchError::MissingPollToken)
    }

    /// Calls `GetLatestConfiguration` with `token`.
    ///
    /// `fresh_session` marks tokens obtained from
    /// [`AppConfigDataClient::start_session`]; the service must return a
    /// document for those.
    pub async fn latest_configuration(
        &self,
        token: &PollToken,
        fresh_session: bool,
    ) -> Result<FetchResponse, FetchError> {
        let output = self
            .inner_client
            .get_latest_configuration()
            .configuration_token(token.as_str())
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let interval = output.next_poll_interval_in_seconds;
        let content = output
            .configuration
            .map(|blob| Bytes::from(blob.into_inner()))
            .unwrap_or_default();
        FetchResponse::from_parts(
            content,
            output.content_type,
            output.next_poll_configuration_token,
            u64::try_from(interval)
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            output.version_label,
            fresh_session,
        )
    }
}

#[async_trait]
impl RemoteConfigClient for AppConfigDataClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let (token, fresh_session) = match &request.poll_token {
            Some(token) => (token.clone(), false),
            None => {
                debug!(
                    application = %request.target.application,
                    environment = %request.target.environment,
                    profile = %request.target.profile,
                    "appconfig: starting configuration session"
                );
                let token = self
                    .start_session(&request.target, request.required_min_poll_interval)
                    .await?;
                (token, true)
            }
        };
        self.latest_configuration(&token, fresh_session).await
    }
}
