//! Remote configuration client abstraction.
//!
//! [`RemoteConfigClient`] is the seam between the refresh engine and the
//! transport. The production implementation lives in [`crate::http`]; tests
//! substitute scripted clients without touching any process-wide state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::http::HttpError;
use crate::sdk::SdkClientError;

/// Smallest poll interval the service accepts when starting a session.
pub const MIN_SESSION_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Largest poll interval the service accepts when starting a session.
pub const MAX_SESSION_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Clamps the advertised poll interval into the range the service accepts.
pub(crate) fn session_poll_interval(requested: Duration) -> Duration {
    requested.clamp(MIN_SESSION_POLL_INTERVAL, MAX_SESSION_POLL_INTERVAL)
}

/// Opaque token returned by the service for incremental polling.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PollToken(String);

impl PollToken {
    /// Wraps a token string received from the service.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value, as sent back to the service.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PollToken {
    /// Tokens are bearer-like; only a short prefix is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        if prefix.len() < self.0.len() {
            write!(f, "PollToken({prefix}…)")
        } else {
            write!(f, "PollToken({prefix})")
        }
    }
}

/// Identifies the configuration document to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTarget {
    /// AppConfig application name or ID.
    pub application: String,
    /// AppConfig environment name or ID.
    pub environment: String,
    /// AppConfig configuration profile name or ID.
    pub profile: String,
}

/// Parameters for a single long-poll fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub target: ConfigTarget,
    /// Identifier this process reports to the service.
    pub client_id: String,
    /// Token from the previous response; `None` forces a full fetch.
    pub poll_token: Option<PollToken>,
    /// Upper bound on the time spent in the call.
    pub timeout: Duration,
    /// Poll cadence the caller intends to honour, advertised when a new
    /// session is started.
    pub required_min_poll_interval: Duration,
}

/// A new configuration version returned by the service.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub content: Bytes,
    /// Content type as declared by the service (not yet interpreted).
    pub content_type: String,
    pub poll_token: PollToken,
    pub next_poll_interval: Option<Duration>,
    pub version_label: Option<String>,
}

/// Successful result of a fetch.
#[derive(Debug, Clone)]
pub enum FetchResponse {
    /// The service reported no new version since `poll_token` was issued.
    Unchanged {
        poll_token: PollToken,
        next_poll_interval: Option<Duration>,
    },
    /// A new version of the document is available.
    Updated(FetchedDocument),
}

impl FetchResponse {
    /// Assembles a response from the parts of a `GetLatestConfiguration` reply.
    ///
    /// An empty body means "no new version", except on a freshly started
    /// session where the service must deliver the document.
    pub(crate) fn from_parts(
        content: Bytes,
        content_type: Option<String>,
        poll_token: Option<String>,
        next_poll_interval: Option<Duration>,
        version_label: Option<String>,
        fresh_session: bool,
    ) -> Result<Self, FetchError> {
        let poll_token = poll_token
            .filter(|token| !token.is_empty())
            .map(PollToken::new)
            .ok_or(FetchError::MissingPollToken)?;

        if content.is_empty() {
            if fresh_session {
                return Err(FetchError::EmptyBody);
            }
            return Ok(Self::Unchanged {
                poll_token,
                next_poll_interval,
            });
        }

        let content_type = content_type
            .filter(|value| !value.trim().is_empty())
            .ok_or(FetchError::MissingContentType)?;
        Ok(Self::Updated(FetchedDocument {
            content,
            content_type,
            poll_token,
            next_poll_interval,
            version_label,
        }))
    }

    /// Token to send with the next poll.
    pub fn poll_token(&self) -> &PollToken {
        match self {
            Self::Unchanged { poll_token, .. } => poll_token,
            Self::Updated(document) => &document.poll_token,
        }
    }

    /// Poll interval recommended by the service, if it sent one.
    pub fn next_poll_interval(&self) -> Option<Duration> {
        match self {
            Self::Unchanged {
                next_poll_interval, ..
            } => *next_poll_interval,
            Self::Updated(document) => document.next_poll_interval,
        }
    }
}

/// Failure of a fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP exchange failed (network, throttling, auth, backend status).
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The AWS SDK call failed (service exception, dispatch, timeout).
    #[error(transparent)]
    Sdk(#[from] SdkClientError),
    /// The call did not complete within the allotted time.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    /// A new version was returned without a content type.
    #[error("malformed response: missing content type")]
    MissingContentType,
    /// A new session returned no document.
    #[error("malformed response: empty configuration body")]
    EmptyBody,
    /// The service did not return a token for the next poll.
    #[error("malformed response: missing next poll token")]
    MissingPollToken,
}

impl FetchError {
    /// Whether the token used for the failed call must be discarded, forcing
    /// the next attempt to start a fresh session.
    pub fn invalidates_poll_token(&self) -> bool {
        matches!(
            self,
            Self::Http(HttpError::BadRequest(_)) | Self::Sdk(SdkClientError::BadRequest(_))
        )
    }

    /// Whether the failure is a throttling response from the service.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            Self::Http(HttpError::Throttled) | Self::Sdk(SdkClientError::Throttled(_))
        )
    }
}

/// Performs long-poll fetches against the remote configuration service.
#[async_trait]
pub trait RemoteConfigClient: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<C> RemoteConfigClient for Arc<C>
where
    C: RemoteConfigClient + ?Sized,
{
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        (**self).fetch(request).await
    }
}
