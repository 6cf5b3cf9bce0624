//! AppConfig helper orchestration.
//!
//! [`AppConfigHelper`] composes the remote client, the decoder, the validator
//! and the single-slot cache into a long-lived handle that serves a typed
//! configuration. Refreshes are pull-based: the read that finds the cached
//! document older than `max_config_age` performs the fetch, and concurrent
//! readers never issue a second one.
//!
//! [`AppConfigHelper::from_config`] talks to AWS through the SDK client;
//! [`AppConfigHelper::from_endpoint`] keeps the unsigned HTTP client for an
//! explicitly configured endpoint.

use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::refresh::HelperShared;
use super::state::{RefreshState, StatusRecord, StatusSnapshot};
use super::telemetry::{AppConfigTelemetry, NoopTelemetry};
use crate::cache::{ConfigCache, ConfigSnapshot};
use crate::client::{FetchError, PollToken, RemoteConfigClient};
use crate::config::{ConfigError, HelperConfig};
use crate::content::{ContentType, ParseError};
use crate::http::HttpClient;
use crate::policy::RefreshPolicy;
use crate::sdk::AppConfigDataClient;
use crate::validate::{ConfigSchema, SchemaValidator, ValidationError, Validator};

/// Error type surfaced by helper operations.
#[derive(Debug, Error)]
pub enum HelperError {
    /// The remote call failed (network, timeout, throttling, auth, malformed response).
    #[error("transport error: {0}")]
    Transport(#[from] FetchError),
    /// The document could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The document does not match the schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No configuration has been committed yet and no fetch is due.
    #[error("configuration has not been fetched yet")]
    NotYetFetched,
    /// The helper configuration is unusable.
    #[error("invalid helper configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result of a single refresh attempt.
#[derive(Debug)]
pub enum RefreshOutcome<T> {
    /// The service reported no new version; only the poll token advanced.
    Unchanged(PollToken),
    /// A new version was validated and committed.
    Updated(Arc<ConfigSnapshot<T>>),
    /// The attempt failed; the cache was left untouched.
    Failed(HelperError),
}

impl<T> RefreshOutcome<T> {
    /// Whether the attempt ended in an error.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Builder collecting the optional collaborators of an [`AppConfigHelper`].
pub struct HelperBuilder<T, C> {
    config: HelperConfig,
    client: C,
    validator: Box<dyn Validator<T>>,
    telemetry: Arc<dyn AppConfigTelemetry>,
}

impl<T, C> HelperBuilder<T, C>
where
    T: Send + Sync + 'static,
    C: RemoteConfigClient,
{
    /// Replaces the validator (defaults to [`SchemaValidator`]).
    pub fn validator(mut self, validator: impl Validator<T> + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Installs a telemetry sink before the first fetch happens.
    pub fn telemetry(mut self, telemetry: Arc<dyn AppConfigTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Builds the helper, performing the initial fetch when `fetch_on_init` is set.
    ///
    /// Construction fails with the fetch error if that initial fetch fails.
    pub async fn build(self) -> Result<AppConfigHelper<T, C>, HelperError> {
        let HelperBuilder {
            config,
            client,
            validator,
            telemetry,
        } = self;
        config.validate()?;
        let config = config.sanitise();

        let shared = HelperShared {
            target: config.target(),
            policy: RefreshPolicy::new(config.max_config_age),
            client,
            validator,
            cache: ConfigCache::new(),
            refresh: Mutex::new(RefreshState::default()),
            status: StdRwLock::new(StatusRecord::default()),
            telemetry: StdRwLock::new(telemetry),
            config,
        };
        let helper = AppConfigHelper {
            shared: Arc::new(shared),
        };

        if helper.shared.config.fetch_on_init {
            let outcome = {
                let mut state = helper.shared.refresh.lock().await;
                helper.shared.run_cycle(&mut state).await
            };
            if let RefreshOutcome::Failed(err) = outcome {
                return Err(err);
            }
            // An unchanged reply to a fresh session leaves nothing to serve.
            if helper.shared.cache.is_empty() {
                return Err(HelperError::NotYetFetched);
            }
        }
        Ok(helper)
    }
}

/// Typed, self-refreshing view of one AppConfig configuration profile.
pub struct AppConfigHelper<T, C = AppConfigDataClient> {
    shared: Arc<HelperShared<T, C>>,
}

impl<T, C> Clone for AppConfigHelper<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, C> std::fmt::Debug for AppConfigHelper<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfigHelper")
            .field("shared", &self.shared)
            .finish()
    }
}

impl<T: ConfigSchema> AppConfigHelper<T, AppConfigDataClient> {
    /// Builds a helper talking to the AppConfig Data API described by `config`.
    ///
    /// Requests are signed with credentials from the AWS default provider chain.
    pub async fn from_config(config: HelperConfig) -> Result<Self, HelperError> {
        config.validate()?;
        let client = AppConfigDataClient::from_config(&config).await;
        Self::new(config, client).await
    }
}

impl<T: ConfigSchema> AppConfigHelper<T, HttpClient> {
    /// Builds a helper polling the explicit `config.endpoint` with unsigned
    /// requests, e.g. a local AppConfig emulator or a signing proxy.
    pub async fn from_endpoint(config: HelperConfig) -> Result<Self, HelperError> {
        config.require_endpoint()?;
        let client = HttpClient::new(config.base_url(), &config.client_id, config.http_options())
            .map_err(FetchError::from)?;
        Self::new(config, client).await
    }
}

impl<T, C> AppConfigHelper<T, C>
where
    T: ConfigSchema,
    C: RemoteConfigClient,
{
    /// Builds a helper validating documents with `T`'s [`ConfigSchema`] implementation.
    pub async fn new(config: HelperConfig, client: C) -> Result<Self, HelperError> {
        Self::builder(config, client).build().await
    }

    /// Starts a builder using `T`'s [`ConfigSchema`] implementation as validator.
    pub fn builder(config: HelperConfig, client: C) -> HelperBuilder<T, C> {
        Self::with_validator(config, client, SchemaValidator::<T>::new())
    }
}

impl<T, C> AppConfigHelper<T, C>
where
    T: Send + Sync + 'static,
    C: RemoteConfigClient,
{
    /// Starts a builder with a custom validator, for types that do not implement
    /// [`ConfigSchema`].
    pub fn with_validator(
        config: HelperConfig,
        client: C,
        validator: impl Validator<T> + 'static,
    ) -> HelperBuilder<T, C> {
        HelperBuilder {
            config,
            client,
            validator: Box::new(validator),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Returns the current configuration, refreshing it first when due.
    ///
    /// Errors are only returned while nothing has been committed yet. Later
    /// refresh failures are reported through telemetry and the previous value
    /// is returned.
    pub async fn config(&self) -> Result<Arc<T>, HelperError> {
        Ok(self.read_snapshot().await?.value().clone())
    }

    /// Same as [`AppConfigHelper::config`] but returns the whole snapshot.
    pub async fn read_snapshot(&self) -> Result<Arc<ConfigSnapshot<T>>, HelperError> {
        let shared = &self.shared;
        match shared.cache.read() {
            Some(current) => Ok(self.read_warm(current).await),
            None => self.read_cold().await,
        }
    }

    async fn read_warm(&self, current: Arc<ConfigSnapshot<T>>) -> Arc<ConfigSnapshot<T>> {
        let shared = &self.shared;
        if !shared.config.fetch_on_read {
            return current;
        }
        let Ok(mut state) = shared.refresh.try_lock() else {
            // Only a read that wanted to refresh counts as contended.
            let last_attempt_at = shared.status_record().last_attempt_at;
            if shared.policy.is_due_after(Instant::now(), last_attempt_at) {
                debug!("appconfig: refresh in progress; serving cached configuration");
                shared.telemetry().on_refresh_contended();
            }
            return current;
        };
        if !shared.policy.is_due(Instant::now(), &state.policy_state) {
            return current;
        }
        match shared.run_cycle(&mut state).await {
            RefreshOutcome::Updated(snapshot) => snapshot,
            _ => current,
        }
    }

    async fn read_cold(&self) -> Result<Arc<ConfigSnapshot<T>>, HelperError> {
        let shared = &self.shared;
        if !shared.config.fetch_on_read {
            return Err(HelperError::NotYetFetched);
        }
        let mut state = shared.refresh.lock().await;
        // Another reader may have committed while we waited.
        if let Some(current) = shared.cache.read() {
            return Ok(current);
        }
        if !shared.policy.is_due(Instant::now(), &state.policy_state) {
            return Err(HelperError::NotYetFetched);
        }
        match shared.run_cycle(&mut state).await {
            RefreshOutcome::Updated(snapshot) => Ok(snapshot),
            RefreshOutcome::Unchanged(_) => Err(HelperError::NotYetFetched),
            RefreshOutcome::Failed(err) => Err(err),
        }
    }

    /// Requests the latest configuration.
    ///
    /// Returns `true` when a new version was committed and `false` when no
    /// attempt was due or the service reported no change. Unlike reads, a
    /// failed attempt is always returned to the caller; the cache is untouched.
    pub async fn update_config(&self, force: bool) -> Result<bool, HelperError> {
        match self.refresh(force).await {
            None | Some(RefreshOutcome::Unchanged(_)) => Ok(false),
            Some(RefreshOutcome::Updated(_)) => Ok(true),
            Some(RefreshOutcome::Failed(err)) => Err(err),
        }
    }

    /// Runs a refresh attempt if one is due (or `force` is set) and returns its
    /// outcome; `None` when no attempt was made.
    pub async fn refresh(&self, force: bool) -> Option<RefreshOutcome<T>> {
        let shared = &self.shared;
        let mut state = shared.refresh.lock().await;
        if !force && !shared.policy.is_due(Instant::now(), &state.policy_state) {
            return None;
        }
        Some(shared.run_cycle(&mut state).await)
    }

    /// Current snapshot without triggering a refresh.
    pub fn snapshot(&self) -> Option<Arc<ConfigSnapshot<T>>> {
        self.shared.cache.read()
    }

    /// Bytes of the cached configuration exactly as received, without triggering a refresh.
    pub fn raw_config(&self) -> Option<Bytes> {
        self.snapshot().map(|snapshot| snapshot.raw().clone())
    }

    /// Content type of the cached configuration.
    pub fn content_type(&self) -> Option<ContentType> {
        self.snapshot().map(|snapshot| snapshot.content_type())
    }

    /// Version label of the cached configuration, when the service reported one.
    pub fn config_version(&self) -> Option<String> {
        self.snapshot()
            .and_then(|snapshot| snapshot.version_label().map(str::to_string))
    }

    /// AppConfig application this helper reads.
    pub fn application(&self) -> &str {
        &self.shared.config.application
    }

    /// AppConfig environment this helper reads.
    pub fn environment(&self) -> &str {
        &self.shared.config.environment
    }

    /// AppConfig configuration profile this helper reads.
    pub fn profile(&self) -> &str {
        &self.shared.config.profile
    }

    /// Client identifier sent to the service.
    pub fn client_id(&self) -> &str {
        &self.shared.config.client_id
    }

    /// Returns a reference to the sanitised helper configuration.
    pub fn helper_config(&self) -> &HelperConfig {
        &self.shared.config
    }

    /// Machine-readable schema description supplied by the validator.
    pub fn schema_description(&self) -> Option<Value> {
        self.shared.validator.describe()
    }

    /// Diagnostics snapshot. Never waits on an in-flight refresh.
    pub fn status(&self) -> StatusSnapshot {
        let record = self.shared.status_record();
        let snapshot = self.shared.cache.read();
        StatusSnapshot::from_record(
            &record,
            snapshot.is_some(),
            snapshot.and_then(|s| s.version_label().map(str::to_string)),
            Instant::now(),
        )
    }

    /// Replaces the telemetry sink.
    pub fn set_telemetry(&self, telemetry: Arc<dyn AppConfigTelemetry>) {
        let mut guard = self
            .shared
            .telemetry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = telemetry;
    }

    /// Spawns a background task refreshing the configuration until `shutdown`
    /// fires (or its sender is dropped).
    ///
    /// Hosts that call this usually also set `fetch_on_read` to `false`.
    pub fn spawn_poller(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()>
    where
        C: 'static,
    {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.run_poller(shutdown).await;
        })
    }
}
