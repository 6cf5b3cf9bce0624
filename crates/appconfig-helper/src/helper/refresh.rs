//! Refresh cycle and background polling.
//!
//! This module hosts the shared helper internals: one fetch-decode-validate-
//! commit cycle, the bookkeeping around it, and the optional poller loop.
//! Higher-level APIs in `core.rs` decide when a cycle runs and delegate here.

use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::state::{RefreshState, StatusRecord};
use super::telemetry::AppConfigTelemetry;
use super::{HelperError, RefreshOutcome};
use crate::cache::{ConfigCache, ConfigSnapshot};
use crate::client::{
    ConfigTarget, FetchError, FetchRequest, FetchResponse, FetchedDocument, RemoteConfigClient,
};
use crate::config::HelperConfig;
use crate::content::{parse_document, ContentType};
use crate::policy::RefreshPolicy;
use crate::validate::Validator;

/// Lower bound between two poller wake-ups.
const MIN_POLLER_DELAY: Duration = Duration::from_secs(1);

/// Shared helper internals used by readers, explicit refreshes and the poller.
pub(crate) struct HelperShared<T, C> {
    pub(crate) config: HelperConfig,
    pub(crate) target: ConfigTarget,
    pub(crate) client: C,
    pub(crate) validator: Box<dyn Validator<T>>,
    pub(crate) policy: RefreshPolicy,
    pub(crate) cache: ConfigCache<T>,
    /// Serialises refresh attempts and owns the poll token.
    pub(crate) refresh: Mutex<RefreshState>,
    pub(crate) status: StdRwLock<StatusRecord>,
    pub(crate) telemetry: StdRwLock<Arc<dyn AppConfigTelemetry>>,
}

impl<T, C> std::fmt::Debug for HelperShared<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperShared")
            .field("config", &self.config)
            .finish()
    }
}

impl<T, C> HelperShared<T, C>
where
    T: Send + Sync + 'static,
    C: RemoteConfigClient,
{
    pub(crate) fn telemetry(&self) -> Arc<dyn AppConfigTelemetry> {
        self.telemetry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn status_record(&self) -> StatusRecord {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one fetch-decode-validate-commit cycle.
    ///
    /// The attempt is recorded before the fetch, so the policy sees it even
    /// when the fetch fails. The cache is only touched when the document was
    /// decoded and validated.
    pub(crate) async fn run_cycle(&self, state: &mut RefreshState) -> RefreshOutcome<T> {
        state.policy_state.record_attempt(Instant::now());
        let request = FetchRequest {
            target: self.target.clone(),
            client_id: self.config.client_id.clone(),
            poll_token: state.poll_token.clone(),
            timeout: self.config.fetch_timeout,
            required_min_poll_interval: self.config.max_config_age,
        };
        debug!(
            application = %self.target.application,
            environment = %self.target.environment,
            profile = %self.target.profile,
            incremental = request.poll_token.is_some(),
            "appconfig: fetching configuration"
        );

        let fetched = match timeout(self.config.fetch_timeout, self.client.fetch(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.config.fetch_timeout)),
        };

        let outcome = match fetched {
            Ok(FetchResponse::Unchanged {
                poll_token,
                next_poll_interval,
            }) => {
                self.record_poll_hint(state, next_poll_interval);
                state.poll_token = Some(poll_token.clone());
                RefreshOutcome::Unchanged(poll_token)
            }
            Ok(FetchResponse::Updated(document)) => {
                self.record_poll_hint(state, document.next_poll_interval);
                let poll_token = document.poll_token.clone();
                match self.commit(document) {
                    Ok(snapshot) => {
                        state.poll_token = Some(poll_token);
                        RefreshOutcome::Updated(snapshot)
                    }
                    Err(err) => {
                        // The service already advanced past this version, so the
                        // returned token would never offer it again.
                        debug!("appconfig: document rejected; next attempt starts a new session");
                        state.poll_token = None;
                        RefreshOutcome::Failed(err)
                    }
                }
            }
            Err(err) => {
                if err.invalidates_poll_token() {
                    debug!("appconfig: poll token rejected; next attempt starts a new session");
                    state.poll_token = None;
                }
                RefreshOutcome::Failed(err.into())
            }
        };

        self.report(state, &outcome);
        outcome
    }

    /// Decodes and validates `document`, then swaps it into the cache.
    fn commit(&self, document: FetchedDocument) -> Result<Arc<ConfigSnapshot<T>>, HelperError> {
        let content_type = ContentType::from_mime(&document.content_type)?;
        let value = parse_document(&document.content, content_type)?;
        let typed = self.validator.validate(value)?;
        let snapshot = Arc::new(ConfigSnapshot::new(
            document.content,
            content_type,
            typed,
            Some(document.poll_token),
            document.version_label,
        ));
        self.cache.swap(snapshot.clone());
        Ok(snapshot)
    }

    /// Stores the service's poll-interval hint, warning when it is longer than
    /// the configured staleness bound.
    fn record_poll_hint(&self, state: &mut RefreshState, hint: Option<Duration>) {
        let Some(hint) = hint else {
            return;
        };
        if state.next_poll_interval != Some(hint) && hint > self.config.max_config_age {
            warn!(
                "appconfig: service recommends polling every {:?} but max config age is {:?}; \
                 keeping max config age",
                hint, self.config.max_config_age
            );
        }
        state.next_poll_interval = Some(hint);
    }

    /// Logs the outcome, updates diagnostics and notifies telemetry.
    fn report(&self, state: &RefreshState, outcome: &RefreshOutcome<T>) {
        let consecutive_failures = {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            match outcome {
                RefreshOutcome::Failed(err) => status.record_failure(state, err.to_string()),
                _ => status.record_success(state),
            }
            status.consecutive_failures
        };

        let telemetry = self.telemetry();
        match outcome {
            RefreshOutcome::Updated(snapshot) => {
                info!(
                    content_type = %snapshot.content_type(),
                    version = snapshot.version_label().unwrap_or("unknown"),
                    bytes = snapshot.raw().len(),
                    "appconfig: committed new configuration"
                );
                telemetry.on_refresh_updated(snapshot.version_label());
            }
            RefreshOutcome::Unchanged(_) => {
                debug!("appconfig: configuration unchanged");
                telemetry.on_refresh_unchanged();
            }
            RefreshOutcome::Failed(err) => {
                warn!(
                    error = %err,
                    consecutive_failures,
                    serving_stale = !self.cache.is_empty(),
                    "appconfig: refresh attempt failed"
                );
                telemetry.on_refresh_error(err);
            }
        }
    }

    /// Delay before the poller's next attempt.
    ///
    /// The poller waits for the longer of the staleness bound and the
    /// service's hint, measured from the last attempt by anyone.
    pub(crate) fn poller_delay(&self, now: Instant) -> Duration {
        let record = self.status_record();
        let period = record
            .next_poll_interval
            .map_or(self.config.max_config_age, |hint| {
                hint.max(self.config.max_config_age)
            });
        let elapsed = record
            .last_attempt_at
            .map_or(period, |at| now.saturating_duration_since(at));
        period.saturating_sub(elapsed).max(MIN_POLLER_DELAY)
    }

    /// Drives refreshes until a shutdown signal arrives.
    pub(crate) async fn run_poller(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            let delay = self.poller_delay(Instant::now());
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("appconfig: poller shutting down");
                    break;
                }
                _ = sleep(delay) => {
                    let mut state = self.refresh.lock().await;
                    if self.policy.is_due(Instant::now(), &state.policy_state) {
                        // Failures are reported by the cycle itself.
                        let _ = self.run_cycle(&mut state).await;
                    }
                }
            }
        }
    }
}
