//! Shared fixtures and utilities for helper tests.
//!
//! Consolidating these helpers keeps individual test modules focused on their
//! assertions while avoiding duplication of setup logic.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::telemetry::AppConfigTelemetry;
use super::HelperError;
use crate::client::{
    FetchError, FetchRequest, FetchResponse, FetchedDocument, PollToken, RemoteConfigClient,
};
use crate::config::HelperConfig;
use crate::http::HttpError;
use crate::validate::{ConfigSchema, FieldViolation};

/// Sample schema used across helper tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FeatureFlags {
    pub(crate) service: String,
    pub(crate) rollout_percent: u8,
    #[serde(default)]
    pub(crate) regions: Vec<String>,
}

impl ConfigSchema for FeatureFlags {
    fn schema_name() -> &'static str {
        "FeatureFlags"
    }

    fn check(&self) -> Result<(), Vec<FieldViolation>> {
        if self.rollout_percent > 100 {
            return Err(vec![FieldViolation::new(
                "rollout_percent",
                "must be between 0 and 100",
            )]);
        }
        Ok(())
    }
}

pub(crate) fn flags(service: &str, rollout_percent: u8) -> FeatureFlags {
    FeatureFlags {
        service: service.to_string(),
        rollout_percent,
        regions: Vec::new(),
    }
}

/// Baseline configuration with lazy fetch and a one-minute staleness bound.
pub(crate) fn base_config() -> HelperConfig {
    HelperConfig {
        client_id: "test-client".into(),
        fetch_timeout: Duration::from_secs(5),
        ..HelperConfig::new("orders", "prod", "flags", Duration::from_secs(60))
    }
}

/// Builds an `Updated` response carrying `body` as JSON.
pub(crate) fn json_document(body: &str, next_token: &str) -> Result<FetchResponse, FetchError> {
    document(body, "application/json", next_token)
}

/// Builds an `Updated` response with an arbitrary content type.
pub(crate) fn document(
    body: &str,
    content_type: &str,
    next_token: &str,
) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse::Updated(FetchedDocument {
        content: Bytes::copy_from_slice(body.as_bytes()),
        content_type: content_type.to_string(),
        poll_token: PollToken::new(next_token),
        next_poll_interval: Some(Duration::from_secs(15)),
        version_label: Some(format!("label-{next_token}")),
    }))
}

/// Builds an `Unchanged` response rotating the token to `next_token`.
pub(crate) fn unchanged(next_token: &str) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse::Unchanged {
        poll_token: PollToken::new(next_token),
        next_poll_interval: Some(Duration::from_secs(15)),
    })
}

/// Builds a transport failure.
pub(crate) fn unavailable() -> Result<FetchResponse, FetchError> {
    Err(FetchError::Http(HttpError::Retryable(503)))
}

/// Scripted client replaying canned responses in order.
///
/// Once the script is exhausted every call fails with a 503, so tests notice
/// unexpected extra fetches.
#[derive(Debug, Default)]
pub(crate) struct MockClient {
    script: Mutex<VecDeque<Result<FetchResponse, FetchError>>>,
    requests: Mutex<Vec<FetchRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockClient {
    pub(crate) fn new(
        script: impl IntoIterator<Item = Result<FetchResponse, FetchError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        })
    }

    /// Same as [`MockClient::new`] but every call sleeps for `delay` first.
    pub(crate) fn with_delay(
        script: impl IntoIterator<Item = Result<FetchResponse, FetchError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: Some(delay),
            ..Default::default()
        })
    }

    /// Appends a response to the script.
    pub(crate) fn push(&self, response: Result<FetchResponse, FetchError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Poll tokens sent with each request, in call order.
    pub(crate) fn tokens_sent(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.poll_token.as_ref().map(|t| t.as_str().to_string()))
            .collect()
    }

    pub(crate) fn last_request(&self) -> Option<FetchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RemoteConfigClient for MockClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(unavailable)
    }
}

/// Telemetry implementation that records events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingTelemetry {
    pub(crate) updated: AtomicUsize,
    pub(crate) unchanged: AtomicUsize,
    pub(crate) contended: AtomicUsize,
    pub(crate) errors: Mutex<Vec<String>>,
}

impl RecordingTelemetry {
    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl AppConfigTelemetry for RecordingTelemetry {
    fn on_refresh_updated(&self, _version_label: Option<&str>) {
        self.updated.fetch_add(1, Ordering::SeqCst);
    }

    fn on_refresh_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::SeqCst);
    }

    fn on_refresh_error(&self, error: &HelperError) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn on_refresh_contended(&self) {
        self.contended.fetch_add(1, Ordering::SeqCst);
    }
}
